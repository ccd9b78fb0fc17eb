use std::fs;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::bail;
use bincode::{DefaultOptions, Options};
use serde::{Deserialize, Serialize};

use crate::hash::HASH_SIZE;
use crate::info::InfoMap;


const CONTENT_MAGIC: u32 = 0x53435242;
const CONTENT_VERSION: u32 = 1;


/// Identity snapshot of one catalogued file, as recorded at last sync.
/// Only used to detect whether the live file still matches the catalog.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileState {
    /// Path relative to the disk root.
    pub sub: PathBuf,
    pub size: u64,
    pub mtime_sec: i64,
    pub mtime_nsec: i64,
    pub inode: u64,
}


/// One catalogued block of a data disk.
/// A freshly allocated block may carry a file reference with no hash yet.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    /// Index into the owning disk's file arena.
    pub file: usize,
    /// Block offset inside that file.
    pub file_pos: u32,
    pub hash: Option<[u8; HASH_SIZE]>,
}


/// Per-disk arena: the file records plus the stripe-indexed block map.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskState {
    pub name: String,
    pub dir: PathBuf,
    pub files: Vec<FileState>,
    pub blocks: Vec<Option<Block>>,
}

impl DiskState {
    pub fn block(&self, i: u32) -> Option<&Block>
    {
        self.blocks.get(i as usize).and_then(|b| b.as_ref())
    }

    pub fn block_mut(&mut self, i: u32) -> Option<&mut Block>
    {
        self.blocks.get_mut(i as usize).and_then(|b| b.as_mut())
    }
}


/// The whole catalog: array geometry, per-disk arenas and the info map.
/// Written by the sync subsystem, borrowed mutably by the scrub engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct State {
    pub block_size: u32,
    pub level: u32,
    pub parity: PathBuf,
    pub qarity: Option<PathBuf>,
    pub hash_seed: u64,
    pub prevhash_seed: u64,
    pub disks: Vec<DiskState>,
    pub info: InfoMap,
    #[serde(skip)]
    pub need_write: bool,
}

impl State {
    /// The number of parity stripes.
    pub fn blockmax(&self) -> u32
    {
        self.disks.iter()
            .map(|d| d.blocks.len() as u32)
            .max()
            .unwrap_or(0)
    }

    pub fn load(path: &Path) -> anyhow::Result<State>
    {
        let bincode_opt = DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes();

        let f = match File::open(path) {
            Ok(f) => f,
            Err(e) => bail!("{}: {}", path.display(), e),
        };
        let mut reader = BufReader::new(f);

        let (magic, version): (u32, u32) = bincode_opt.deserialize_from(&mut reader)?;
        if magic != CONTENT_MAGIC {
            bail!("{} is not a content file", path.display());
        }
        if version != CONTENT_VERSION {
            bail!("unsupported content file version {}", version);
        }

        let state: State = bincode_opt.deserialize_from(&mut reader)?;

        Ok(state)
    }

    /// Writes the catalog durably.
    /// The data goes into a temporary file first and only replaces the
    /// old content once it is synced, so an interrupted save leaves the
    /// previous catalog intact.
    pub fn save(&self, path: &Path) -> anyhow::Result<()>
    {
        let bincode_opt = DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes();

        let tmp = path.with_extension("tmp");

        let f = File::create(&tmp)?;
        let mut writer = BufWriter::new(f);
        bincode_opt.serialize_into(&mut writer, &(CONTENT_MAGIC, CONTENT_VERSION))?;
        bincode_opt.serialize_into(&mut writer, self)?;

        let f = match writer.into_inner() {
            Ok(f) => f,
            Err(e) => bail!("{}: {}", tmp.display(), e),
        };
        f.sync_all()?;
        drop(f);

        fs::rename(&tmp, path)?;

        Ok(())
    }
}


// Tests.
