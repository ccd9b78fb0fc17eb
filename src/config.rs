use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::bail;
use serde::{Deserialize, Serialize};


/// One data disk of the array.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskConfig {
    pub name: String,
    pub dir: PathBuf,
}


/// Array layout, loaded from the JSON configuration file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArrayConfig {
    pub block_size: u32,
    pub level: u32,
    pub parity: PathBuf,
    #[serde(default)]
    pub qarity: Option<PathBuf>,
    pub content: PathBuf,
    pub disks: Vec<DiskConfig>,
}

impl ArrayConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self>
    {
        let f = match File::open(path) {
            Ok(f) => f,
            Err(e) => bail!("{}: {}", path.display(), e),
        };

        let cfg: ArrayConfig = serde_json::from_reader(f)?;
        cfg.check()?;

        Ok(cfg)
    }

    fn check(&self) -> anyhow::Result<()>
    {
        if self.block_size == 0 || !self.block_size.is_power_of_two() {
            bail!("block_size must be a power of two");
        }

        if self.level != 1 && self.level != 2 {
            bail!("level must be 1 or 2");
        }

        if self.level == 2 && self.qarity.is_none() {
            bail!("level 2 requires a qarity file");
        }

        if self.disks.is_empty() {
            bail!("the array needs at least one data disk");
        }

        let mut names = HashSet::new();
        for disk in &self.disks {
            if !names.insert(disk.name.as_str()) {
                bail!("duplicated disk name: {}", disk.name);
            }
        }

        Ok(())
    }
}


// Tests.
