use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::os::unix::fs::MetadataExt;
use std::os::unix::io::{AsRawFd, IntoRawFd};
use std::path::PathBuf;

use crate::state::{FileState, State};


/// Live file attributes, captured right after open.
#[derive(Copy, Clone, Debug, Default)]
pub struct FdSnapshot {
    pub size: u64,
    pub mtime_sec: i64,
    pub mtime_nsec: i64,
    pub inode: u64,
}

impl FdSnapshot {
    /// Whether the live file still matches its catalogued identity.
    pub fn matches(&self, file: &FileState) -> bool
    {
        self.size == file.size
            && self.mtime_sec == file.mtime_sec
            && self.mtime_nsec == file.mtime_nsec
            && self.inode == file.inode
    }
}


/// One open-file slot of a data disk.
/// A slot holds at most one open file at a time; the caller closes it
/// before switching to a block of a different file.
#[derive(Debug)]
pub struct Handle {
    pub name: String,
    dir: PathBuf,
    pub file: Option<usize>,
    f: Option<File>,
    pub st: FdSnapshot,
}

impl Handle {
    /// Builds one slot per data disk of the array.
    pub fn map(state: &State) -> Vec<Handle>
    {
        state.disks.iter().map(|disk| Handle {
            name: disk.name.clone(),
            dir: disk.dir.clone(),
            file: None,
            f: None,
            st: FdSnapshot::default(),
        }).collect()
    }

    /// Opens the given catalogued file read-only and snapshots its
    /// attributes. Re-opening the file already held is a no-op.
    pub fn open(&mut self, file_idx: usize, file: &FileState, skip_sequential: bool) -> io::Result<()>
    {
        if self.file == Some(file_idx) && self.f.is_some() {
            return Ok(());
        }

        let path = self.dir.join(&file.sub);
        let f = File::open(&path)?;

        let md = f.metadata()?;
        self.st = FdSnapshot {
            size: md.size(),
            mtime_sec: md.mtime(),
            mtime_nsec: md.mtime_nsec(),
            inode: md.ino(),
        };

        if !skip_sequential {
            // Blocks of one file are read front to back, let the kernel
            // read ahead.
            unsafe {
                libc::posix_fadvise(f.as_raw_fd(), 0, 0, libc::POSIX_FADV_SEQUENTIAL);
            }
        }

        self.file = Some(file_idx);
        self.f = Some(f);

        Ok(())
    }

    /// Reads one block at the catalogued position.
    ///
    /// A short read at end of file is valid and returns the number of
    /// bytes actually read. The tail of `buf` beyond that length is
    /// zeroed, so parity computation always sees a full block.
    pub fn read_block(&mut self, file_pos: u32, buf: &mut [u8]) -> io::Result<usize>
    {
        let f = match &self.f {
            Some(f) => f,
            None => return Err(io::Error::new(io::ErrorKind::Other, "no open file")),
        };

        let offset = file_pos as u64 * buf.len() as u64;
        let mut done = 0;

        while done < buf.len() {
            let n = f.read_at(&mut buf[done..], offset + done as u64)?;
            if n == 0 {
                break;
            }
            done += n;
        }

        buf[done..].fill(0);

        Ok(done)
    }

    /// Closes the slot, reporting the close result.
    /// Closing an empty slot does nothing.
    pub fn close(&mut self) -> io::Result<()>
    {
        self.file = None;

        if let Some(f) = self.f.take() {
            let fd = f.into_raw_fd();
            if unsafe { libc::close(fd) } != 0 {
                return Err(io::Error::last_os_error());
            }
        }

        Ok(())
    }
}


// Tests.
