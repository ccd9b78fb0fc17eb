use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::os::unix::io::{AsRawFd, IntoRawFd};
use std::path::Path;

use anyhow::bail;


/// Random-access reader over one parity file.
#[derive(Debug)]
pub struct Parity {
    f: Option<File>,
}

impl Parity {
    /// Opens a parity file for reading.
    /// A file that does not cover the whole array is accepted: blocks
    /// beyond its end surface as ordinary read errors, stripe by stripe.
    pub fn open(path: &Path, skip_sequential: bool) -> anyhow::Result<Parity>
    {
        let f = match File::open(path) {
            Ok(f) => f,
            Err(e) => bail!("{}: {}", path.display(), e),
        };

        if !skip_sequential {
            unsafe {
                libc::posix_fadvise(f.as_raw_fd(), 0, 0, libc::POSIX_FADV_SEQUENTIAL);
            }
        }

        Ok(Parity { f: Some(f) })
    }

    /// Reads the parity block of one stripe. Parity files only ever hold
    /// whole blocks, so anything short is a read error.
    pub fn read(&mut self, i: u32, buf: &mut [u8]) -> io::Result<()>
    {
        let f = match &self.f {
            Some(f) => f,
            None => return Err(io::Error::new(io::ErrorKind::Other, "parity file is closed")),
        };

        f.read_exact_at(buf, i as u64 * buf.len() as u64)
    }

    /// Closes the file, reporting the close result.
    pub fn close(&mut self) -> io::Result<()>
    {
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
