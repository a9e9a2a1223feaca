use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use log::debug;

use crate::consts::FREE_STATUS;
use crate::driver::DeviceDriver;

/// A disk image kept in a regular file.
pub struct FileDrive {
    file: File,
    sector_count: u64,
    sector_size: usize,
}

impl FileDrive {
    /// Creates a new image of `bytes` bytes. Every byte is set to the free
    /// status marker, which is what a freshly formatted CP/M disk reads back.
    pub fn create<P: AsRef<Path>>(path: P, bytes: u64, sector_size: usize) -> io::Result<FileDrive> {
        let file = OpenOptions::new().read(true).write(true).create_new(true).open(path.as_ref())?;
        let sector_count = bytes / sector_size as u64;
        let blank = vec![FREE_STATUS; sector_size];
        for i in 0..sector_count {
            file.write_all_at(&blank, i * sector_size as u64)?;
        }
        debug!("Created image {:?} with {} sectors", path.as_ref(), sector_count);
        Ok(FileDrive { file, sector_count, sector_size })
    }

    pub fn open<P: AsRef<Path>>(path: P, sector_size: usize) -> io::Result<FileDrive> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        let sector_count = file.metadata()?.len() / sector_size as u64;
        Ok(FileDrive { file, sector_count, sector_size })
    }
}

impl DeviceDriver for FileDrive {
    fn get_sector_count(&self) -> u64 {
        self.sector_count
    }

    fn get_sector_size(&self) -> usize {
        self.sector_size
    }

    fn read_sector(&self, index: u64) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0; self.sector_size];
        self.file.read_exact_at(&mut buffer, index * self.sector_size as u64)?;
        Ok(buffer)
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()> {
        if data.len() != self.sector_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sector size mismatch - expected {}, got {}", self.sector_size, data.len()),
            ));
        }
        self.file.write_all_at(data, index * self.sector_size as u64)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}
