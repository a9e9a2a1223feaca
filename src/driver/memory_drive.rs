use std::io;

use crate::consts::FREE_STATUS;
use crate::driver::DeviceDriver;

/// A drive held entirely in memory. Reads past the end fail like a real device would.
pub struct MemoryDrive {
    data: Vec<u8>,
    sector_size: usize,
}

impl MemoryDrive {
    pub fn new(sector_count: u64, sector_size: usize) -> MemoryDrive {
        MemoryDrive { data: vec![FREE_STATUS; sector_count as usize * sector_size], sector_size }
    }

    fn range(&self, index: u64) -> io::Result<std::ops::Range<usize>> {
        let start = index as usize * self.sector_size;
        let end = start + self.sector_size;
        if end > self.data.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, format!("sector {} out of range", index)));
        }
        Ok(start..end)
    }
}

impl DeviceDriver for MemoryDrive {
    fn get_sector_count(&self) -> u64 {
        (self.data.len() / self.sector_size) as u64
    }

    fn get_sector_size(&self) -> usize {
        self.sector_size
    }

    fn read_sector(&self, index: u64) -> io::Result<Vec<u8>> {
        Ok(self.data[self.range(index)?].to_vec())
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()> {
        if data.len() != self.sector_size {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "sector size mismatch"));
        }
        let range = self.range(index)?;
        self.data[range].copy_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
