use std::io;

use raw::{raw_read_block, raw_write_block};

use crate::consts::{Block, BLOCK_SIZE};
use crate::driver::DeviceDriver;
use crate::util::error::{Error, Result};

mod raw;

/// Block level access to a sector device. Blocks are always `BLOCK_SIZE` bytes.
pub struct IO<A: DeviceDriver> {
    device: A,
    pub block_count: u64,
}

impl<A: DeviceDriver> IO<A> {
    pub fn new(device: A) -> Result<IO<A>> {
        let sector_size = device.get_sector_size();
        if sector_size == 0 || sector_size > BLOCK_SIZE || BLOCK_SIZE % sector_size != 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sector size {} does not divide block size {}", sector_size, BLOCK_SIZE),
            )));
        }

        let block_count = device.get_size() / BLOCK_SIZE as u64;
        Ok(IO { device, block_count })
    }

    pub fn write_block(&mut self, index: u64, block: &Block) -> Result<()> {
        if index >= self.block_count {
            return Err(Error::BlockOutOfRange(index));
        }

        Ok(raw_write_block(&mut self.device, block, index)?)
    }

    pub fn read_block(&self, index: u64) -> Result<Block> {
        if index >= self.block_count {
            return Err(Error::BlockOutOfRange(index));
        }

        Ok(raw_read_block(&self.device, index)?)
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.device.flush()?)
    }
}
