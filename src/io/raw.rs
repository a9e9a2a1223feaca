use std::io;

use log::trace;

use crate::consts::{Block, BLOCK_SIZE};
use crate::driver::DeviceDriver;

pub(crate) fn raw_write_block<A: DeviceDriver>(drive: &mut A, data: &Block, index: u64) -> io::Result<()> {
    let sector_size = drive.get_sector_size();
    let ratio = (BLOCK_SIZE / sector_size) as u64;
    let start = index * ratio;

    for (i, sector) in data.chunks(sector_size).enumerate() {
        trace!("Writing sector {} of block {}", start + i as u64, index);
        drive.write_sector(start + i as u64, sector)?;
    }
    Ok(())
}

pub(crate) fn raw_read_block<A: DeviceDriver>(drive: &A, index: u64) -> io::Result<Block> {
    let sector_size = drive.get_sector_size();
    let ratio = (BLOCK_SIZE / sector_size) as u64;
    let start = index * ratio;
    let mut block = [0u8; BLOCK_SIZE];

    for (i, chunk) in block.chunks_mut(sector_size).enumerate() {
        trace!("Reading sector {} of block {}", start + i as u64, index);
        let sector = drive.read_sector(start + i as u64)?;
        if sector.len() != sector_size {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short sector read"));
        }
        chunk.copy_from_slice(&sector);
    }
    Ok(block)
}
