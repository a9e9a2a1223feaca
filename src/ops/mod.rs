use std::io;

use log::info;

use crate::consts::NUM_BLOCKS;
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::ops::handle::HandleTable;
use crate::structure::blockmap::BlockMap;
use crate::structure::directory::Directory;
use crate::structure::entry::ExtentEntry;
use crate::util::error::{Error, Result};

pub mod directory;
pub mod file;
pub mod handle;

/// A mounted file system. Owns the device, the free-space map and the open
/// files; every operation takes `&mut self`, so callers serialize access.
pub struct CpmFs<A: DeviceDriver> {
    io: IO<A>,
    block_map: BlockMap,
    handles: HandleTable,
}

impl<A: DeviceDriver> CpmFs<A> {
    pub fn mount(device: A) -> Result<CpmFs<A>> {
        let io = IO::new(device)?;
        let block_count = (io.block_count as usize).min(NUM_BLOCKS);
        if block_count < 2 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("device holds {} blocks, need at least 2", block_count),
            )));
        }

        let mut block_map = BlockMap::new(block_count);
        block_map.rebuild(&Directory::read(&io)?);
        info!("Mounted {} blocks, {} free", block_count, block_map.free_count());

        Ok(CpmFs { io, block_map, handles: HandleTable::default() })
    }

    /// Rendering of the free-space map, rebuilt from the directory on disk.
    pub fn free_map(&mut self) -> Result<String> {
        self.refresh()?;
        Ok(self.block_map.to_string())
    }

    pub fn free_blocks(&mut self) -> Result<usize> {
        self.refresh()?;
        Ok(self.block_map.free_count())
    }

    pub fn open_files(&self) -> usize {
        self.handles.len()
    }

    fn directory(&self) -> Result<Directory> {
        Directory::read(&self.io)
    }

    fn refresh(&mut self) -> Result<Directory> {
        let directory = self.directory()?;
        self.block_map.rebuild(&directory);
        Ok(directory)
    }
}

/// Size of a file from its extents, ordered by extent number. Every extent but
/// the last counts its allocated blocks; the last one counts RC/BC.
pub(crate) fn file_size(extents: &[(usize, ExtentEntry)]) -> u64 {
    match extents.split_last() {
        None => 0,
        Some(((_, last), rest)) => rest.iter().map(|(_, entry)| entry.allocated_len()).sum::<u64>() + last.byte_len(),
    }
}
