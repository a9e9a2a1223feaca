use log::debug;

use crate::consts::{Block, DIRECTORY_BLOCK, ENTRIES_PER_BLOCK};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::structure::entry::{decode, encode, DirectoryEntry, ExtentEntry};
use crate::util::error::Result;
use crate::util::name::FileName;

/// In-memory copy of the directory block.
#[derive(Clone)]
pub struct Directory {
    block: Block,
}

impl Directory {
    pub fn from_block(block: Block) -> Directory {
        Directory { block }
    }

    pub fn read<A: DeviceDriver>(io: &IO<A>) -> Result<Directory> {
        Ok(Directory { block: io.read_block(DIRECTORY_BLOCK as u64)? })
    }

    pub fn write<A: DeviceDriver>(&self, io: &mut IO<A>) -> Result<()> {
        debug!("Writing directory block");
        io.write_block(DIRECTORY_BLOCK as u64, &self.block)
    }

    pub fn entry(&self, slot: usize) -> Result<DirectoryEntry> {
        decode(&self.block, slot)
    }

    pub fn set_entry(&mut self, slot: usize, entry: &DirectoryEntry) -> Result<()> {
        encode(entry, slot, &mut self.block)
    }

    /// Active entries with their slot index, in directory order.
    pub fn active(&self) -> Vec<(usize, ExtentEntry)> {
        (0..ENTRIES_PER_BLOCK)
            .filter_map(|slot| match decode(&self.block, slot) {
                Ok(DirectoryEntry::Active(entry)) => Some((slot, entry)),
                _ => None,
            })
            .collect()
    }

    /// All extents of `file`, ordered by extent number.
    pub fn extents_of(&self, file: &FileName) -> Vec<(usize, ExtentEntry)> {
        let mut extents: Vec<_> = self.active().into_iter().filter(|(_, entry)| entry.is_named(file)).collect();
        extents.sort_by_key(|(_, entry)| entry.extent_number());
        extents
    }

    /// Number of extents belonging to `file`.
    pub fn count_of(&self, file: &FileName) -> usize {
        self.active().iter().filter(|(_, entry)| entry.is_named(file)).count()
    }

    pub fn contains(&self, file: &FileName) -> bool {
        self.active().iter().any(|(_, entry)| entry.is_named(file))
    }

    pub fn free_slot(&self) -> Option<usize> {
        (0..ENTRIES_PER_BLOCK).find(|&slot| matches!(decode(&self.block, slot), Ok(DirectoryEntry::Free(_))))
    }

    pub fn as_block(&self) -> &Block {
        &self.block
    }
}
