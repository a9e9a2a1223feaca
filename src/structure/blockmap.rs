use std::fmt;

use log::debug;

use crate::consts::{BlockPointer, DIRECTORY_BLOCK};
use crate::structure::directory::Directory;
use crate::util::error::{Error, Result};

const ROW_WIDTH: usize = 16;

/// Used/free bitmap over every block of the device. Never persisted: it is
/// derived from the directory by `rebuild`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMap {
    block_count: usize,
    data: Vec<u8>,
}

impl BlockMap {
    pub fn new(block_count: usize) -> BlockMap {
        let mut map = BlockMap { block_count, data: vec![0; block_count.div_ceil(8)] };
        map.mark_used(DIRECTORY_BLOCK as usize);
        map
    }

    pub fn rebuild(&mut self, directory: &Directory) {
        self.data.fill(0);
        self.mark_used(DIRECTORY_BLOCK as usize);

        for (_, entry) in directory.active() {
            for block in entry.used_blocks() {
                if (block as usize) < self.block_count {
                    self.mark_used(block as usize);
                }
            }
        }
        debug!("Rebuilt block map: {} of {} blocks free", self.free_count(), self.block_count);
    }

    /// Claims the `count` lowest free blocks. Nothing is claimed when fewer are available.
    pub fn allocate(&mut self, count: usize) -> Result<Vec<BlockPointer>> {
        let blocks: Vec<usize> = (0..self.block_count).filter(|&i| self.is_free(i)).take(count).collect();
        if blocks.len() < count {
            return Err(Error::OutOfSpace { requested: count, available: blocks.len() });
        }

        for &block in &blocks {
            self.mark_used(block);
        }
        debug!("Allocated blocks {:?}", blocks);
        Ok(blocks.into_iter().map(|block| block as BlockPointer).collect())
    }

    pub fn release(&mut self, blocks: &[BlockPointer]) {
        for &block in blocks {
            let block = block as usize;
            if block != DIRECTORY_BLOCK as usize && block < self.block_count {
                self.mark_free(block);
            }
        }
    }

    pub fn is_free(&self, index: usize) -> bool {
        self.data[index / 8] & (1 << (index % 8)) == 0
    }

    pub fn free_count(&self) -> usize {
        (0..self.block_count).filter(|&i| self.is_free(i)).count()
    }

    fn mark_used(&mut self, index: usize) {
        self.data[index / 8] |= 1 << (index % 8);
    }

    fn mark_free(&mut self, index: usize) {
        self.data[index / 8] &= !(1 << (index % 8));
    }
}

impl fmt::Display for BlockMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in (0..self.block_count).step_by(ROW_WIDTH) {
            write!(f, "{:02x}:", row)?;
            for i in row..(row + ROW_WIDTH).min(self.block_count) {
                write!(f, " {}", if self.is_free(i) { '.' } else { '*' })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
