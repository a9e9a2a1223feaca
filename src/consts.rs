pub const BLOCK_SIZE: usize = 1024;
pub const SECTOR_SIZE: usize = 512;
pub const NUM_BLOCKS: usize = 256;
pub const DIRECTORY_BLOCK: BlockPointer = 0;

pub const ENTRY_SIZE: usize = 32;
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / ENTRY_SIZE;
pub const BLOCKS_PER_EXTENT: usize = 16;
pub const RECORD_SIZE: usize = 128;
pub const RECORDS_PER_EXTENT: usize = BLOCKS_PER_EXTENT * BLOCK_SIZE / RECORD_SIZE;
pub const EXTENT_BYTES: u64 = (BLOCKS_PER_EXTENT * BLOCK_SIZE) as u64;

pub const NAME_LENGTH: usize = 8;
pub const EXTENSION_LENGTH: usize = 3;

pub const FREE_STATUS: u8 = 0xE5;
pub const ACTIVE_STATUS: u8 = 0x00;

pub type BlockPointer = u8;
pub type BlockPointers = [BlockPointer; BLOCKS_PER_EXTENT];
pub type Block = [u8; BLOCK_SIZE];
