pub mod blockmap;
pub mod directory;
pub mod entry;
