pub mod consts;
pub mod driver;
pub mod fuse;
pub mod io;
pub mod ops;
pub mod structure;
pub mod util;

pub use ops::handle::{FileHandle, Mode};
pub use ops::CpmFs;
pub use util::error::{Error, Result};
