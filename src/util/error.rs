use std::io;
use std::os::raw::c_int;

use thiserror::Error;

use crate::ops::handle::FileHandle;

type ErrorNum = c_int;

#[derive(Debug, Error)]
pub enum Error {
    #[error("illegal file name `{0}`")]
    InvalidName(String),
    #[error("no such file `{0}`")]
    NotFound(String),
    #[error("file `{0}` already exists")]
    DuplicateName(String),
    #[error("out of space: {requested} blocks requested, {available} free")]
    OutOfSpace { requested: usize, available: usize },
    #[error("no free directory slots")]
    OutOfDirectorySlots,
    #[error("invalid file handle {0}")]
    InvalidHandle(FileHandle),
    #[error("file handle {0} is not open for reading")]
    NotOpenForRead(FileHandle),
    #[error("file handle {0} is not open for writing")]
    NotOpenForWrite(FileHandle),
    #[error("seek to {offset} past end of file ({size} bytes)")]
    SeekOutOfRange { offset: u64, size: u64 },
    #[error("directory entry index {0} out of range")]
    InvalidIndex(usize),
    #[error("block {0} is outside the device")]
    BlockOutOfRange(u64),
    #[error("device error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn error_num(&self) -> ErrorNum {
        match self {
            Error::InvalidName(_) => libc::EINVAL,
            Error::NotFound(_) => libc::ENOENT,
            Error::DuplicateName(_) => libc::EEXIST,
            Error::OutOfSpace { .. } | Error::OutOfDirectorySlots => libc::ENOSPC,
            Error::InvalidHandle(_) | Error::NotOpenForRead(_) | Error::NotOpenForWrite(_) => libc::EBADF,
            Error::SeekOutOfRange { .. } => libc::EINVAL,
            Error::InvalidIndex(_) | Error::BlockOutOfRange(_) => libc::EIO,
            Error::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
