use std::collections::HashMap;
use std::fmt;

use crate::util::error::{Error, Result};
use crate::util::name::FileName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(pub(crate) u64);

impl FileHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
}

#[derive(Debug)]
pub(crate) struct OpenFile {
    pub(crate) name: FileName,
    pub(crate) mode: Mode,
    /// Directory slots of the file's extents, ordered by extent number.
    pub(crate) extents: Vec<usize>,
    pub(crate) cursor: u64,
    pub(crate) dirty: bool,
}

impl OpenFile {
    pub(crate) fn new(name: FileName, mode: Mode, extents: Vec<usize>, cursor: u64) -> OpenFile {
        OpenFile { name, mode, extents, cursor, dirty: false }
    }
}

/// Open files keyed by handle. Ids are never handed out twice, so a stale
/// handle can't alias a newer file.
#[derive(Debug, Default)]
pub(crate) struct HandleTable {
    next_id: u64,
    open: HashMap<u64, OpenFile>,
}

impl HandleTable {
    pub(crate) fn insert(&mut self, file: OpenFile) -> FileHandle {
        self.next_id += 1;
        self.open.insert(self.next_id, file);
        FileHandle(self.next_id)
    }

    pub(crate) fn get(&self, handle: FileHandle) -> Result<&OpenFile> {
        self.open.get(&handle.0).ok_or(Error::InvalidHandle(handle))
    }

    pub(crate) fn get_mut(&mut self, handle: FileHandle) -> Result<&mut OpenFile> {
        self.open.get_mut(&handle.0).ok_or(Error::InvalidHandle(handle))
    }

    pub(crate) fn remove(&mut self, handle: FileHandle) -> Result<OpenFile> {
        self.open.remove(&handle.0).ok_or(Error::InvalidHandle(handle))
    }

    pub(crate) fn len(&self) -> usize {
        self.open.len()
    }
}
