use std::ffi::OsStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;
use log::debug;

use crate::consts::BLOCK_SIZE;
use crate::driver::DeviceDriver;
use crate::ops::directory::DirListing;
use crate::ops::handle::{FileHandle, Mode};
use crate::ops::CpmFs;
use crate::util::error::Error;

const ROOT_TTL: Duration = Duration::from_secs(1);
/// File inodes are directory slots, which a new file may take over as soon as
/// the old one is deleted, so the kernel must not cache file attributes.
const FILE_TTL: Duration = Duration::ZERO;
const ROOT_INO: u64 = 1;
const FIRST_FILE_INO: u64 = 2;
const STAT_BLOCK_SIZE: u64 = 512;

/// Exposes the flat directory as the root of a FUSE mount.
pub struct CpmFuse<A: DeviceDriver> {
    fs: CpmFs<A>,
    uid: u32,
    gid: u32,
}

impl<A: DeviceDriver> CpmFuse<A> {
    pub fn new(fs: CpmFs<A>) -> CpmFuse<A> {
        CpmFuse { fs, uid: 0, gid: 0 }
    }

    fn listing_for(&self, ino: u64) -> Result<DirListing, c_int> {
        let listing = self.fs.list().map_err(|e| e.error_num())?;
        listing
            .into_iter()
            .find(|entry| file_ino(entry) == ino)
            .ok_or(libc::ENOENT)
    }

    fn root_attr(&self) -> FileAttr {
        FileAttr {
            ino: ROOT_INO,
            size: 0,
            blocks: 0,
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            crtime: UNIX_EPOCH,
            kind: FileType::Directory,
            perm: 0o755,
            nlink: 2,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            flags: 0,
            blksize: BLOCK_SIZE as u32,
        }
    }

    fn open_ino(&mut self, ino: u64, flags: i32) -> Result<FileHandle, c_int> {
        let mode = match flags & libc::O_ACCMODE {
            libc::O_RDONLY => Mode::Read,
            libc::O_WRONLY => Mode::Write,
            _ => return Err(libc::EACCES),
        };
        let name = self.listing_for(ino)?.name.to_string();
        if mode == Mode::Write && flags & libc::O_TRUNC != 0 {
            self.fs.truncate(&name).map_err(|e| e.error_num())?;
        }
        self.fs.open(&name, mode).map_err(|e| e.error_num())
    }

    fn create_file(&mut self, parent: u64, name: &OsStr) -> Result<(FileAttr, FileHandle), c_int> {
        let name = file_name(parent, name)?;
        if self.fs.stat(name).is_ok() {
            return Err(libc::EEXIST);
        }
        let handle = self.fs.open(name, Mode::Write).map_err(|e| e.error_num())?;
        let entry = self.fs.stat(name).map_err(|e| e.error_num())?;
        Ok((self.listing_to_fileattr(&entry), handle))
    }

    fn write_at(&mut self, handle: FileHandle, offset: u64, data: &[u8]) -> Result<usize, c_int> {
        self.fs.seek(handle, offset).map_err(|e| e.error_num())?;
        self.fs.write(handle, data).map_err(|e| e.error_num())
    }

    /// Only emptying a file is supported; other sizes are left as they are.
    fn resize(&mut self, ino: u64, size: Option<u64>) -> Result<FileAttr, c_int> {
        let entry = self.listing_for(ino)?;
        match size {
            None => Ok(self.listing_to_fileattr(&entry)),
            Some(size) if size == entry.size => Ok(self.listing_to_fileattr(&entry)),
            Some(0) => {
                self.fs.truncate(&entry.name.to_string()).map_err(|e| e.error_num())?;
                let entry = self.listing_for(ino)?;
                Ok(self.listing_to_fileattr(&entry))
            }
            Some(_) => Err(libc::EOPNOTSUPP),
        }
    }

    fn listing_to_fileattr(&self, entry: &DirListing) -> FileAttr {
        FileAttr {
            ino: file_ino(entry),
            size: entry.size,
            blocks: entry.size.div_ceil(STAT_BLOCK_SIZE),
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            crtime: UNIX_EPOCH,
            kind: FileType::RegularFile,
            perm: 0o644,
            nlink: 1,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            flags: 0,
            blksize: BLOCK_SIZE as u32,
        }
    }
}

fn file_ino(entry: &DirListing) -> u64 {
    entry.slot as u64 + FIRST_FILE_INO
}

fn file_name(parent: u64, name: &OsStr) -> Result<&str, c_int> {
    if parent != ROOT_INO {
        return Err(libc::ENOENT);
    }
    name.to_str().ok_or(libc::ENOENT)
}

impl<A: DeviceDriver> Filesystem for CpmFuse<A> {
    fn init(&mut self, req: &Request<'_>, _config: &mut fuser::KernelConfig) -> Result<(), c_int> {
        self.uid = req.uid();
        self.gid = req.gid();
        Ok(())
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let result = file_name(parent, name).and_then(|name| self.fs.stat(name).map_err(|e| e.error_num()));
        match result {
            Ok(entry) => reply.entry(&FILE_TTL, &self.listing_to_fileattr(&entry), 0),
            Err(e) => reply.error(e),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        if ino == ROOT_INO {
            reply.attr(&ROOT_TTL, &self.root_attr());
            return;
        }
        match self.listing_for(ino) {
            Ok(entry) => reply.attr(&FILE_TTL, &self.listing_to_fileattr(&entry)),
            Err(e) => reply.error(e),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        if ino != ROOT_INO {
            reply.error(libc::ENOTDIR);
            return;
        }
        let listing = match self.fs.list() {
            Ok(listing) => listing,
            Err(e) => {
                debug!("ReadDir error: {}", e);
                reply.error(e.error_num());
                return;
            }
        };

        let mut entries = vec![
            (ROOT_INO, FileType::Directory, ".".to_string()),
            (ROOT_INO, FileType::Directory, "..".to_string()),
        ];
        entries.extend(listing.iter().map(|entry| (file_ino(entry), FileType::RegularFile, entry.name.to_string())));

        for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        if ino == ROOT_INO {
            reply.attr(&ROOT_TTL, &self.root_attr());
            return;
        }
        match self.resize(ino, size) {
            Ok(attr) => reply.attr(&FILE_TTL, &attr),
            Err(e) => reply.error(e),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.open_ino(ino, flags) {
            Ok(handle) => reply.opened(handle.id(), 0),
            Err(e) => reply.error(e),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        match self.create_file(parent, name) {
            Ok((attr, handle)) => reply.created(&FILE_TTL, &attr, 0, handle.id(), 0),
            Err(e) => {
                debug!("Create error for {:?}: {}", name, e);
                reply.error(e);
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let handle = FileHandle(fh);
        let result = match self.fs.seek(handle, offset as u64) {
            Ok(()) => self.fs.read(handle, size as usize),
            Err(Error::SeekOutOfRange { .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        };
        match result {
            Ok(data) => reply.data(&data),
            Err(e) => {
                debug!("Read error on {}: {}", handle, e);
                reply.error(e.error_num());
            }
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self.write_at(FileHandle(fh), offset as u64, data) {
            Ok(written) => reply.written(written as u32),
            Err(e) => {
                debug!("Write error on #{}: {}", fh, e);
                reply.error(e);
            }
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.fs.close(FileHandle(fh)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.error_num()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = file_name(parent, name).and_then(|name| self.fs.delete(name).map_err(|e| e.error_num()));
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let result = file_name(parent, name).and_then(|old| {
            let new = file_name(newparent, newname)?;
            self.fs.rename(old, new).map_err(|e| e.error_num())
        });
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }
}
