use std::cmp::min;

use log::{debug, info, warn};

use crate::consts::{BLOCK_SIZE, EXTENT_BYTES};
use crate::driver::DeviceDriver;
use crate::ops::handle::{FileHandle, Mode, OpenFile};
use crate::ops::{file_size, CpmFs};
use crate::structure::directory::Directory;
use crate::structure::entry::{DirectoryEntry, ExtentEntry};
use crate::util::error::{Error, Result};
use crate::util::name::FileName;

/// Splits a byte position into extent number, block within the extent and offset within the block.
fn locate(position: u64) -> (u16, usize, usize) {
    let within = (position % EXTENT_BYTES) as usize;
    ((position / EXTENT_BYTES) as u16, within / BLOCK_SIZE, within % BLOCK_SIZE)
}

impl<A: DeviceDriver> CpmFs<A> {
    /// Opens `name`. Writing creates the file when it is missing and appends
    /// to it otherwise.
    pub fn open(&mut self, name: &str, mode: Mode) -> Result<FileHandle> {
        let file = FileName::parse(name)?;
        let mut directory = self.directory()?;
        let mut extents = directory.extents_of(&file);

        if extents.is_empty() {
            if mode == Mode::Read {
                return Err(Error::NotFound(name.to_string()));
            }
            let slot = directory.free_slot().ok_or(Error::OutOfDirectorySlots)?;
            let entry = ExtentEntry::new(&file, 0);
            directory.set_entry(slot, &DirectoryEntry::Active(entry.clone()))?;
            directory.write(&mut self.io)?;
            debug!("Created {} in slot {}", file, slot);
            extents.push((slot, entry));
        }

        let cursor = match mode {
            Mode::Read => 0,
            Mode::Write => file_size(&extents),
        };
        let handle = self.handles.insert(OpenFile::new(file, mode, slots_of(&extents), cursor));
        debug!("Opened {} as {} ({:?})", name, handle, mode);
        Ok(handle)
    }

    /// Reads up to `size` bytes from the cursor. Returns fewer at end of file.
    pub fn read(&mut self, handle: FileHandle, size: usize) -> Result<Vec<u8>> {
        let file = self.handles.get(handle)?;
        if file.mode != Mode::Read {
            return Err(Error::NotOpenForRead(handle));
        }
        let cursor = file.cursor;

        let directory = self.directory()?;
        let extents = self.handle_extents(&directory, handle)?;
        let end = min(file_size(&extents), cursor.saturating_add(size as u64));

        let mut data = Vec::with_capacity(end.saturating_sub(cursor) as usize);
        let mut position = cursor;
        while position < end {
            let (extent_number, block_index, offset) = locate(position);
            let count = min(BLOCK_SIZE - offset, (end - position) as usize);
            let pointer = extents
                .iter()
                .find(|(_, entry)| entry.extent_number() == extent_number)
                .map_or(0, |(_, entry)| entry.blocks[block_index]);

            if pointer == 0 {
                data.resize(data.len() + count, 0);
            } else {
                let block = self.io.read_block(pointer as u64)?;
                data.extend_from_slice(&block[offset..offset + count]);
            }
            position += count as u64;
        }

        let file = self.handles.get_mut(handle)?;
        file.cursor = file.cursor.max(position);
        file.extents = slots_of(&extents);
        Ok(data)
    }

    /// Writes `data` at the cursor and returns how many bytes were committed.
    ///
    /// Running out of blocks or directory slots part way through is not rolled
    /// back: the directory keeps the committed prefix and the short count is
    /// returned. The error is only reported when nothing could be written.
    pub fn write(&mut self, handle: FileHandle, data: &[u8]) -> Result<usize> {
        match self.write_prefix(handle, data)? {
            (written, Some(error)) if written == 0 => Err(error),
            (written, Some(error)) => {
                warn!("Short write on {}: {} of {} bytes ({})", handle, written, data.len(), error);
                Ok(written)
            }
            (written, None) => Ok(written),
        }
    }

    pub fn seek(&mut self, handle: FileHandle, offset: u64) -> Result<()> {
        let size = file_size(&self.handle_extents(&self.directory()?, handle)?);
        if offset > size {
            return Err(Error::SeekOutOfRange { offset, size });
        }
        self.handles.get_mut(handle)?.cursor = offset;
        Ok(())
    }

    pub fn close(&mut self, handle: FileHandle) -> Result<()> {
        let file = self.handles.remove(handle)?;
        if file.dirty {
            self.io.flush()?;
        }
        debug!("Closed {} ({})", handle, file.name);
        Ok(())
    }

    /// Empties `name`. The first extent keeps its slot; the others are freed.
    pub fn truncate(&mut self, name: &str) -> Result<()> {
        let file = FileName::parse(name)?;
        let mut directory = self.directory()?;
        let extents = resolve(&directory, &file)?;

        if let Some(((first_slot, first), rest)) = extents.split_first() {
            let mut emptied = ExtentEntry::new(&first.file_name(), 0);
            emptied.status = first.status;
            directory.set_entry(*first_slot, &DirectoryEntry::Active(emptied))?;
            for (slot, entry) in rest {
                directory.set_entry(*slot, &entry.retire())?;
            }
        }
        directory.write(&mut self.io)?;
        self.block_map.rebuild(&directory);
        info!("Truncated {} ({} extents)", file, extents.len());
        Ok(())
    }

    /// Copies `src` into a new file `dst` with its own blocks.
    pub fn copy(&mut self, src: &str, dst: &str) -> Result<()> {
        let source = FileName::parse(src)?;
        let target = FileName::parse(dst)?;

        let directory = self.directory()?;
        if directory.contains(&target) {
            return Err(Error::DuplicateName(dst.to_string()));
        }
        if !directory.contains(&source) {
            return Err(Error::NotFound(src.to_string()));
        }

        let reader = self.open(src, Mode::Read)?;
        let data = self.read(reader, usize::MAX);
        self.close(reader)?;
        let data = data?;

        let writer = self.open(dst, Mode::Write)?;
        let outcome = self.write_prefix(writer, &data);
        self.close(writer)?;
        match outcome? {
            (_, Some(error)) => Err(error),
            (written, None) => {
                debug!("Copied {} to {} ({} bytes)", source, target, written);
                Ok(())
            }
        }
    }

    fn write_prefix(&mut self, handle: FileHandle, data: &[u8]) -> Result<(usize, Option<Error>)> {
        let file = self.handles.get(handle)?;
        if file.mode != Mode::Write {
            return Err(Error::NotOpenForWrite(handle));
        }
        let name = file.name.clone();
        if data.is_empty() {
            return Ok((0, None));
        }

        // Allocation works against the directory that is about to be persisted.
        let mut directory = self.directory()?;
        let mut extents = self.handle_extents(&directory, handle)?;
        self.block_map.rebuild(&directory);
        let mut cursor = min(self.handles.get(handle)?.cursor, file_size(&extents));

        let mut written = 0;
        let mut failure = None;
        while written < data.len() {
            match self.write_chunk(&mut directory, &mut extents, &name, cursor, &data[written..]) {
                Ok(count) => {
                    written += count;
                    cursor += count as u64;
                }
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }

        if written > 0 {
            directory.write(&mut self.io)?;
        }

        let file = self.handles.get_mut(handle)?;
        file.cursor = cursor;
        file.dirty |= written > 0;
        file.extents = slots_of(&extents);
        Ok((written, failure))
    }

    /// Writes as much of `bytes` as fits in the block at `position`. A new
    /// extent is added to `extents` when the position lies past the last one.
    fn write_chunk(
        &mut self,
        directory: &mut Directory,
        extents: &mut Vec<(usize, ExtentEntry)>,
        name: &FileName,
        position: u64,
        bytes: &[u8],
    ) -> Result<usize> {
        let (extent_number, block_index, offset) = locate(position);
        let count = min(BLOCK_SIZE - offset, bytes.len());

        let known = extents.iter().position(|(_, entry)| entry.extent_number() == extent_number);
        let (slot, mut entry) = match known {
            Some(i) => (Some(extents[i].0), extents[i].1.clone()),
            None => (None, ExtentEntry::new(name, extent_number)),
        };

        let mut block = match entry.blocks[block_index] {
            0 => {
                entry.blocks[block_index] = self.block_map.allocate(1)?[0];
                [0u8; BLOCK_SIZE]
            }
            pointer => self.io.read_block(pointer as u64)?,
        };

        let slot = match slot.or_else(|| directory.free_slot()) {
            Some(slot) => slot,
            None => {
                self.block_map.release(&[entry.blocks[block_index]]);
                return Err(Error::OutOfDirectorySlots);
            }
        };

        block[offset..offset + count].copy_from_slice(&bytes[..count]);
        self.io.write_block(entry.blocks[block_index] as u64, &block)?;

        let end = (position % EXTENT_BYTES) as usize + count;
        if end as u64 > entry.byte_len() {
            entry.set_byte_len(end);
        }
        directory.set_entry(slot, &DirectoryEntry::Active(entry.clone()))?;
        match known {
            Some(i) => extents[i].1 = entry,
            None => {
                extents.push((slot, entry));
                extents.sort_by_key(|(_, entry)| entry.extent_number());
            }
        }
        Ok(count)
    }

    /// The handle's extents as they stand in `directory`. The slots recorded on
    /// the handle are used while they still hold every extent of the file;
    /// otherwise the file is looked up by name again.
    fn handle_extents(&self, directory: &Directory, handle: FileHandle) -> Result<Vec<(usize, ExtentEntry)>> {
        let file = self.handles.get(handle)?;
        let recorded: Option<Vec<(usize, ExtentEntry)>> = file
            .extents
            .iter()
            .map(|&slot| match directory.entry(slot) {
                Ok(DirectoryEntry::Active(entry)) if entry.is_named(&file.name) => Some((slot, entry)),
                _ => None,
            })
            .collect();

        match recorded {
            Some(mut extents) if !extents.is_empty() && extents.len() == directory.count_of(&file.name) => {
                extents.sort_by_key(|(_, entry)| entry.extent_number());
                Ok(extents)
            }
            _ => {
                debug!("Extent slots of {} are stale, looking up {} again", handle, file.name);
                resolve(directory, &file.name)
            }
        }
    }
}

fn resolve(directory: &Directory, name: &FileName) -> Result<Vec<(usize, ExtentEntry)>> {
    let extents = directory.extents_of(name);
    if extents.is_empty() {
        return Err(Error::NotFound(name.to_string()));
    }
    Ok(extents)
}

fn slots_of(extents: &[(usize, ExtentEntry)]) -> Vec<usize> {
    extents.iter().map(|(slot, _)| *slot).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{BLOCKS_PER_EXTENT, ENTRIES_PER_BLOCK, NUM_BLOCKS};
    use crate::driver::memory_drive::MemoryDrive;
    use crate::ops::tests::blank_fs;

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8 ^ seed).collect()
    }

    fn create<A: DeviceDriver>(fs: &mut CpmFs<A>, name: &str, data: &[u8]) {
        let handle = fs.open(name, Mode::Write).unwrap();
        assert_eq!(fs.write(handle, data).unwrap(), data.len());
        fs.close(handle).unwrap();
    }

    fn read_all<A: DeviceDriver>(fs: &mut CpmFs<A>, name: &str) -> Vec<u8> {
        let handle = fs.open(name, Mode::Read).unwrap();
        let data = fs.read(handle, usize::MAX).unwrap();
        fs.close(handle).unwrap();
        data
    }

    #[test]
    fn locate_positions() {
        assert_eq!(locate(0), (0, 0, 0));
        assert_eq!(locate(1023), (0, 0, 1023));
        assert_eq!(locate(1024), (0, 1, 0));
        assert_eq!(locate(EXTENT_BYTES + 2050), (1, 2, 2));
    }

    #[test]
    fn write_close_reopen_read() {
        let mut fs = blank_fs();
        let data = pattern(2000, 0x5A);
        create(&mut fs, "A.TXT", &data);

        let handle = fs.open("A.TXT", Mode::Read).unwrap();
        assert_eq!(fs.read(handle, 2000).unwrap(), data);
        assert!(fs.read(handle, 10).unwrap().is_empty());
        fs.close(handle).unwrap();

        let entry = &fs.directory().unwrap().active()[0].1;
        assert_eq!(entry.used_blocks().count(), 2);
        assert_eq!((entry.rc, entry.bc), (16, 80));
    }

    #[test]
    fn sequential_reads() {
        let mut fs = blank_fs();
        let data = pattern(5000, 1);
        create(&mut fs, "SEQ", &data);

        let handle = fs.open("SEQ", Mode::Read).unwrap();
        let mut collected = Vec::new();
        loop {
            let chunk = fs.read(handle, 700).unwrap();
            if chunk.is_empty() {
                break;
            }
            collected.extend(chunk);
        }
        assert_eq!(collected, data);
    }

    #[test]
    fn multi_extent_file() {
        let mut fs = blank_fs();
        let data = pattern(2 * BLOCKS_PER_EXTENT * BLOCK_SIZE + 777, 9);
        create(&mut fs, "BIG.DAT", &data);

        let directory = fs.directory().unwrap();
        let numbers: Vec<u16> = directory
            .extents_of(&FileName::parse("BIG.DAT").unwrap())
            .iter()
            .map(|(_, entry)| entry.extent_number())
            .collect();
        assert_eq!(numbers, vec![0, 1, 2]);
        assert_eq!(fs.stat("BIG.DAT").unwrap().size, data.len() as u64);
        assert_eq!(read_all(&mut fs, "BIG.DAT"), data);
    }

    #[test]
    fn append_across_writes() {
        let mut fs = blank_fs();
        let data = pattern(BLOCKS_PER_EXTENT * BLOCK_SIZE + 100, 3);
        let (first, second) = data.split_at(1500);
        create(&mut fs, "LOG", first);

        let handle = fs.open("LOG", Mode::Write).unwrap();
        for piece in second.chunks(999) {
            assert_eq!(fs.write(handle, piece).unwrap(), piece.len());
        }
        fs.close(handle).unwrap();

        assert_eq!(fs.find("LOG").unwrap().len(), 2);
        assert_eq!(read_all(&mut fs, "LOG"), data);
    }

    #[test]
    fn seek_and_overwrite() {
        let mut fs = blank_fs();
        create(&mut fs, "A.TXT", &pattern(3000, 0));

        let handle = fs.open("A.TXT", Mode::Write).unwrap();
        fs.seek(handle, 1020).unwrap();
        fs.write(handle, &[0xFF; 8]).unwrap();
        assert!(matches!(fs.seek(handle, 3001), Err(Error::SeekOutOfRange { offset: 3001, size: 3000 })));
        fs.close(handle).unwrap();

        let mut expected = pattern(3000, 0);
        expected[1020..1028].fill(0xFF);
        assert_eq!(read_all(&mut fs, "A.TXT"), expected);

        let handle = fs.open("A.TXT", Mode::Read).unwrap();
        fs.seek(handle, 2990).unwrap();
        assert_eq!(fs.read(handle, 100).unwrap(), expected[2990..].to_vec());
    }

    #[test]
    fn open_missing_for_read() {
        let mut fs = blank_fs();
        assert!(matches!(fs.open("NONE.TXT", Mode::Read), Err(Error::NotFound(_))));
        assert!(matches!(fs.open("BAD.NAME.TXT", Mode::Write), Err(Error::InvalidName(_))));
    }

    #[test]
    fn open_empty_file_for_write() {
        let mut fs = blank_fs();
        let handle = fs.open("NEW.TXT", Mode::Write).unwrap();
        fs.close(handle).unwrap();
        assert_eq!(fs.stat("NEW.TXT").unwrap().size, 0);
        assert!(read_all(&mut fs, "NEW.TXT").is_empty());
    }

    #[test]
    fn handle_state_machine() {
        let mut fs = blank_fs();
        let writer = fs.open("A.TXT", Mode::Write).unwrap();
        assert!(matches!(fs.read(writer, 1), Err(Error::NotOpenForRead(_))));
        fs.write(writer, b"hello").unwrap();
        fs.close(writer).unwrap();

        assert!(matches!(fs.close(writer), Err(Error::InvalidHandle(_))));
        assert!(matches!(fs.write(writer, b"x"), Err(Error::InvalidHandle(_))));
        assert!(matches!(fs.read(writer, 1), Err(Error::InvalidHandle(_))));

        let reader = fs.open("A.TXT", Mode::Read).unwrap();
        assert!(matches!(fs.write(reader, b"x"), Err(Error::NotOpenForWrite(_))));
        assert_eq!(fs.read(reader, 100).unwrap(), b"hello".to_vec());
        fs.close(reader).unwrap();
        assert_eq!(fs.open_files(), 0);
    }

    #[test]
    fn out_of_space_keeps_prefix() {
        // 8 blocks: the directory plus 7 data blocks.
        let mut fs = CpmFs::mount(MemoryDrive::new(8, 1024)).unwrap();
        let data = pattern(10 * BLOCK_SIZE, 2);

        let handle = fs.open("FULL", Mode::Write).unwrap();
        assert_eq!(fs.write(handle, &data).unwrap(), 7 * BLOCK_SIZE);
        let before = fs.directory().unwrap().as_block().to_vec();
        assert!(matches!(fs.write(handle, &data), Err(Error::OutOfSpace { .. })));
        assert_eq!(fs.directory().unwrap().as_block().to_vec(), before);
        fs.close(handle).unwrap();

        assert_eq!(fs.stat("FULL").unwrap().size, 7 * BLOCK_SIZE as u64);
        assert_eq!(read_all(&mut fs, "FULL"), data[..7 * BLOCK_SIZE].to_vec());
        assert_eq!(fs.free_blocks().unwrap(), 0);
    }

    #[test]
    fn handles_follow_extent_slots() {
        let mut fs = blank_fs();
        create(&mut fs, "A.TXT", &pattern(100, 0));
        let reader = fs.open("A.TXT", Mode::Read).unwrap();
        let writer = fs.open("A.TXT", Mode::Write).unwrap();
        assert_eq!(fs.handles.get(reader).unwrap().extents, vec![0]);

        let tail = pattern(BLOCKS_PER_EXTENT * BLOCK_SIZE, 1);
        assert_eq!(fs.write(writer, &tail).unwrap(), tail.len());
        assert_eq!(fs.handles.get(writer).unwrap().extents, fs.find("A.TXT").unwrap());
        assert_eq!(fs.handles.get(writer).unwrap().extents.len(), 2);

        // The reader only recorded the first extent; the second one is picked up.
        let data = fs.read(reader, usize::MAX).unwrap();
        assert_eq!(data.len(), 100 + tail.len());
        assert_eq!(&data[100..], &tail[..]);
        assert_eq!(fs.handles.get(reader).unwrap().extents, fs.find("A.TXT").unwrap());

        fs.rename("A.TXT", "B.TXT").unwrap();
        assert!(matches!(fs.seek(reader, 0), Err(Error::NotFound(_))));
        assert!(matches!(fs.write(writer, b"x"), Err(Error::NotFound(_))));

        fs.rename("B.TXT", "A.TXT").unwrap();
        fs.seek(reader, 0).unwrap();
        assert_eq!(fs.read(reader, 100).unwrap(), pattern(100, 0));
    }

    #[test]
    fn truncate_keeps_first_slot() {
        let mut fs = blank_fs();
        create(&mut fs, "KEEP", &pattern(500, 0));
        let free = fs.free_blocks().unwrap();
        create(&mut fs, "BIG.DAT", &pattern(2 * BLOCKS_PER_EXTENT * BLOCK_SIZE + 10, 5));
        let first_slot = fs.find("BIG.DAT").unwrap()[0];
        let writer = fs.open("BIG.DAT", Mode::Write).unwrap();

        fs.truncate("big.dat").unwrap();
        assert_eq!(fs.find("BIG.DAT").unwrap(), vec![first_slot]);
        assert_eq!(fs.stat("BIG.DAT").unwrap().size, 0);
        assert_eq!(fs.free_blocks().unwrap(), free);

        // The writer's cursor was past the end; it lands at the new end.
        assert_eq!(fs.write(writer, b"abc").unwrap(), 3);
        fs.close(writer).unwrap();
        assert_eq!(read_all(&mut fs, "BIG.DAT"), b"abc".to_vec());
        assert_eq!(read_all(&mut fs, "KEEP"), pattern(500, 0));
        assert!(matches!(fs.truncate("NONE"), Err(Error::NotFound(_))));
    }

    #[test]
    fn out_of_directory_slots() {
        let mut fs = blank_fs();
        for i in 0..ENTRIES_PER_BLOCK - 1 {
            create(&mut fs, &format!("F{}", i), b"x");
        }
        let handle = fs.open("LAST", Mode::Write).unwrap();
        assert!(matches!(fs.open("MORE", Mode::Write), Err(Error::OutOfDirectorySlots)));

        let data = pattern(BLOCKS_PER_EXTENT * BLOCK_SIZE + 10, 4);
        assert_eq!(fs.write(handle, &data).unwrap(), BLOCKS_PER_EXTENT * BLOCK_SIZE);
        assert!(matches!(fs.write(handle, &data), Err(Error::OutOfDirectorySlots)));
        fs.close(handle).unwrap();

        assert_eq!(fs.stat("LAST").unwrap().size, (BLOCKS_PER_EXTENT * BLOCK_SIZE) as u64);
        assert_eq!(fs.free_blocks().unwrap(), NUM_BLOCKS - 1 - (ENTRIES_PER_BLOCK - 1) - BLOCKS_PER_EXTENT);
    }

    #[test]
    fn copy_is_independent() {
        let mut fs = blank_fs();
        let data = pattern(BLOCKS_PER_EXTENT * BLOCK_SIZE + 3000, 6);
        create(&mut fs, "A.TXT", &data);
        fs.copy("A.TXT", "C.TXT").unwrap();
        assert_eq!(read_all(&mut fs, "C.TXT"), data);

        let directory = fs.directory().unwrap();
        let blocks_of = |name: &str| -> Vec<u8> {
            directory
                .extents_of(&FileName::parse(name).unwrap())
                .iter()
                .flat_map(|(_, entry)| entry.used_blocks().collect::<Vec<_>>())
                .collect()
        };
        let (a, c) = (blocks_of("A.TXT"), blocks_of("C.TXT"));
        assert_eq!(a.len(), c.len());
        assert!(a.iter().all(|block| !c.contains(block)));

        let handle = fs.open("C.TXT", Mode::Write).unwrap();
        fs.seek(handle, 0).unwrap();
        fs.write(handle, &[0; 4096]).unwrap();
        fs.write(handle, b"tail").unwrap();
        fs.close(handle).unwrap();
        assert_eq!(read_all(&mut fs, "A.TXT"), data);
    }

    #[test]
    fn copy_errors() {
        let mut fs = blank_fs();
        create(&mut fs, "A.TXT", b"abc");
        create(&mut fs, "B.TXT", b"def");
        assert!(matches!(fs.copy("A.TXT", "B.TXT"), Err(Error::DuplicateName(_))));
        assert!(matches!(fs.copy("X.TXT", "C.TXT"), Err(Error::NotFound(_))));
        assert!(matches!(fs.copy("A.TXT", "C/TXT"), Err(Error::InvalidName(_))));
        assert!(matches!(fs.find("C.TXT"), Err(Error::NotFound(_))));
    }

    #[test]
    fn copy_out_of_space() {
        let mut fs = CpmFs::mount(MemoryDrive::new(8, 1024)).unwrap();
        create(&mut fs, "A.TXT", &pattern(4 * BLOCK_SIZE, 1));
        assert!(matches!(fs.copy("A.TXT", "B.TXT"), Err(Error::OutOfSpace { .. })));
        assert_eq!(fs.stat("B.TXT").unwrap().size, 3 * BLOCK_SIZE as u64);
        assert_eq!(fs.open_files(), 0);
    }
}
