use std::fmt;

use log::info;

use crate::driver::DeviceDriver;
use crate::ops::{file_size, CpmFs};
use crate::structure::entry::DirectoryEntry;
use crate::util::error::{Error, Result};
use crate::util::name::FileName;

/// One line of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    pub name: FileName,
    pub size: u64,
    /// Slot of the file's first extent.
    pub(crate) slot: usize,
}

impl fmt::Display for DirListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.name.name(), self.name.extension(), self.size)
    }
}

impl<A: DeviceDriver> CpmFs<A> {
    /// Every file once, in order of first appearance in the directory.
    pub fn list(&self) -> Result<Vec<DirListing>> {
        let directory = self.directory()?;
        let mut seen: Vec<FileName> = Vec::new();
        let mut listing = Vec::new();

        for (_, entry) in directory.active() {
            if seen.iter().any(|name| entry.is_named(name)) {
                continue;
            }
            let name = entry.file_name();
            let extents = directory.extents_of(&name);
            listing.push(DirListing { size: file_size(&extents), slot: extents[0].0, name: name.clone() });
            seen.push(name);
        }
        Ok(listing)
    }

    pub fn stat(&self, name: &str) -> Result<DirListing> {
        let file = FileName::parse(name)?;
        let extents = self.directory()?.extents_of(&file);
        if extents.is_empty() {
            return Err(Error::NotFound(name.to_string()));
        }
        Ok(DirListing { size: file_size(&extents), slot: extents[0].0, name: file })
    }

    /// Directory slots of the file's extents, ordered by extent number.
    pub fn find(&self, name: &str) -> Result<Vec<usize>> {
        let file = FileName::parse(name)?;
        let slots: Vec<usize> = self.directory()?.extents_of(&file).into_iter().map(|(slot, _)| slot).collect();
        if slots.is_empty() {
            return Err(Error::NotFound(name.to_string()));
        }
        Ok(slots)
    }

    pub fn rename(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        let old_file = FileName::parse(old_name)?;
        let new_file = FileName::parse(new_name)?;

        let mut directory = self.directory()?;
        if directory.contains(&new_file) {
            return Err(Error::DuplicateName(new_name.to_string()));
        }
        let extents = directory.extents_of(&old_file);
        if extents.is_empty() {
            return Err(Error::NotFound(old_name.to_string()));
        }

        for (slot, mut entry) in extents {
            entry.rename(&new_file);
            directory.set_entry(slot, &DirectoryEntry::Active(entry))?;
        }
        directory.write(&mut self.io)?;
        info!("Renamed {} to {}", old_file, new_file);
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<()> {
        let file = FileName::parse(name)?;

        let mut directory = self.directory()?;
        let extents = directory.extents_of(&file);
        if extents.is_empty() {
            return Err(Error::NotFound(name.to_string()));
        }

        for (slot, entry) in &extents {
            directory.set_entry(*slot, &entry.retire())?;
        }
        directory.write(&mut self.io)?;
        self.block_map.rebuild(&directory);
        info!("Deleted {} ({} extents)", file, extents.len());
        Ok(())
    }
}
