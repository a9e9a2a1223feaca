use crate::consts::{
    Block, BlockPointer, BlockPointers, ACTIVE_STATUS, BLOCKS_PER_EXTENT, BLOCK_SIZE, ENTRIES_PER_BLOCK, ENTRY_SIZE,
    EXTENSION_LENGTH, FREE_STATUS, NAME_LENGTH, RECORD_SIZE,
};
use crate::util::error::{Error, Result};
use crate::util::name::FileName;
use crate::util::serializable::{ByteSerializable, KnownSize};

const STATUS_OFFSET: usize = 0;
const NAME_OFFSET: usize = 1;
const EXTENSION_OFFSET: usize = 9;
const XL_OFFSET: usize = 12;
const BC_OFFSET: usize = 13;
const XH_OFFSET: usize = 14;
const RC_OFFSET: usize = 15;
const BLOCKS_OFFSET: usize = 16;

const PAD: u8 = b' ';
const XL_BITS: u32 = 5;
const XL_MASK: u8 = (1 << XL_BITS) - 1;
const XH_MASK: u8 = 0x3F;

/// One slot of the directory block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryEntry {
    /// Deleted or never used. The bytes after the status are kept so the slot
    /// survives a decode/encode cycle untouched.
    Free([u8; ENTRY_SIZE - 1]),
    Active(ExtentEntry),
}

/// The active form of a directory entry: one 16-block segment of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtentEntry {
    pub status: u8,
    pub name: String,
    pub extension: String,
    pub xl: u8,
    pub bc: u8,
    pub xh: u8,
    pub rc: u8,
    pub blocks: BlockPointers,
}

impl ExtentEntry {
    pub fn new(file: &FileName, extent_number: u16) -> ExtentEntry {
        ExtentEntry {
            status: ACTIVE_STATUS,
            name: file.name.clone(),
            extension: file.extension.clone(),
            xl: extent_number as u8 & XL_MASK,
            bc: 0,
            xh: (extent_number >> XL_BITS) as u8 & XH_MASK,
            rc: 0,
            blocks: [0; BLOCKS_PER_EXTENT],
        }
    }

    pub fn extent_number(&self) -> u16 {
        ((self.xh & XH_MASK) as u16) << XL_BITS | (self.xl & XL_MASK) as u16
    }

    pub fn file_name(&self) -> FileName {
        FileName { name: self.name.clone(), extension: self.extension.clone() }
    }

    /// Names on disk may be in either case; they match regardless.
    pub fn is_named(&self, file: &FileName) -> bool {
        self.name.eq_ignore_ascii_case(&file.name) && self.extension.eq_ignore_ascii_case(&file.extension)
    }

    pub fn rename(&mut self, file: &FileName) {
        self.name = file.name.clone();
        self.extension = file.extension.clone();
    }

    /// Bytes stored in this extent according to RC and BC.
    pub fn byte_len(&self) -> u64 {
        let records = self.rc as u64 * RECORD_SIZE as u64;
        if self.bc == 0 {
            records
        } else {
            records.saturating_sub((RECORD_SIZE - self.bc as usize) as u64)
        }
    }

    pub fn set_byte_len(&mut self, len: usize) {
        self.rc = len.div_ceil(RECORD_SIZE) as u8;
        self.bc = (len % RECORD_SIZE) as u8;
    }

    /// Bytes covered by allocated blocks, holes excluded.
    pub fn allocated_len(&self) -> u64 {
        self.used_blocks().count() as u64 * BLOCK_SIZE as u64
    }

    pub fn used_blocks(&self) -> impl Iterator<Item = BlockPointer> + '_ {
        self.blocks.iter().copied().filter(|&block| block != 0)
    }

    /// Turns the entry into a free slot, leaving everything but the status byte as it was.
    pub fn retire(&self) -> DirectoryEntry {
        let bytes = self.to_bytes();
        let mut residue = [0u8; ENTRY_SIZE - 1];
        residue.copy_from_slice(&bytes[1..]);
        DirectoryEntry::Free(residue)
    }

    fn to_bytes(&self) -> [u8; ENTRY_SIZE] {
        let mut bytes = [PAD; ENTRY_SIZE];
        bytes[STATUS_OFFSET] = self.status;
        write_padded(&mut bytes[NAME_OFFSET..NAME_OFFSET + NAME_LENGTH], &self.name);
        write_padded(&mut bytes[EXTENSION_OFFSET..EXTENSION_OFFSET + EXTENSION_LENGTH], &self.extension);
        bytes[XL_OFFSET] = self.xl;
        bytes[BC_OFFSET] = self.bc;
        bytes[XH_OFFSET] = self.xh;
        bytes[RC_OFFSET] = self.rc;
        bytes[BLOCKS_OFFSET..].copy_from_slice(&self.blocks);
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> ExtentEntry {
        let mut blocks = [0; BLOCKS_PER_EXTENT];
        blocks.copy_from_slice(&bytes[BLOCKS_OFFSET..ENTRY_SIZE]);

        ExtentEntry {
            status: bytes[STATUS_OFFSET],
            name: read_trimmed(&bytes[NAME_OFFSET..NAME_OFFSET + NAME_LENGTH]),
            extension: read_trimmed(&bytes[EXTENSION_OFFSET..EXTENSION_OFFSET + EXTENSION_LENGTH]),
            xl: bytes[XL_OFFSET],
            bc: bytes[BC_OFFSET],
            xh: bytes[XH_OFFSET],
            rc: bytes[RC_OFFSET],
            blocks,
        }
    }
}

// Names are kept byte-for-char so foreign bytes survive a round trip.
fn read_trimmed(field: &[u8]) -> String {
    let end = field.iter().rposition(|&b| b != PAD && b != 0).map_or(0, |i| i + 1);
    field[..end].iter().map(|&b| b as char).collect()
}

fn write_padded(field: &mut [u8], value: &str) {
    field.fill(PAD);
    for (slot, c) in field.iter_mut().zip(value.chars()) {
        *slot = c as u8;
    }
}

impl ByteSerializable for DirectoryEntry {
    fn to_bytes(&self) -> Vec<u8> {
        match self {
            DirectoryEntry::Free(residue) => {
                let mut bytes = Vec::with_capacity(ENTRY_SIZE);
                bytes.push(FREE_STATUS);
                bytes.extend_from_slice(residue);
                bytes
            }
            DirectoryEntry::Active(entry) => entry.to_bytes().to_vec(),
        }
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        if bytes[STATUS_OFFSET] == FREE_STATUS {
            let mut residue = [0u8; ENTRY_SIZE - 1];
            residue.copy_from_slice(&bytes[1..ENTRY_SIZE]);
            DirectoryEntry::Free(residue)
        } else {
            DirectoryEntry::Active(ExtentEntry::from_bytes(bytes))
        }
    }
}

impl KnownSize for DirectoryEntry {
    fn size_on_disk() -> usize {
        ENTRY_SIZE
    }
}

pub fn decode(block: &Block, index: usize) -> Result<DirectoryEntry> {
    if index >= ENTRIES_PER_BLOCK {
        return Err(Error::InvalidIndex(index));
    }
    let offset = index * DirectoryEntry::size_on_disk();
    Ok(DirectoryEntry::from_bytes(&block[offset..offset + DirectoryEntry::size_on_disk()]))
}

pub fn encode(entry: &DirectoryEntry, index: usize, block: &mut Block) -> Result<()> {
    if index >= ENTRIES_PER_BLOCK {
        return Err(Error::InvalidIndex(index));
    }
    let offset = index * DirectoryEntry::size_on_disk();
    block[offset..offset + DirectoryEntry::size_on_disk()].copy_from_slice(&entry.to_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        let mut block = [FREE_STATUS; BLOCK_SIZE];
        let entry: [u8; ENTRY_SIZE] = [
            0x00, b'H', b'E', b'L', b'L', b'O', b' ', b' ', b' ', b'T', b'X', b'T', 0x21, 0x50, 0x01, 0x13, 1, 2, 3, 0, 0,
            0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 9,
        ];
        block[ENTRY_SIZE * 3..ENTRY_SIZE * 4].copy_from_slice(&entry);
        block[ENTRY_SIZE * 5] = 0x00;
        block[ENTRY_SIZE * 5 + 1..ENTRY_SIZE * 5 + 9].copy_from_slice(b"AB\0\0    ");
        block
    }

    #[test]
    fn decode_fields() {
        let block = sample_block();
        match decode(&block, 3).unwrap() {
            DirectoryEntry::Active(entry) => {
                assert_eq!(entry.name, "HELLO");
                assert_eq!(entry.extension, "TXT");
                assert_eq!(entry.xl, 0x21);
                assert_eq!(entry.bc, 0x50);
                assert_eq!(entry.xh, 0x01);
                assert_eq!(entry.rc, 0x13);
                assert_eq!(entry.extent_number(), 33);
                assert_eq!(entry.blocks, [1, 2, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 9]);
                assert_eq!(entry.used_blocks().collect::<Vec<_>>(), vec![1, 2, 3, 9]);
            }
            other => panic!("expected active entry, got {:?}", other),
        }
        assert!(matches!(decode(&block, 0).unwrap(), DirectoryEntry::Free(_)));
    }

    #[test]
    fn round_trip_every_index() {
        let block = sample_block();
        let mut copy = [0u8; BLOCK_SIZE];
        for index in 0..ENTRIES_PER_BLOCK {
            let entry = decode(&block, index).unwrap();
            encode(&entry, index, &mut copy).unwrap();
        }
        // Slot 5 was padded with NULs, which come back as spaces.
        let mut expected = block;
        expected[ENTRY_SIZE * 5 + 3] = b' ';
        expected[ENTRY_SIZE * 5 + 4] = b' ';
        assert_eq!(copy.to_vec(), expected.to_vec());
    }

    #[test]
    fn invalid_index() {
        let mut block = sample_block();
        assert!(matches!(decode(&block, ENTRIES_PER_BLOCK), Err(Error::InvalidIndex(32))));
        let entry = decode(&block, 0).unwrap();
        assert!(matches!(encode(&entry, 40, &mut block), Err(Error::InvalidIndex(40))));
    }

    #[test]
    fn extent_numbers() {
        let file = FileName::parse("A.TXT").unwrap();
        for number in [0u16, 1, 31, 32, 33, 100, 2047] {
            let entry = ExtentEntry::new(&file, number);
            assert_eq!(entry.extent_number(), number);
            assert!(entry.xl < 32);
        }
    }

    #[test]
    fn names_match_any_case() {
        let mut block = [FREE_STATUS; BLOCK_SIZE];
        block[..ENTRY_SIZE].fill(0);
        block[1..12].copy_from_slice(b"hello   txt");
        let entry = match decode(&block, 0).unwrap() {
            DirectoryEntry::Active(entry) => entry,
            other => panic!("expected active entry, got {:?}", other),
        };
        assert_eq!(entry.file_name().to_string(), "hello.txt");
        assert!(entry.is_named(&FileName::parse("hello.txt").unwrap()));
        assert!(entry.is_named(&FileName::parse("HELLO.TXT").unwrap()));
        assert!(!entry.is_named(&FileName::parse("HELLO.TX").unwrap()));
    }

    #[test]
    fn byte_lengths() {
        let mut entry = ExtentEntry::new(&FileName::parse("A").unwrap(), 0);
        for len in [0usize, 1, 127, 128, 129, 2000, 16384] {
            entry.set_byte_len(len);
            assert_eq!(entry.byte_len(), len as u64);
        }
        entry.set_byte_len(2000);
        assert_eq!((entry.rc, entry.bc), (16, 80));
    }

    #[test]
    fn retire_keeps_residue() {
        let block = sample_block();
        let entry = match decode(&block, 3).unwrap() {
            DirectoryEntry::Active(entry) => entry,
            other => panic!("expected active entry, got {:?}", other),
        };
        let retired = entry.retire().to_bytes();
        assert_eq!(retired[0], FREE_STATUS);
        assert_eq!(&retired[1..], &block[ENTRY_SIZE * 3 + 1..ENTRY_SIZE * 4]);
    }
}
