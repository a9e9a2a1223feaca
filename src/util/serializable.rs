pub trait ByteSerializable {
    fn to_bytes(&self) -> Vec<u8>;
    fn from_bytes(bytes: &[u8]) -> Self;
}

/// Records with a fixed on-disk footprint, so they can be packed side by side in a block.
pub trait KnownSize: ByteSerializable {
    fn size_on_disk() -> usize;
}
