mod filesystem;

pub use filesystem::CpmFuse;
