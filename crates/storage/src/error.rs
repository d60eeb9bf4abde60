use std::path::PathBuf;

/// The storage engine's complete error taxonomy. Every fallible public
/// operation returns `Result<T, StorageError>`; nothing unwinds across the
/// boundary with the host application's runtime.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("truncated data: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("bad magic: expected {expected:#x}, got {actual:#x}")]
    BadMagic { expected: u32, actual: u32 },

    #[error("unsupported format version {version}")]
    UnsupportedVersion { version: u32 },

    #[error("payload size mismatch: header says {declared}, found {actual}")]
    PayloadSizeMismatch { declared: u32, actual: usize },

    #[error("truncated string: declared length {declared} exceeds {remaining} remaining bytes")]
    TruncatedString { declared: usize, remaining: usize },

    #[error("chunk has {count} distinct block types, palette overflow at 256")]
    PaletteOverflow { count: usize },

    #[error("region slot requires {sectors} sectors, exceeding the 255 limit")]
    RegionFull { sectors: usize },

    #[error("lz4 decompression produced {actual} bytes, header declared {expected}")]
    DecompressionMismatch { expected: u32, actual: usize },

    #[error("unknown entity kind byte {kind}")]
    UnknownEntityKind { kind: u8 },

    #[error("word count mismatch: expected {expected} packed words, got {actual}")]
    WordCountMismatch { expected: usize, actual: usize },

    #[error("palette bounds: index {index} outside palette of length {len}")]
    PaletteBounds { index: usize, len: usize },

    #[error("corrupt region directory: slot {slot} has sector_start {sector_start}, sector_count {sector_count}")]
    CorruptDirectory {
        slot: usize,
        sector_start: u32,
        sector_count: u8,
    },

    #[error("not found: {0}")]
    NotFound(String),
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
