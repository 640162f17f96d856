use std::path::PathBuf;

/// The primary error type for all operations in the `psarc` crate.
#[derive(Debug)]
pub enum PsarcError {
    /// An I/O error occurred, typically while reading or writing a file.
    /// Includes the path where the error happened when one is known.
    Io { source: std::io::Error, path: PathBuf },

    /// A fixed-size region of the archive ended before all expected bytes
    /// were read.
    Truncated(&'static str),

    /// The first four bytes of the file are not `PSAR`.
    InvalidMagic,

    /// The header names a compression codec other than `zlib` or `lzma`.
    UnsupportedCodec([u8; 4]),

    /// The table of contents is internally inconsistent.
    BadToc(&'static str),

    /// A compressed block was rejected by its codec.
    Decode(String),

    /// A block decompressed to a length other than the one implied by the
    /// entry's size and position.
    SizeMismatch { expected: u64, actual: u64 },

    /// The output path already exists and overwriting was not requested.
    Conflict { path: PathBuf },

    /// Create mode was invoked but no pattern matched a regular file.
    NoInputs,

    /// The block size is zero or larger than 2^32.
    InvalidBlockSize(u64),
}

impl std::fmt::Display for PsarcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PsarcError::Io { source, path } if path.as_os_str().is_empty() => {
                write!(f, "I/O error: {}", source)
            }
            PsarcError::Io { source, path } => {
                write!(f, "I/O error on path '{}': {}", path.display(), source)
            }
            PsarcError::Truncated(what) => write!(f, "truncated archive: {} is short", what),
            PsarcError::InvalidMagic => write!(f, "not a PSARC archive (bad magic)"),
            PsarcError::UnsupportedCodec(tag) => {
                write!(f, "unsupported compression type '{}'", String::from_utf8_lossy(tag))
            }
            PsarcError::BadToc(what) => write!(f, "corrupt table of contents: {}", what),
            PsarcError::Decode(msg) => write!(f, "decompression failed: {}", msg),
            PsarcError::SizeMismatch { expected, actual } => {
                write!(f, "block decompressed to {} bytes, expected {}", actual, expected)
            }
            PsarcError::Conflict { path } => {
                write!(f, "'{}' already exists (use --overwrite)", path.display())
            }
            PsarcError::NoInputs => write!(f, "no matching files found to create an archive"),
            PsarcError::InvalidBlockSize(size) => write!(f, "invalid block size {}", size),
        }
    }
}

impl std::error::Error for PsarcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PsarcError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PsarcError {
    fn from(err: std::io::Error) -> Self {
        PsarcError::Io { source: err, path: PathBuf::new() }
    }
}

impl PsarcError {
    /// Attach a path to a raw I/O error.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        PsarcError::Io { source, path: path.into() }
    }
}
