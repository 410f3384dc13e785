use std::io;

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("io error, {0}")]
    Io(#[from] io::Error),

    #[error("bad file magic: {0:#018x}")]
    BadMagic(u64),

    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(u8),

    #[error("checksum mismatch, expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("malformed batch, {0}")]
    Malformed(String),

    #[error("unexpected eof reading snapshot")]
    UnexpectedEof,
}

impl From<jute::JuteError> for SnapshotError {
    fn from(e: jute::JuteError) -> Self {
        SnapshotError::Malformed(e.to_string())
    }
}
