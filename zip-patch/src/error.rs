//! Error types for patch generation and application

use thiserror::Error;
use zip_archive::ArchiveError;

/// Result type for patch operations
pub type Result<T> = std::result::Result<T, PatchError>;

/// Patch error types
#[derive(Error, Debug)]
pub enum PatchError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Container-level error from the archive layer
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Version header named a layout this reader does not understand
    #[error("Unsupported patch version: {0}")]
    UnsupportedVersion(u32),

    /// Unknown directive tag
    #[error("Unknown directive tag: {0:#04x}")]
    UnknownDirective(u8),

    /// The stream did not open with a BEGIN directive
    #[error("Patch stream does not start with a BEGIN directive")]
    MissingBegin,

    /// A BEGIN directive appeared after the first position
    #[error("BEGIN directive not at the start of the stream")]
    UnexpectedBegin,

    /// A PATCH directive referenced an unregistered delta engine
    #[error("No delta engine registered for id {0}")]
    UnknownDeltaEngine(u32),

    /// A PATCH directive referenced an unregistered compression engine
    #[error("No compression engine registered for id {0}")]
    UnknownCompressionEngine(u32),

    /// A catalog entry had no matching local section
    #[error("Entry in central directory has no local section: {0}")]
    MissingEntry(String),

    /// Delta blob failed structural validation
    #[error("Corrupt delta: {0}")]
    CorruptDelta(String),

    /// Engine output did not match the declared size
    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}
