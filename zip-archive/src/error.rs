//! Error types for archive parsing and assembly

use thiserror::Error;

/// Result type for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Archive error types
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record did not start with its magic number
    #[error("Invalid record signature: expected {expected:#010x}, got {actual:#010x}")]
    InvalidSignature { expected: u32, actual: u32 },

    /// Input ended before a record or payload completed
    #[error("Truncated input: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// A name or comment field held invalid UTF-8
    #[error("Invalid UTF-8 in {0}")]
    InvalidString(&'static str),

    /// Two entries share a file name
    #[error("Duplicate entry name: {0}")]
    DuplicateName(String),

    /// A local section or central-directory entry has no counterpart
    #[error("Entry without a matching counterpart: {0}")]
    UnpairedEntry(String),

    /// An entry defers sizes to a data descriptor that could not be located
    #[error("No data descriptor found for entry: {0}")]
    DescriptorNotFound(String),

    /// An offset or length does not fit the 32-bit container fields
    #[error("Archive exceeds 32-bit limits: {0} bytes")]
    ArchiveTooLarge(u64),

    /// Mutation attempted after finalization
    #[error("Archive already finalized")]
    AlreadyFinalized,
}
