//! ZIP container model
//!
//! Record-level codec for the deflate-based archive family: local file
//! headers, data descriptors, the central directory and its trailer. On top
//! of the records sit an in-memory [`Archive`] that loads from and
//! serializes to bytes, and a deflating [`ArchiveBuilder`] for producing
//! archives from scratch.
//!
//! Scope is deliberately 32-bit: no ZIP64, no encryption, no multi-volume
//! archives, and only the stored and deflated compression methods.

pub mod archive;
pub mod builder;
pub mod error;
pub mod meta;
pub mod msdos;
pub mod records;

pub use archive::Archive;
pub use builder::ArchiveBuilder;
pub use error::{ArchiveError, Result};
pub use msdos::DosDateTime;
pub use records::{
    CentralDirectoryFile, CentralDirectorySection, DataDescriptor, EndOfCentralDirectory,
    LocalFile, LocalSectionParts,
};
