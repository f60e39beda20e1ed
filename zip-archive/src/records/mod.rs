//! Wire records of the archive container
//!
//! Every record reads and writes itself over `std::io` streams, and
//! reports its exact encoded size through `structure_length` so that
//! finalization can compute offsets without serializing anything.
//! All integers are little-endian; strings go on the wire as a byte count
//! in the fixed header followed by raw UTF-8.

mod central;
mod eocd;
mod local;

pub use central::{CentralDirectoryFile, CentralDirectorySection, CENTRAL_FILE_SIGNATURE};
pub use eocd::{EndOfCentralDirectory, END_OF_CENTRAL_DIRECTORY_SIGNATURE};
pub use local::{
    DataDescriptor, LocalFile, LocalSectionParts, DATA_DESCRIPTOR_SIGNATURE, LOCAL_FILE_SIGNATURE,
};

use std::io::Read;

use crate::error::{ArchiveError, Result};

pub(crate) fn read_string<R: Read>(reader: &mut R, len: usize, field: &'static str) -> Result<String> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| ArchiveError::InvalidString(field))
}

/// Little-endian u32 at `pos`; the caller guarantees four bytes exist.
pub(crate) fn le_u32_at(bytes: &[u8], pos: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[pos..pos + 4]);
    u32::from_le_bytes(word)
}
