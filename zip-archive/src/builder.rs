//! Deflating archive producer
//!
//! A deliberately small builder: enough to create valid archives at run
//! time and to produce nontrivial fixtures in tests. Compression level
//! selection and platform attributes are not supported.

use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use tracing::debug;

use crate::archive::Archive;
use crate::error::{ArchiveError, Result};
use crate::meta::{DeflateOption, DEFLATED, FLAG_SIZES_IN_DESCRIPTOR};
use crate::msdos::DosDateTime;
use crate::records::{CentralDirectoryFile, DataDescriptor, LocalFile, LocalSectionParts};

/// Version needed to extract a deflated entry (2.0).
const VERSION_DEFLATE: u16 = 20;

/// Builds an archive entry by entry, deflating payloads as they arrive.
pub struct ArchiveBuilder {
    archive: Archive,
    use_descriptors: bool,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            archive: Archive::new(),
            use_descriptors: true,
        }
    }

    /// Choose between trailing data descriptors (the default) and sizes
    /// written directly into local headers.
    pub fn use_descriptors(mut self, yes: bool) -> Self {
        self.use_descriptors = yes;
        self
    }

    /// Deflate `content` and append it under `path`.
    ///
    /// The payload goes through a raw deflate stream — no zlib wrapper —
    /// so the emitted bytes concatenate directly into the local section.
    /// CRC-32 and the uncompressed length are accumulated alongside.
    pub fn add<R: Read>(&mut self, path: &str, modified_millis: i64, mut content: R) -> Result<()> {
        let mut flags = DeflateOption::Normal.apply(0);
        if self.use_descriptors {
            flags |= FLAG_SIZES_IN_DESCRIPTOR;
        }
        let stamp = DosDateTime::from_epoch_millis(modified_millis);

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        let mut hasher = crc32fast::Hasher::new();
        let mut uncompressed: u64 = 0;
        let mut buf = [0u8; 4096];
        loop {
            let n = content.read(&mut buf)?;
            if n == 0 {
                break;
            }
            encoder.write_all(&buf[..n])?;
            hasher.update(&buf[..n]);
            uncompressed += n as u64;
        }
        let data = encoder.finish()?;
        let crc32 = hasher.finalize();

        let uncompressed_size =
            u32::try_from(uncompressed).map_err(|_| ArchiveError::ArchiveTooLarge(uncompressed))?;
        let compressed_size = u32::try_from(data.len())
            .map_err(|_| ArchiveError::ArchiveTooLarge(data.len() as u64))?;

        let mut header = LocalFile {
            version_needed: VERSION_DEFLATE,
            flags,
            compression_method: DEFLATED,
            last_modified_time: stamp.time,
            last_modified_date: stamp.date,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            file_name: path.to_owned(),
            extra_field: Vec::new(),
        };
        let descriptor = if self.use_descriptors {
            Some(DataDescriptor {
                crc32,
                compressed_size,
                uncompressed_size,
            })
        } else {
            header.crc32 = crc32;
            header.compressed_size = compressed_size;
            header.uncompressed_size = uncompressed_size;
            None
        };

        let entry = CentralDirectoryFile {
            version_made_by: VERSION_DEFLATE,
            version_needed: VERSION_DEFLATE,
            flags,
            compression_method: DEFLATED,
            last_modified_time: stamp.time,
            last_modified_date: stamp.date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number_start: 0,
            internal_attributes: 0,
            external_attributes: 0,
            local_header_offset: 0,
            file_name: path.to_owned(),
            extra_field: Vec::new(),
            file_comment: String::new(),
        };

        debug!(
            path,
            compressed = compressed_size,
            uncompressed = uncompressed_size,
            "appended entry"
        );
        self.archive.append(
            LocalSectionParts {
                header,
                data,
                descriptor,
            },
            entry,
        )
    }

    /// Finalize offsets and hand the archive over.
    pub fn finish(mut self) -> Result<Archive> {
        self.archive.finalize()?;
        Ok(self.archive)
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}
