//! Patch application
//!
//! The applier replays a directive stream against the old archive's bytes.
//! Old entries are re-parsed at the offsets the directives name; the
//! central directory of the result comes wholesale from the BEGIN
//! directive, with offsets recomputed at finalization. Identical inputs
//! always reproduce identical bytes.

use std::io::Read;
use tracing::{debug, trace};

use zip_archive::records::LocalSectionParts;
use zip_archive::Archive;

use crate::directive::PatchDirective;
use crate::engine::{compression_id, EngineRegistry};
use crate::error::{PatchError, Result};
use crate::stream::PatchReader;

/// Reconstructs the new archive from the old archive's bytes plus a patch
/// stream.
pub struct PatchApplier<'a> {
    old_bytes: &'a [u8],
    registry: &'a EngineRegistry,
}

impl<'a> PatchApplier<'a> {
    pub fn new(old_bytes: &'a [u8], registry: &'a EngineRegistry) -> Self {
        Self {
            old_bytes,
            registry,
        }
    }

    pub fn apply<R: Read>(&self, patch: R) -> Result<Archive> {
        let mut reader = PatchReader::new(patch)?;
        debug!(version = reader.version().as_u32(), "applying patch");

        let plan = match reader.next_directive()? {
            Some(PatchDirective::Begin(section)) => section,
            _ => return Err(PatchError::MissingBegin),
        };

        let mut local = Vec::new();
        while let Some(directive) = reader.next_directive()? {
            let parts = match directive {
                PatchDirective::Begin(_) => return Err(PatchError::UnexpectedBegin),
                PatchDirective::Copy { offset } => {
                    trace!(offset, "COPY");
                    self.old_parts_at(offset)?
                }
                PatchDirective::Refresh { offset, headers } => {
                    trace!(offset, name = %headers.header.file_name, "REFRESH");
                    let old = self.old_parts_at(offset)?;
                    LocalSectionParts {
                        header: headers.header,
                        data: old.data,
                        descriptor: headers.descriptor,
                    }
                }
                PatchDirective::Patch { offset, part } => {
                    trace!(
                        offset,
                        name = %part.headers.header.file_name,
                        delta_engine = part.delta_engine(),
                        compression_engine = part.compression_engine(),
                        "PATCH"
                    );
                    let old = self.old_parts_at(offset)?;
                    let delta_engine = part.delta_engine();
                    let compression_engine = part.compression_engine();
                    let delta = if compression_engine == compression_id::NONE {
                        part.blob
                    } else {
                        self.registry
                            .uncompressor(compression_engine)?
                            .uncompress(&part.blob)?
                    };
                    let data = self
                        .registry
                        .delta_applier(delta_engine)?
                        .apply(&old.data, &delta)?;
                    LocalSectionParts {
                        header: part.headers.header,
                        data,
                        descriptor: part.headers.descriptor,
                    }
                }
                PatchDirective::New(part) => {
                    trace!(name = %part.headers.header.file_name, "NEW");
                    LocalSectionParts {
                        header: part.headers.header,
                        data: part.data,
                        descriptor: part.headers.descriptor,
                    }
                }
            };
            local.push(parts);
        }

        debug!(entries = local.len(), "patch applied");
        let mut archive = Archive::from_parts(local, plan)?;
        archive.finalize()?;
        Ok(archive)
    }

    fn old_parts_at(&self, offset: u32) -> Result<LocalSectionParts> {
        let (parts, _) = LocalSectionParts::read_at(self.old_bytes, offset as usize)?;
        Ok(parts)
    }
}
