//! Patch planning and emission
//!
//! The generator walks the new archive's central directory in its native
//! order and chooses the cheapest directive each entry allows: COPY when
//! the catalog entries agree up to position, REFRESH when only metadata
//! moved, PATCH when a delta engine accepts the payload pair, NEW
//! otherwise. Engine lists are consulted in order and the first acceptor
//! wins, which makes the output a pure function of the inputs.

use std::fmt;
use std::io::Write;
use tracing::debug;

use zip_archive::records::{CentralDirectoryFile, LocalSectionParts};
use zip_archive::Archive;

use crate::directive::{EntryHeaders, NewPart, PatchDirective, PatchPart, PatchVersion};
use crate::engine::{
    builtin_compressors, builtin_delta_generators, compression_id, Compressor, DeltaGenerator,
};
use crate::error::{PatchError, Result};
use crate::stream::PatchWriter;

/// Plans and writes the directive stream transforming `old` into `new`.
///
/// Both archives must be finalized so that catalog offsets are valid.
pub struct PatchGenerator<'a> {
    old: &'a Archive,
    new: &'a Archive,
    delta_generators: Vec<Box<dyn DeltaGenerator>>,
    compressors: Vec<Box<dyn Compressor>>,
}

impl<'a> PatchGenerator<'a> {
    /// A generator armed with the built-in engine lists.
    pub fn new(old: &'a Archive, new: &'a Archive) -> Self {
        Self {
            old,
            new,
            delta_generators: builtin_delta_generators(),
            compressors: builtin_compressors(),
        }
    }

    /// Replace the delta engine list. Order is priority.
    pub fn delta_generators(mut self, generators: Vec<Box<dyn DeltaGenerator>>) -> Self {
        self.delta_generators = generators;
        self
    }

    /// Replace the compressor list. Order is priority.
    pub fn compressors(mut self, compressors: Vec<Box<dyn Compressor>>) -> Self {
        self.compressors = compressors;
        self
    }

    /// Emit the patch: version header, BEGIN with the new central
    /// directory, then one directive per new entry in catalog order.
    pub fn generate<W: Write>(&self, out: W) -> Result<PatchSummary> {
        let mut writer = PatchWriter::new(out)?;
        let version = writer.version();
        let mut summary = PatchSummary::default();

        writer.write_directive(&PatchDirective::Begin(self.new.central_directory().clone()))?;

        for entry in &self.new.central_directory().files {
            let directive = self.plan_entry(entry)?;
            summary.record(&directive, version, entry);
            writer.write_directive(&directive)?;
        }

        debug!(
            copies = summary.copies,
            refreshes = summary.refreshes,
            patches = summary.patches,
            news = summary.news,
            "patch generated"
        );
        Ok(summary)
    }

    fn plan_entry(&self, entry: &CentralDirectoryFile) -> Result<PatchDirective> {
        let new_parts = self
            .new
            .local_by_name(&entry.file_name)
            .ok_or_else(|| PatchError::MissingEntry(entry.file_name.clone()))?;

        let Some(old_entry) = self.old.central_directory().file_by_name(&entry.file_name) else {
            debug!(name = %entry.file_name, "NEW: no counterpart in old archive");
            return Ok(PatchDirective::New(NewPart {
                headers: headers_of(new_parts),
                data: new_parts.data.clone(),
            }));
        };

        if old_entry.position_independent_eq(entry) {
            debug!(name = %entry.file_name, offset = old_entry.local_header_offset, "COPY");
            return Ok(PatchDirective::Copy {
                offset: old_entry.local_header_offset,
            });
        }

        let payload_identical = old_entry.crc32 == entry.crc32
            && old_entry.compressed_size == entry.compressed_size
            && old_entry.compression_method == entry.compression_method;
        if payload_identical {
            debug!(name = %entry.file_name, offset = old_entry.local_header_offset, "REFRESH");
            return Ok(PatchDirective::Refresh {
                offset: old_entry.local_header_offset,
                headers: headers_of(new_parts),
            });
        }

        let old_parts = self
            .old
            .local_by_name(&entry.file_name)
            .ok_or_else(|| PatchError::MissingEntry(entry.file_name.clone()))?;

        for generator in &self.delta_generators {
            if !generator.accepts(&old_parts.data, &new_parts.data) {
                continue;
            }
            let delta = generator.generate(&old_parts.data, &new_parts.data)?;
            let (blob, compression_engine) =
                match self.compressors.iter().find(|c| c.accepts(&delta)) {
                    Some(compressor) => (compressor.compress(&delta)?, compressor.id()),
                    None => (delta, compression_id::NONE),
                };
            debug!(
                name = %entry.file_name,
                delta_engine = generator.id(),
                compression_engine,
                blob = blob.len(),
                "PATCH"
            );
            return Ok(PatchDirective::Patch {
                offset: old_entry.local_header_offset,
                part: PatchPart::new(
                    headers_of(new_parts),
                    generator.id(),
                    compression_engine,
                    blob,
                ),
            });
        }

        debug!(name = %entry.file_name, "NEW: no delta engine accepted the pair");
        Ok(PatchDirective::New(NewPart {
            headers: headers_of(new_parts),
            data: new_parts.data.clone(),
        }))
    }
}

fn headers_of(parts: &LocalSectionParts) -> EntryHeaders {
    EntryHeaders {
        header: parts.header.clone(),
        descriptor: parts.descriptor,
    }
}

/// What the generator did, in directive counts and byte totals.
///
/// An observable for reporting; never part of the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchSummary {
    pub copies: usize,
    pub refreshes: usize,
    pub patches: usize,
    pub news: usize,
    /// Encoded size of all COPY records.
    pub copy_bytes: u64,
    /// Encoded size of all REFRESH records.
    pub refresh_bytes: u64,
    /// Encoded size of all PATCH records.
    pub patch_bytes: u64,
    /// Encoded size of all NEW records.
    pub new_bytes: u64,
    /// Compressed payload bytes the patch avoided shipping.
    pub data_saved: u64,
    /// Compressed payload and delta bytes the patch ships.
    pub data_shipped: u64,
}

impl PatchSummary {
    fn record(
        &mut self,
        directive: &PatchDirective,
        version: PatchVersion,
        entry: &CentralDirectoryFile,
    ) {
        let size = directive.structure_length(version) as u64;
        match directive {
            PatchDirective::Begin(_) => {}
            PatchDirective::Copy { .. } => {
                self.copies += 1;
                self.copy_bytes += size;
                self.data_saved += u64::from(entry.compressed_size);
            }
            PatchDirective::Refresh { .. } => {
                self.refreshes += 1;
                self.refresh_bytes += size;
                self.data_saved += u64::from(entry.compressed_size);
            }
            PatchDirective::Patch { part, .. } => {
                self.patches += 1;
                self.patch_bytes += size;
                self.data_saved += u64::from(entry.compressed_size);
                self.data_shipped += part.blob.len() as u64;
            }
            PatchDirective::New(part) => {
                self.news += 1;
                self.new_bytes += size;
                self.data_shipped += part.data.len() as u64;
            }
        }
    }

    pub fn directive_count(&self) -> usize {
        self.copies + self.refreshes + self.patches + self.news
    }

    pub fn record_bytes(&self) -> u64 {
        self.copy_bytes + self.refresh_bytes + self.patch_bytes + self.new_bytes
    }
}

impl fmt::Display for PatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "COPY    {:>6} entries, {:>10} record bytes", self.copies, self.copy_bytes)?;
        writeln!(
            f,
            "REFRESH {:>6} entries, {:>10} record bytes",
            self.refreshes, self.refresh_bytes
        )?;
        writeln!(
            f,
            "PATCH   {:>6} entries, {:>10} record bytes",
            self.patches, self.patch_bytes
        )?;
        writeln!(f, "NEW     {:>6} entries, {:>10} record bytes", self.news, self.new_bytes)?;
        write!(
            f,
            "saved {} compressed bytes, shipped {}",
            self.data_saved, self.data_shipped
        )
    }
}
