//! In-memory archive container
//!
//! An [`Archive`] holds the ordered local section, the central directory
//! and the trailer. Loading pairs local sections to catalog entries by file
//! name; finalization recomputes every offset so that serialization is a
//! pure function of the finalized state.

use std::collections::HashSet;
use std::io::Cursor;
use tracing::debug;

use crate::error::{ArchiveError, Result};
use crate::records::{
    le_u32_at, CentralDirectoryFile, CentralDirectorySection, LocalSectionParts,
    LOCAL_FILE_SIGNATURE,
};

/// An archive in memory: local sections in insertion order, the central
/// directory in its own order, and the end-of-central-directory trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    local: Vec<LocalSectionParts>,
    central: CentralDirectorySection,
    finalized: bool,
}

impl Archive {
    /// An empty, unfinalized archive.
    pub fn new() -> Self {
        Self {
            local: Vec::new(),
            central: CentralDirectorySection::default(),
            finalized: false,
        }
    }

    /// Parse a serialized archive.
    ///
    /// Local sections are read while the local-header magic repeats; the
    /// first other magic opens the central directory, which runs to the
    /// EOCD. Every local section must pair with exactly one catalog entry
    /// of the same name and vice versa.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut local = Vec::new();
        let mut pos = 0;
        while pos + 4 <= bytes.len() && le_u32_at(bytes, pos) == LOCAL_FILE_SIGNATURE {
            let (parts, consumed) = LocalSectionParts::read_at(bytes, pos)?;
            local.push(parts);
            pos += consumed;
        }

        let central = CentralDirectorySection::read(&mut Cursor::new(&bytes[pos..]))?;
        check_pairing(&local, &central)?;
        debug!(entries = local.len(), "loaded archive");

        Ok(Self {
            local,
            central,
            finalized: true,
        })
    }

    /// Assemble an archive from already-built parts, validating the name
    /// pairing. The result is unfinalized; offsets in `central` are
    /// recomputed on [`Archive::finalize`].
    pub fn from_parts(
        local: Vec<LocalSectionParts>,
        central: CentralDirectorySection,
    ) -> Result<Self> {
        check_pairing(&local, &central)?;
        Ok(Self {
            local,
            central,
            finalized: false,
        })
    }

    /// Append one entry: its local section and the catalog entry that
    /// mirrors it.
    pub fn append(
        &mut self,
        parts: LocalSectionParts,
        entry: CentralDirectoryFile,
    ) -> Result<()> {
        if self.finalized {
            return Err(ArchiveError::AlreadyFinalized);
        }
        if parts.file_name() != entry.file_name {
            return Err(ArchiveError::UnpairedEntry(entry.file_name));
        }
        if self.local_by_name(parts.file_name()).is_some() {
            return Err(ArchiveError::DuplicateName(entry.file_name));
        }
        self.local.push(parts);
        self.central.files.push(entry);
        Ok(())
    }

    /// Recompute catalog offsets and the trailer from the local sections.
    ///
    /// Idempotent: a second call walks the same lengths and lands on the
    /// same values. Afterwards the archive rejects mutation.
    pub fn finalize(&mut self) -> Result<()> {
        let mut offset: usize = 0;
        for parts in &self.local {
            let entry = self
                .central
                .files
                .iter_mut()
                .find(|entry| entry.file_name == parts.header.file_name)
                .ok_or_else(|| ArchiveError::UnpairedEntry(parts.header.file_name.clone()))?;
            entry.local_header_offset = fit_u32(offset)?;
            offset += parts.structure_length();
        }

        let cd_offset = offset;
        let cd_length: usize = self
            .central
            .files
            .iter()
            .map(|entry| entry.structure_length())
            .sum();
        let entries = fit_u16(self.central.files.len())?;

        let eocd = &mut self.central.eocd;
        eocd.disk_number = 0;
        eocd.cd_start_disk = 0;
        eocd.entries_on_this_disk = entries;
        eocd.total_entries = entries;
        eocd.central_directory_length = fit_u32(cd_length)?;
        eocd.central_directory_offset = fit_u32(cd_offset)?;

        self.finalized = true;
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Finalize and serialize: local sections in order, catalog entries in
    /// order, trailer.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.finalize()?;
        let mut out = Vec::new();
        for parts in &self.local {
            parts.write(&mut out)?;
        }
        self.central.write(&mut out)?;
        Ok(out)
    }

    pub fn local_sections(&self) -> &[LocalSectionParts] {
        &self.local
    }

    pub fn central_directory(&self) -> &CentralDirectorySection {
        &self.central
    }

    pub fn local_by_name(&self, name: &str) -> Option<&LocalSectionParts> {
        self.local.iter().find(|parts| parts.file_name() == name)
    }
}

impl Default for Archive {
    fn default() -> Self {
        Self::new()
    }
}

fn check_pairing(local: &[LocalSectionParts], central: &CentralDirectorySection) -> Result<()> {
    let mut local_names: HashSet<&str> = HashSet::with_capacity(local.len());
    for parts in local {
        if !local_names.insert(parts.file_name()) {
            return Err(ArchiveError::DuplicateName(parts.file_name().to_owned()));
        }
    }

    let mut central_names: HashSet<&str> = HashSet::with_capacity(central.files.len());
    for entry in &central.files {
        if !central_names.insert(&entry.file_name) {
            return Err(ArchiveError::DuplicateName(entry.file_name.clone()));
        }
        if !local_names.contains(entry.file_name.as_str()) {
            return Err(ArchiveError::UnpairedEntry(entry.file_name.clone()));
        }
    }

    for parts in local {
        if !central_names.contains(parts.file_name()) {
            return Err(ArchiveError::UnpairedEntry(parts.file_name().to_owned()));
        }
    }

    Ok(())
}

fn fit_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| ArchiveError::ArchiveTooLarge(value as u64))
}

fn fit_u16(value: usize) -> Result<u16> {
    u16::try_from(value).map_err(|_| ArchiveError::ArchiveTooLarge(value as u64))
}
