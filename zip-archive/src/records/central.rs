//! Central directory catalog records

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use super::eocd::{EndOfCentralDirectory, END_OF_CENTRAL_DIRECTORY_SIGNATURE};
use super::read_string;
use crate::error::{ArchiveError, Result};

/// Central directory file header signature
pub const CENTRAL_FILE_SIGNATURE: u32 = 0x0201_4b50;

/// Catalog entry mirroring one local header, plus the catalog-only fields
/// (attributes, comment, and the offset of the local header it describes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryFile {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number_start: u16,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    pub local_header_offset: u32,
    pub file_name: String,
    pub extra_field: Vec<u8>,
    pub file_comment: String,
}

impl CentralDirectoryFile {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let signature = reader.read_u32::<LittleEndian>()?;
        if signature != CENTRAL_FILE_SIGNATURE {
            return Err(ArchiveError::InvalidSignature {
                expected: CENTRAL_FILE_SIGNATURE,
                actual: signature,
            });
        }
        Self::read_after_signature(reader)
    }

    pub(crate) fn read_after_signature<R: Read>(reader: &mut R) -> Result<Self> {
        let version_made_by = reader.read_u16::<LittleEndian>()?;
        let version_needed = reader.read_u16::<LittleEndian>()?;
        let flags = reader.read_u16::<LittleEndian>()?;
        let compression_method = reader.read_u16::<LittleEndian>()?;
        let last_modified_time = reader.read_u16::<LittleEndian>()?;
        let last_modified_date = reader.read_u16::<LittleEndian>()?;
        let crc32 = reader.read_u32::<LittleEndian>()?;
        let compressed_size = reader.read_u32::<LittleEndian>()?;
        let uncompressed_size = reader.read_u32::<LittleEndian>()?;
        let file_name_len = reader.read_u16::<LittleEndian>()? as usize;
        let extra_field_len = reader.read_u16::<LittleEndian>()? as usize;
        let file_comment_len = reader.read_u16::<LittleEndian>()? as usize;
        let disk_number_start = reader.read_u16::<LittleEndian>()?;
        let internal_attributes = reader.read_u16::<LittleEndian>()?;
        let external_attributes = reader.read_u32::<LittleEndian>()?;
        let local_header_offset = reader.read_u32::<LittleEndian>()?;

        let file_name = read_string(reader, file_name_len, "file name")?;
        let mut extra_field = vec![0u8; extra_field_len];
        reader.read_exact(&mut extra_field)?;
        let file_comment = read_string(reader, file_comment_len, "file comment")?;

        Ok(Self {
            version_made_by,
            version_needed,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number_start,
            internal_attributes,
            external_attributes,
            local_header_offset,
            file_name,
            extra_field,
            file_comment,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(CENTRAL_FILE_SIGNATURE)?;
        writer.write_u16::<LittleEndian>(self.version_made_by)?;
        writer.write_u16::<LittleEndian>(self.version_needed)?;
        writer.write_u16::<LittleEndian>(self.flags)?;
        writer.write_u16::<LittleEndian>(self.compression_method)?;
        writer.write_u16::<LittleEndian>(self.last_modified_time)?;
        writer.write_u16::<LittleEndian>(self.last_modified_date)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_size)?;
        writer.write_u16::<LittleEndian>(self.file_name.len() as u16)?;
        writer.write_u16::<LittleEndian>(self.extra_field.len() as u16)?;
        writer.write_u16::<LittleEndian>(self.file_comment.len() as u16)?;
        writer.write_u16::<LittleEndian>(self.disk_number_start)?;
        writer.write_u16::<LittleEndian>(self.internal_attributes)?;
        writer.write_u32::<LittleEndian>(self.external_attributes)?;
        writer.write_u32::<LittleEndian>(self.local_header_offset)?;
        writer.write_all(self.file_name.as_bytes())?;
        writer.write_all(&self.extra_field)?;
        writer.write_all(self.file_comment.as_bytes())?;
        Ok(())
    }

    pub fn structure_length(&self) -> usize {
        46 + self.file_name.len() + self.extra_field.len() + self.file_comment.len()
    }

    /// Equality ignoring where the local header landed. Two entries that
    /// differ only by position describe the same stored payload and
    /// metadata.
    pub fn position_independent_eq(&self, other: &Self) -> bool {
        self.version_made_by == other.version_made_by
            && self.version_needed == other.version_needed
            && self.flags == other.flags
            && self.compression_method == other.compression_method
            && self.last_modified_time == other.last_modified_time
            && self.last_modified_date == other.last_modified_date
            && self.crc32 == other.crc32
            && self.compressed_size == other.compressed_size
            && self.uncompressed_size == other.uncompressed_size
            && self.disk_number_start == other.disk_number_start
            && self.internal_attributes == other.internal_attributes
            && self.external_attributes == other.external_attributes
            && self.file_name == other.file_name
            && self.extra_field == other.extra_field
            && self.file_comment == other.file_comment
    }
}

/// The catalog at the tail of an archive: ordered entries plus the EOCD
/// trailer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CentralDirectorySection {
    pub files: Vec<CentralDirectoryFile>,
    pub eocd: EndOfCentralDirectory,
}

impl CentralDirectorySection {
    /// Read entries while their signature repeats, then the EOCD that
    /// terminates the section.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut files = Vec::new();
        loop {
            let signature = reader.read_u32::<LittleEndian>()?;
            match signature {
                CENTRAL_FILE_SIGNATURE => {
                    files.push(CentralDirectoryFile::read_after_signature(reader)?);
                }
                END_OF_CENTRAL_DIRECTORY_SIGNATURE => {
                    let eocd = EndOfCentralDirectory::read_after_signature(reader)?;
                    return Ok(Self { files, eocd });
                }
                actual => {
                    return Err(ArchiveError::InvalidSignature {
                        expected: CENTRAL_FILE_SIGNATURE,
                        actual,
                    });
                }
            }
        }
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        for file in &self.files {
            file.write(writer)?;
        }
        self.eocd.write(writer)
    }

    pub fn structure_length(&self) -> usize {
        self.files
            .iter()
            .map(|file| file.structure_length())
            .sum::<usize>()
            + self.eocd.structure_length()
    }

    pub fn file_by_name(&self, name: &str) -> Option<&CentralDirectoryFile> {
        self.files.iter().find(|file| file.file_name == name)
    }
}
