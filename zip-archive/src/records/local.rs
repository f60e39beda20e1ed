//! Per-entry records: local header, payload bytes, optional descriptor

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};
use tracing::trace;

use super::{le_u32_at, read_string};
use crate::error::{ArchiveError, Result};
use crate::meta::FLAG_SIZES_IN_DESCRIPTOR;

/// Local file header signature
pub const LOCAL_FILE_SIGNATURE: u32 = 0x0403_4b50;
/// Data descriptor signature
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;

/// Header preceding every entry's payload in the local section.
///
/// The name and extra-field length words are derived from the owned values
/// at write time, so they can never go stale under mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name: String,
    pub extra_field: Vec<u8>,
}

impl LocalFile {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let signature = reader.read_u32::<LittleEndian>()?;
        if signature != LOCAL_FILE_SIGNATURE {
            return Err(ArchiveError::InvalidSignature {
                expected: LOCAL_FILE_SIGNATURE,
                actual: signature,
            });
        }
        Self::read_after_signature(reader)
    }

    pub(crate) fn read_after_signature<R: Read>(reader: &mut R) -> Result<Self> {
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

        let file_name = read_string(reader, file_name_len, "file name")?;
        let mut extra_field = vec![0u8; extra_field_len];
        reader.read_exact(&mut extra_field)?;

        Ok(Self {
            version_needed,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name,
            extra_field,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(LOCAL_FILE_SIGNATURE)?;
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
        writer.write_all(self.file_name.as_bytes())?;
        writer.write_all(&self.extra_field)?;
        Ok(())
    }

    pub fn structure_length(&self) -> usize {
        30 + self.file_name.len() + self.extra_field.len()
    }

    /// Whether sizes and CRC are deferred to a trailing data descriptor.
    pub fn has_descriptor(&self) -> bool {
        self.flags & FLAG_SIZES_IN_DESCRIPTOR != 0
    }
}

/// Trailer carrying sizes and CRC-32 when the local header defers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

impl DataDescriptor {
    /// Read a descriptor, with or without its leading signature. The
    /// signature is optional in the wild; when the first word does not
    /// match, it is the CRC.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let first = reader.read_u32::<LittleEndian>()?;
        let crc32 = if first == DATA_DESCRIPTOR_SIGNATURE {
            reader.read_u32::<LittleEndian>()?
        } else {
            first
        };
        let compressed_size = reader.read_u32::<LittleEndian>()?;
        let uncompressed_size = reader.read_u32::<LittleEndian>()?;

        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }

    /// Writes always emit the signed form.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(DATA_DESCRIPTOR_SIGNATURE)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_size)?;
        Ok(())
    }

    pub fn structure_length(&self) -> usize {
        16
    }
}

/// One entry of the local section: header, compressed payload bytes, and
/// the descriptor when the header's flag calls for one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSectionParts {
    pub header: LocalFile,
    pub data: Vec<u8>,
    pub descriptor: Option<DataDescriptor>,
}

impl LocalSectionParts {
    /// Parse the entry starting at `offset`. Returns the parts and the
    /// number of bytes consumed.
    ///
    /// When the header defers sizes to the descriptor the payload length is
    /// unknown up front. The parser scans for the first descriptor
    /// signature whose compressed-size field equals the bytes walked so
    /// far; a signature pattern embedded in payload bytes cannot satisfy
    /// that check and is skipped.
    pub fn read_at(bytes: &[u8], offset: usize) -> Result<(Self, usize)> {
        if offset > bytes.len() {
            return Err(ArchiveError::Truncated {
                expected: offset,
                actual: bytes.len(),
            });
        }

        let mut cursor = Cursor::new(&bytes[offset..]);
        let header = LocalFile::read(&mut cursor)?;
        let data_start = offset + cursor.position() as usize;

        if !header.has_descriptor() {
            let data_end = data_start + header.compressed_size as usize;
            if data_end > bytes.len() {
                return Err(ArchiveError::Truncated {
                    expected: data_end - offset,
                    actual: bytes.len() - offset,
                });
            }
            let data = bytes[data_start..data_end].to_vec();
            trace!(name = %header.file_name, len = data.len(), "local section");
            return Ok((
                Self {
                    header,
                    data,
                    descriptor: None,
                },
                data_end - offset,
            ));
        }

        let mut pos = data_start;
        while pos + 16 <= bytes.len() {
            if le_u32_at(bytes, pos) == DATA_DESCRIPTOR_SIGNATURE
                && le_u32_at(bytes, pos + 8) as usize == pos - data_start
            {
                let data = bytes[data_start..pos].to_vec();
                let descriptor = DataDescriptor::read(&mut Cursor::new(&bytes[pos..]))?;
                trace!(name = %header.file_name, len = data.len(), "local section with descriptor");
                return Ok((
                    Self {
                        header,
                        data,
                        descriptor: Some(descriptor),
                    },
                    pos + 16 - offset,
                ));
            }
            pos += 1;
        }

        Err(ArchiveError::DescriptorNotFound(header.file_name))
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.header.write(writer)?;
        writer.write_all(&self.data)?;
        if let Some(descriptor) = &self.descriptor {
            descriptor.write(writer)?;
        }
        Ok(())
    }

    pub fn structure_length(&self) -> usize {
        self.header.structure_length()
            + self.data.len()
            + self.descriptor.map_or(0, |d| d.structure_length())
    }

    pub fn file_name(&self) -> &str {
        &self.header.file_name
    }

    /// Authoritative compressed size: the descriptor's when present, the
    /// header's otherwise.
    pub fn compressed_size(&self) -> u32 {
        match &self.descriptor {
            Some(descriptor) => descriptor.compressed_size,
            None => self.header.compressed_size,
        }
    }

    pub fn uncompressed_size(&self) -> u32 {
        match &self.descriptor {
            Some(descriptor) => descriptor.uncompressed_size,
            None => self.header.uncompressed_size,
        }
    }

    pub fn crc32(&self) -> u32 {
        match &self.descriptor {
            Some(descriptor) => descriptor.crc32,
            None => self.header.crc32,
        }
    }
}
