//! Patch directive stream records
//!
//! A patch body is a sequence of tagged directives. REFRESH, PATCH and NEW
//! share the replacement-header shape, so PATCH and NEW embed
//! [`EntryHeaders`] rather than repeating it. Only the PATCH layout depends
//! on the stream version: version 2 added explicit engine ids.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use zip_archive::records::{CentralDirectorySection, DataDescriptor, LocalFile};

use crate::engine::{compression_id, delta_id};
use crate::error::{PatchError, Result};

/// Patch stream version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PatchVersion {
    V1,
    V2,
}

impl PatchVersion {
    /// The version this crate writes.
    pub const CURRENT: PatchVersion = PatchVersion::V2;

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(PatchVersion::V1),
            2 => Some(PatchVersion::V2),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            PatchVersion::V1 => 1,
            PatchVersion::V2 => 2,
        }
    }
}

const TAG_BEGIN: u8 = 0;
const TAG_COPY: u8 = 1;
const TAG_REFRESH: u8 = 2;
const TAG_PATCH: u8 = 3;
const TAG_NEW: u8 = 4;

/// Replacement local header plus its descriptor, as carried by REFRESH and
/// embedded in PATCH and NEW.
///
/// The descriptor is present exactly when the header's descriptor flag is
/// set; that is what keys the wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeaders {
    pub header: LocalFile,
    pub descriptor: Option<DataDescriptor>,
}

impl EntryHeaders {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let header = LocalFile::read(reader)?;
        let descriptor = if header.has_descriptor() {
            Some(DataDescriptor::read(reader)?)
        } else {
            None
        };
        Ok(Self { header, descriptor })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.header.write(writer)?;
        if let Some(descriptor) = &self.descriptor {
            descriptor.write(writer)?;
        }
        Ok(())
    }

    pub fn structure_length(&self) -> usize {
        self.header.structure_length()
            + self.descriptor.map_or(0, |d| d.structure_length())
    }
}

/// Payload of a PATCH directive: replacement headers, the engines that
/// produced the blob, and the blob itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchPart {
    pub headers: EntryHeaders,
    delta_engine: u32,
    compression_engine: u32,
    pub blob: Vec<u8>,
}

impl PatchPart {
    pub fn new(
        headers: EntryHeaders,
        delta_engine: u32,
        compression_engine: u32,
        blob: Vec<u8>,
    ) -> Self {
        Self {
            headers,
            delta_engine,
            compression_engine,
            blob,
        }
    }

    /// Id of the delta engine that produced the blob.
    pub fn delta_engine(&self) -> u32 {
        self.delta_engine
    }

    /// Id of the compression engine applied to the blob, `NONE` when it
    /// shipped raw.
    pub fn compression_engine(&self) -> u32 {
        self.compression_engine
    }

    fn read<R: Read>(reader: &mut R, version: PatchVersion) -> Result<Self> {
        let headers = EntryHeaders::read(reader)?;
        let (delta_engine, compression_engine) = if version >= PatchVersion::V2 {
            (
                reader.read_u32::<LittleEndian>()?,
                reader.read_u32::<LittleEndian>()?,
            )
        } else {
            // version 1 predates explicit ids
            (delta_id::BLOCK, compression_id::NONE)
        };
        let blob = read_blob(reader)?;
        Ok(Self {
            headers,
            delta_engine,
            compression_engine,
            blob,
        })
    }

    fn write<W: Write>(&self, writer: &mut W, version: PatchVersion) -> Result<()> {
        self.headers.write(writer)?;
        if version >= PatchVersion::V2 {
            writer.write_u32::<LittleEndian>(self.delta_engine)?;
            writer.write_u32::<LittleEndian>(self.compression_engine)?;
        }
        writer.write_u32::<LittleEndian>(self.blob.len() as u32)?;
        writer.write_all(&self.blob)?;
        Ok(())
    }

    pub fn structure_length(&self, version: PatchVersion) -> usize {
        let ids = if version >= PatchVersion::V2 { 8 } else { 0 };
        self.headers.structure_length() + ids + 4 + self.blob.len()
    }
}

/// Payload of a NEW directive: full headers plus the compressed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPart {
    pub headers: EntryHeaders,
    pub data: Vec<u8>,
}

impl NewPart {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let headers = EntryHeaders::read(reader)?;
        let data = read_blob(reader)?;
        Ok(Self { headers, data })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.headers.write(writer)?;
        writer.write_u32::<LittleEndian>(self.data.len() as u32)?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    pub fn structure_length(&self) -> usize {
        self.headers.structure_length() + 4 + self.data.len()
    }
}

fn read_blob<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let len = reader.read_u32::<LittleEndian>()? as usize;
    let mut blob = vec![0u8; len];
    reader.read_exact(&mut blob)?;
    Ok(blob)
}

/// One instruction of a patch stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchDirective {
    /// Carries the new archive's entire central directory. Always first.
    Begin(CentralDirectorySection),
    /// Reuse the old entry at the offset unchanged.
    Copy { offset: u32 },
    /// Reuse the old payload at the offset under replacement headers.
    Refresh { offset: u32, headers: EntryHeaders },
    /// Transform the old payload at the offset with a delta blob.
    Patch { offset: u32, part: PatchPart },
    /// Ship a complete new entry.
    New(NewPart),
}

impl PatchDirective {
    /// Read the next directive, or `None` at a clean end of stream.
    pub fn read<R: Read>(reader: &mut R, version: PatchVersion) -> Result<Option<Self>> {
        let tag = match reader.read_u8() {
            Ok(tag) => tag,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let directive = match tag {
            TAG_BEGIN => PatchDirective::Begin(CentralDirectorySection::read(reader)?),
            TAG_COPY => PatchDirective::Copy {
                offset: reader.read_u32::<LittleEndian>()?,
            },
            TAG_REFRESH => {
                let offset = reader.read_u32::<LittleEndian>()?;
                let headers = EntryHeaders::read(reader)?;
                PatchDirective::Refresh { offset, headers }
            }
            TAG_PATCH => {
                let offset = reader.read_u32::<LittleEndian>()?;
                let part = PatchPart::read(reader, version)?;
                PatchDirective::Patch { offset, part }
            }
            TAG_NEW => PatchDirective::New(NewPart::read(reader)?),
            other => return Err(PatchError::UnknownDirective(other)),
        };
        Ok(Some(directive))
    }

    pub fn write<W: Write>(&self, writer: &mut W, version: PatchVersion) -> Result<()> {
        match self {
            PatchDirective::Begin(section) => {
                writer.write_u8(TAG_BEGIN)?;
                section.write(writer)?;
            }
            PatchDirective::Copy { offset } => {
                writer.write_u8(TAG_COPY)?;
                writer.write_u32::<LittleEndian>(*offset)?;
            }
            PatchDirective::Refresh { offset, headers } => {
                writer.write_u8(TAG_REFRESH)?;
                writer.write_u32::<LittleEndian>(*offset)?;
                headers.write(writer)?;
            }
            PatchDirective::Patch { offset, part } => {
                writer.write_u8(TAG_PATCH)?;
                writer.write_u32::<LittleEndian>(*offset)?;
                part.write(writer, version)?;
            }
            PatchDirective::New(part) => {
                writer.write_u8(TAG_NEW)?;
                part.write(writer)?;
            }
        }
        Ok(())
    }

    /// Exact size of the encoded directive, tag included.
    pub fn structure_length(&self, version: PatchVersion) -> usize {
        1 + match self {
            PatchDirective::Begin(section) => section.structure_length(),
            PatchDirective::Copy { .. } => 4,
            PatchDirective::Refresh { headers, .. } => 4 + headers.structure_length(),
            PatchDirective::Patch { part, .. } => 4 + part.structure_length(version),
            PatchDirective::New(part) => part.structure_length(),
        }
    }
}
