//! Patch stream framing
//!
//! A patch opens with a little-endian u32 version word; everything after
//! it is directives. The writer stamps the version up front, the reader
//! validates it before yielding anything.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use tracing::trace;

use crate::directive::{PatchDirective, PatchVersion};
use crate::error::{PatchError, Result};

/// Writes the version header, then directives as they are handed over.
pub struct PatchWriter<W: Write> {
    writer: W,
    version: PatchVersion,
}

impl<W: Write> PatchWriter<W> {
    /// Open a stream at the current version.
    pub fn new(writer: W) -> Result<Self> {
        Self::with_version(writer, PatchVersion::CURRENT)
    }

    /// Open a stream at an explicit version, for emitting patches older
    /// readers understand.
    pub fn with_version(mut writer: W, version: PatchVersion) -> Result<Self> {
        writer.write_u32::<LittleEndian>(version.as_u32())?;
        Ok(Self { writer, version })
    }

    pub fn version(&self) -> PatchVersion {
        self.version
    }

    pub fn write_directive(&mut self, directive: &PatchDirective) -> Result<()> {
        trace!(len = directive.structure_length(self.version), "write directive");
        directive.write(&mut self.writer, self.version)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Validates the version header, then yields directives until the stream
/// runs dry.
#[derive(Debug)]
pub struct PatchReader<R: Read> {
    reader: R,
    version: PatchVersion,
}

impl<R: Read> PatchReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let raw = reader.read_u32::<LittleEndian>()?;
        let version =
            PatchVersion::from_u32(raw).ok_or(PatchError::UnsupportedVersion(raw))?;
        Ok(Self { reader, version })
    }

    pub fn version(&self) -> PatchVersion {
        self.version
    }

    /// The next directive, or `None` at end of stream.
    pub fn next_directive(&mut self) -> Result<Option<PatchDirective>> {
        PatchDirective::read(&mut self.reader, self.version)
    }
}
