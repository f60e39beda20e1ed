//! End-of-central-directory trailer

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use super::read_string;
use crate::error::{ArchiveError, Result};

/// End of central directory signature
pub const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0605_4b50;

/// The archive trailer: entry counts, central-directory extent, comment.
///
/// Disk numbers are always zero here; multi-volume archives are out of
/// scope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub cd_start_disk: u16,
    pub entries_on_this_disk: u16,
    pub total_entries: u16,
    pub central_directory_length: u32,
    pub central_directory_offset: u32,
    pub comment: String,
}

impl EndOfCentralDirectory {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let signature = reader.read_u32::<LittleEndian>()?;
        if signature != END_OF_CENTRAL_DIRECTORY_SIGNATURE {
            return Err(ArchiveError::InvalidSignature {
                expected: END_OF_CENTRAL_DIRECTORY_SIGNATURE,
                actual: signature,
            });
        }
        Self::read_after_signature(reader)
    }

    pub(crate) fn read_after_signature<R: Read>(reader: &mut R) -> Result<Self> {
        let disk_number = reader.read_u16::<LittleEndian>()?;
        let cd_start_disk = reader.read_u16::<LittleEndian>()?;
        let entries_on_this_disk = reader.read_u16::<LittleEndian>()?;
        let total_entries = reader.read_u16::<LittleEndian>()?;
        let central_directory_length = reader.read_u32::<LittleEndian>()?;
        let central_directory_offset = reader.read_u32::<LittleEndian>()?;
        let comment_len = reader.read_u16::<LittleEndian>()? as usize;
        let comment = read_string(reader, comment_len, "archive comment")?;

        Ok(Self {
            disk_number,
            cd_start_disk,
            entries_on_this_disk,
            total_entries,
            central_directory_length,
            central_directory_offset,
            comment,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(END_OF_CENTRAL_DIRECTORY_SIGNATURE)?;
        writer.write_u16::<LittleEndian>(self.disk_number)?;
        writer.write_u16::<LittleEndian>(self.cd_start_disk)?;
        writer.write_u16::<LittleEndian>(self.entries_on_this_disk)?;
        writer.write_u16::<LittleEndian>(self.total_entries)?;
        writer.write_u32::<LittleEndian>(self.central_directory_length)?;
        writer.write_u32::<LittleEndian>(self.central_directory_offset)?;
        writer.write_u16::<LittleEndian>(self.comment.len() as u16)?;
        writer.write_all(self.comment.as_bytes())?;
        Ok(())
    }

    pub fn structure_length(&self) -> usize {
        22 + self.comment.len()
    }
}
