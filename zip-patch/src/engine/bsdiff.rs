//! bsdiff-style delta
//!
//! The classic three-section layout: control triples (add length, literal
//! length, seek) drive a byte-addition pass over the old payload, the diff
//! section carries the byte differences for add regions, and the extra
//! section carries literals. Each section is raw-deflated independently
//! behind a fixed header. Control words are big-endian signed 64-bit, as
//! bsdiff derivatives conventionally are.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Cursor, Read, Write};
use tracing::{debug, trace};

use super::block::{match_blocks, Op};
use super::{delta_id, DeltaApplier, DeltaGenerator};
use crate::error::{PatchError, Result};

const SIGNATURE: u64 = u64::from_be_bytes(*b"BSDIFFD1");

/// Fixed-size header in front of the compressed sections.
#[derive(Debug, Clone)]
struct Header {
    control_size: i64,
    diff_size: i64,
    output_size: i64,
}

impl Header {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let signature = reader.read_u64::<BigEndian>()?;
        if signature != SIGNATURE {
            return Err(PatchError::CorruptDelta(format!(
                "bad delta signature {signature:#018x}"
            )));
        }
        let control_size = reader.read_i64::<BigEndian>()?;
        let diff_size = reader.read_i64::<BigEndian>()?;
        let output_size = reader.read_i64::<BigEndian>()?;
        if control_size < 0 || diff_size < 0 || output_size < 0 {
            return Err(PatchError::CorruptDelta(
                "negative section size in delta header".to_string(),
            ));
        }
        Ok(Self {
            control_size,
            diff_size,
            output_size,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u64::<BigEndian>(SIGNATURE)?;
        writer.write_i64::<BigEndian>(self.control_size)?;
        writer.write_i64::<BigEndian>(self.diff_size)?;
        writer.write_i64::<BigEndian>(self.output_size)?;
        Ok(())
    }
}

/// One control step.
#[derive(Debug, Clone, Copy, Default)]
struct Triple {
    add: u64,
    insert: u64,
    seek: i64,
}

/// bsdiff-style generator (id 2). Accepts every pair.
#[derive(Debug, Default)]
pub struct BsdiffGenerator;

impl DeltaGenerator for BsdiffGenerator {
    fn id(&self) -> u32 {
        delta_id::BSDIFF
    }

    fn accepts(&self, _old: &[u8], _new: &[u8]) -> bool {
        true
    }

    fn generate(&self, old: &[u8], new: &[u8]) -> Result<Vec<u8>> {
        let ops = match_blocks(old, new);

        let mut triples: Vec<Triple> = Vec::new();
        let mut diff = Vec::new();
        let mut extra = Vec::new();
        let mut old_pos: usize = 0;

        for op in &ops {
            match op {
                Op::Copy { offset, len } => {
                    let offset = *offset as usize;
                    let len = *len as usize;
                    // the previous step's seek positions the source cursor
                    let seek = offset as i64 - old_pos as i64;
                    if triples.is_empty() {
                        if seek != 0 {
                            triples.push(Triple {
                                seek,
                                ..Triple::default()
                            });
                        }
                    } else {
                        let last = triples.len() - 1;
                        triples[last].seek = seek;
                    }
                    triples.push(Triple {
                        add: len as u64,
                        insert: 0,
                        seek: 0,
                    });
                    // the add region reproduces the old bytes exactly
                    diff.resize(diff.len() + len, 0);
                    old_pos = offset + len;
                }
                Op::Insert(bytes) => {
                    if triples.is_empty() {
                        triples.push(Triple::default());
                    }
                    let last = triples.len() - 1;
                    triples[last].insert += bytes.len() as u64;
                    extra.extend_from_slice(bytes);
                }
            }
        }

        let mut control = Vec::new();
        for triple in &triples {
            control.write_i64::<BigEndian>(triple.add as i64)?;
            control.write_i64::<BigEndian>(triple.insert as i64)?;
            control.write_i64::<BigEndian>(triple.seek)?;
        }

        let control_compressed = compress_section(&control)?;
        let diff_compressed = compress_section(&diff)?;
        let extra_compressed = compress_section(&extra)?;

        let header = Header {
            control_size: control_compressed.len() as i64,
            diff_size: diff_compressed.len() as i64,
            output_size: new.len() as i64,
        };

        let mut delta = Vec::new();
        header.write(&mut delta)?;
        delta.extend_from_slice(&control_compressed);
        delta.extend_from_slice(&diff_compressed);
        delta.extend_from_slice(&extra_compressed);

        debug!(
            triples = triples.len(),
            delta = delta.len(),
            "bsdiff delta generated"
        );
        Ok(delta)
    }
}

/// bsdiff-style applier; paired with [`BsdiffGenerator`] by id.
#[derive(Debug, Default)]
pub struct BsdiffApplier;

impl DeltaApplier for BsdiffApplier {
    fn id(&self) -> u32 {
        delta_id::BSDIFF
    }

    fn apply(&self, old: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(delta);
        let header = Header::read(&mut cursor)?;
        trace!(?header, "applying bsdiff delta");

        let control = read_section(&mut cursor, header.control_size as usize)?;
        let diff = read_section(&mut cursor, header.diff_size as usize)?;
        let mut extra_compressed = Vec::new();
        cursor.read_to_end(&mut extra_compressed)?;
        let extra = decompress_section(&extra_compressed)?;

        let output_size = header.output_size as usize;
        let mut output = Vec::with_capacity(output_size);
        let mut control_cursor = Cursor::new(control.as_slice());
        let mut diff_cursor = Cursor::new(diff.as_slice());
        let mut extra_cursor = Cursor::new(extra.as_slice());
        let mut old_pos: usize = 0;

        while output.len() < output_size {
            let add = control_cursor.read_i64::<BigEndian>()? as usize;
            let insert = control_cursor.read_i64::<BigEndian>()? as usize;
            let seek = control_cursor.read_i64::<BigEndian>()?;

            if output.len() + add + insert > output_size {
                return Err(PatchError::CorruptDelta(
                    "control stream overruns the declared output size".to_string(),
                ));
            }

            for _ in 0..add {
                let diff_byte = diff_cursor.read_u8()?;
                let old_byte = if old_pos < old.len() { old[old_pos] } else { 0 };
                output.push(old_byte.wrapping_add(diff_byte));
                old_pos += 1;
            }

            let start = extra_cursor.position() as usize;
            let end = start.checked_add(insert).filter(|&end| end <= extra.len()).ok_or_else(
                || PatchError::CorruptDelta("extra section exhausted".to_string()),
            )?;
            output.extend_from_slice(&extra[start..end]);
            extra_cursor.set_position(end as u64);

            if seek < 0 {
                old_pos = old_pos.saturating_sub(seek.unsigned_abs() as usize);
            } else {
                old_pos = old_pos.saturating_add(seek as usize);
            }
        }

        if output.len() != output_size {
            return Err(PatchError::SizeMismatch {
                expected: output_size,
                actual: output.len(),
            });
        }
        Ok(output)
    }
}

fn compress_section(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn read_section<R: Read>(reader: &mut R, size: usize) -> Result<Vec<u8>> {
    let mut compressed = vec![0u8; size];
    reader.read_exact(&mut compressed)?;
    decompress_section(&compressed)
}

fn decompress_section(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| PatchError::CorruptDelta(format!("section decompression failed: {e}")))?;
    Ok(out)
}
