//! Rolling-hash block delta
//!
//! rsync-style matching: the old payload is indexed by fixed-size block,
//! the new payload is scanned byte-by-byte with a rolling checksum, and
//! every verified match becomes a copy against the old payload while the
//! in-between bytes ship literally. Matches extend past the block boundary
//! as far as the payloads agree.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::Cursor;
use tracing::trace;

use super::{delta_id, DeltaApplier, DeltaGenerator};
use crate::error::{PatchError, Result};

const BLOCK_SIZE: usize = 1024;

const OP_COPY: u8 = 1;
const OP_INSERT: u8 = 2;

/// Largest prime below 2^16; both checksum halves are reduced by it.
const CHECKSUM_MOD: u32 = 65521;

/// Rolling checksum over a fixed window.
///
/// Tracks two sums over the window bytes `x_0 .. x_{w-1}`:
///
/// - `sum`      = Σ x_i
/// - `weighted` = Σ (w - i) · x_i
///
/// both mod [`CHECKSUM_MOD`]. Sliding the window one byte right replaces
/// `x_0` by a new trailing byte. The plain sum just swaps the two bytes;
/// the weighted sum loses `w · x_0` (every remaining byte's weight drops
/// by one, which subtracts the *new* plain sum — so it is added back) and
/// the incoming byte enters at weight one through that same plain sum.
struct RollingHash {
    sum: u32,
    weighted: u32,
    window: u32,
}

impl RollingHash {
    fn over(data: &[u8]) -> Self {
        let window = data.len() as u32;
        let mut sum: u64 = 0;
        let mut weighted: u64 = 0;
        for (i, &byte) in data.iter().enumerate() {
            sum += u64::from(byte);
            weighted += u64::from(window - i as u32) * u64::from(byte);
        }
        Self {
            sum: (sum % u64::from(CHECKSUM_MOD)) as u32,
            weighted: (weighted % u64::from(CHECKSUM_MOD)) as u32,
            window,
        }
    }

    /// Slide the window one byte: `outgoing` leaves the front, `incoming`
    /// joins the back.
    fn slide(&mut self, outgoing: u8, incoming: u8) {
        let dropped = u32::from(outgoing);
        self.sum = (self.sum + CHECKSUM_MOD - dropped + u32::from(incoming)) % CHECKSUM_MOD;
        self.weighted = (self.weighted + CHECKSUM_MOD - (self.window * dropped) % CHECKSUM_MOD
            + self.sum)
            % CHECKSUM_MOD;
    }

    fn digest(&self) -> u32 {
        ((self.weighted & 0xffff) << 16) | (self.sum & 0xffff)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(super) enum Op {
    Copy { offset: u32, len: u32 },
    Insert(Vec<u8>),
}

/// Block-match `new` against `old`, producing the op sequence both delta
/// engines build on.
pub(super) fn match_blocks(old: &[u8], new: &[u8]) -> Vec<Op> {
    if new.is_empty() {
        return Vec::new();
    }
    if old.is_empty() || new.len() < BLOCK_SIZE {
        return vec![Op::Insert(new.to_vec())];
    }

    // index full blocks of the old payload; the tail cannot back a
    // full-window match and is left to literals
    let mut table: HashMap<u32, Vec<usize>> = HashMap::new();
    let mut start = 0;
    while start + BLOCK_SIZE <= old.len() {
        let digest = RollingHash::over(&old[start..start + BLOCK_SIZE]).digest();
        table.entry(digest).or_default().push(start);
        start += BLOCK_SIZE;
    }

    let mut ops = Vec::new();
    let mut insert_buf = Vec::new();
    let mut pos = 0usize;
    let mut hash = RollingHash::over(&new[..BLOCK_SIZE]);

    while pos + BLOCK_SIZE <= new.len() {
        let window = &new[pos..pos + BLOCK_SIZE];
        let matched = table.get(&hash.digest()).and_then(|candidates| {
            candidates
                .iter()
                .copied()
                .find(|&offset| &old[offset..offset + BLOCK_SIZE] == window)
        });

        if let Some(offset) = matched {
            let mut len = BLOCK_SIZE;
            while pos + len < new.len() && offset + len < old.len() && new[pos + len] == old[offset + len]
            {
                len += 1;
            }

            if !insert_buf.is_empty() {
                ops.push(Op::Insert(std::mem::take(&mut insert_buf)));
            }
            ops.push(Op::Copy {
                offset: offset as u32,
                len: len as u32,
            });

            pos += len;
            if pos + BLOCK_SIZE <= new.len() {
                hash = RollingHash::over(&new[pos..pos + BLOCK_SIZE]);
            }
        } else {
            insert_buf.push(new[pos]);
            pos += 1;
            if pos + BLOCK_SIZE <= new.len() {
                hash.slide(new[pos - 1], new[pos + BLOCK_SIZE - 1]);
            }
        }
    }

    if pos < new.len() {
        insert_buf.extend_from_slice(&new[pos..]);
    }
    if !insert_buf.is_empty() {
        ops.push(Op::Insert(insert_buf));
    }
    ops
}

/// The delta engine implied by version-1 patches. Accepts every pair.
#[derive(Debug, Default)]
pub struct BlockDeltaGenerator;

impl DeltaGenerator for BlockDeltaGenerator {
    fn id(&self) -> u32 {
        delta_id::BLOCK
    }

    fn accepts(&self, _old: &[u8], _new: &[u8]) -> bool {
        true
    }

    fn generate(&self, old: &[u8], new: &[u8]) -> Result<Vec<u8>> {
        let ops = match_blocks(old, new);
        let mut delta = Vec::new();
        for op in &ops {
            match op {
                Op::Copy { offset, len } => {
                    delta.write_u8(OP_COPY)?;
                    delta.write_u32::<LittleEndian>(*offset)?;
                    delta.write_u32::<LittleEndian>(*len)?;
                }
                Op::Insert(bytes) => {
                    delta.write_u8(OP_INSERT)?;
                    delta.write_u32::<LittleEndian>(bytes.len() as u32)?;
                    delta.extend_from_slice(bytes);
                }
            }
        }
        trace!(ops = ops.len(), delta = delta.len(), "block delta generated");
        Ok(delta)
    }
}

/// Applies block deltas; paired with [`BlockDeltaGenerator`] by id.
#[derive(Debug, Default)]
pub struct BlockDeltaApplier;

impl DeltaApplier for BlockDeltaApplier {
    fn id(&self) -> u32 {
        delta_id::BLOCK
    }

    fn apply(&self, old: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(delta);
        let mut output = Vec::new();

        loop {
            let op = match cursor.read_u8() {
                Ok(op) => op,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };
            match op {
                OP_COPY => {
                    let offset = cursor.read_u32::<LittleEndian>()? as usize;
                    let len = cursor.read_u32::<LittleEndian>()? as usize;
                    let end = offset
                        .checked_add(len)
                        .filter(|&end| end <= old.len())
                        .ok_or_else(|| {
                            PatchError::CorruptDelta(format!(
                                "copy of {len} bytes at {offset} outside a {}-byte source",
                                old.len()
                            ))
                        })?;
                    output.extend_from_slice(&old[offset..end]);
                }
                OP_INSERT => {
                    let len = cursor.read_u32::<LittleEndian>()? as usize;
                    let start = cursor.position() as usize;
                    let end = start.checked_add(len).filter(|&end| end <= delta.len()).ok_or_else(
                        || PatchError::CorruptDelta(format!("literal of {len} bytes overruns the delta")),
                    )?;
                    output.extend_from_slice(&delta[start..end]);
                    cursor.set_position(end as u64);
                }
                other => {
                    return Err(PatchError::CorruptDelta(format!("unknown op {other:#04x}")));
                }
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    /// Incompressible pseudo-random bytes from a fixed seed.
    fn noise(seed: u32, len: usize) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 24) as u8
            })
            .collect()
    }

    /// Raw-deflate a plaintext, shaping the fixture like stored entry
    /// payloads.
    fn deflated(plain: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(plain).unwrap();
        encoder.finish().unwrap()
    }

    fn roundtrip(old: &[u8], new: &[u8]) -> Vec<u8> {
        let delta = BlockDeltaGenerator.generate(old, new).unwrap();
        BlockDeltaApplier.apply(old, &delta).unwrap()
    }

    #[test]
    fn test_unchanged_deflated_payload_is_one_copy() {
        // incompressible plaintext keeps the compressed stream well past
        // one window
        let payload = deflated(&noise(7, 8192));
        assert!(payload.len() > BLOCK_SIZE);

        let delta = BlockDeltaGenerator.generate(&payload, &payload).unwrap();
        assert_eq!(BlockDeltaApplier.apply(&payload, &delta).unwrap(), payload);
        // a single copy op, nowhere near the payload size
        assert!(delta.len() < 32, "delta was {} bytes", delta.len());
    }

    #[test]
    fn test_recompressed_payload_with_changed_tail() {
        let mut plain = noise(21, 16_384);
        let old = deflated(&plain);
        let tail = plain.len() - 100;
        for byte in plain[tail..].iter_mut() {
            *byte = byte.wrapping_mul(3).wrapping_add(1);
        }
        let new = deflated(&plain);

        assert_eq!(roundtrip(&old, &new), new);
    }

    #[test]
    fn test_leading_bytes_dropped_realigns() {
        let old = noise(3, BLOCK_SIZE * 4);
        let new = old[17..].to_vec();

        let delta = BlockDeltaGenerator.generate(&old, &new).unwrap();
        assert_eq!(BlockDeltaApplier.apply(&old, &delta).unwrap(), new);
        // the scan must resynchronize on an unaligned source offset
        // instead of shipping the whole payload literally
        assert!(delta.len() < new.len(), "delta was {} bytes", delta.len());
    }

    #[test]
    fn test_interleaved_edits() {
        let old = noise(11, BLOCK_SIZE * 5);
        let mut new = old.clone();
        new[200] ^= 0x01;
        new[BLOCK_SIZE * 3 + 9] ^= 0x80;

        assert_eq!(roundtrip(&old, &new), new);
    }

    #[test]
    fn test_disjoint_payloads() {
        let old = deflated(&noise(1, 4096));
        let new = deflated(&noise(99, 4096));
        assert_eq!(roundtrip(&old, &new), new);
    }

    #[test]
    fn test_short_payload_ships_as_one_literal() {
        let old = deflated(&noise(5, 64));
        let new = deflated(&noise(6, 64));
        assert!(new.len() < BLOCK_SIZE);

        let delta = BlockDeltaGenerator.generate(&old, &new).unwrap();
        assert_eq!(delta[0], OP_INSERT);
        assert_eq!(delta.len(), 5 + new.len());
        assert_eq!(BlockDeltaApplier.apply(&old, &delta).unwrap(), new);
    }

    #[test]
    fn test_empty_payloads() {
        let payload = deflated(&noise(13, 2048));
        assert_eq!(roundtrip(b"", &payload), payload);
        assert_eq!(roundtrip(&payload, b""), Vec::<u8>::new());
        assert_eq!(roundtrip(b"", b""), Vec::<u8>::new());
    }

    #[test]
    fn test_slide_tracks_fresh_checksums() {
        // walk a buffer one byte at a time; the slid state must agree
        // with a checksum computed from scratch at every position
        let data = noise(17, 512);
        let window = 64;
        let mut rolling = RollingHash::over(&data[..window]);
        for start in 1..=data.len() - window {
            rolling.slide(data[start - 1], data[start + window - 1]);
            assert_eq!(
                rolling.digest(),
                RollingHash::over(&data[start..start + window]).digest(),
                "window at {start}",
            );
        }
    }

    #[test]
    fn test_copy_out_of_range_is_corrupt() {
        let mut delta = Vec::new();
        delta.push(OP_COPY);
        delta.extend_from_slice(&100u32.to_le_bytes());
        delta.extend_from_slice(&10u32.to_le_bytes());
        let err = BlockDeltaApplier.apply(b"short", &delta).unwrap_err();
        assert!(matches!(err, PatchError::CorruptDelta(_)));
    }

    #[test]
    fn test_unknown_op_is_corrupt() {
        let err = BlockDeltaApplier.apply(b"", &[0x77]).unwrap_err();
        assert!(matches!(err, PatchError::CorruptDelta(_)));
    }
}
