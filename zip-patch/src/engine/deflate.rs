//! Raw-deflate blob compression
//!
//! No zlib framing on either side; the blob length is carried by the
//! directive that owns the blob.

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use super::{compression_id, Compressor, Uncompressor};
use crate::error::Result;

/// Raw-deflate compressor (id 1). Accepts every blob.
#[derive(Debug, Default)]
pub struct DeflateCompressor;

impl Compressor for DeflateCompressor {
    fn id(&self) -> u32 {
        compression_id::DEFLATE
    }

    fn accepts(&self, _data: &[u8]) -> bool {
        true
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }
}

/// Inverse of [`DeflateCompressor`], under the same id.
#[derive(Debug, Default)]
pub struct DeflateUncompressor;

impl Uncompressor for DeflateUncompressor {
    fn id(&self) -> u32 {
        compression_id::DEFLATE
    }

    fn uncompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = DeflateDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}
