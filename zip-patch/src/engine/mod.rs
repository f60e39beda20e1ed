//! Pluggable delta and compression engines
//!
//! Engines are identified by stable numeric ids carried inside PATCH
//! directives. Pairing a generator with its applier and a compressor with
//! its uncompressor by id is the caller's contract; the core only routes.

mod block;
mod bsdiff;
mod deflate;

pub use block::{BlockDeltaApplier, BlockDeltaGenerator};
pub use bsdiff::{BsdiffApplier, BsdiffGenerator};
pub use deflate::{DeflateCompressor, DeflateUncompressor};

use std::collections::HashMap;

use crate::error::{PatchError, Result};

/// Delta engine ids.
pub mod delta_id {
    /// Identity / absent.
    pub const NONE: u32 = 0;
    /// Rolling-hash block delta; the implied engine of version-1 patches.
    pub const BLOCK: u32 = 1;
    /// bsdiff-style control/diff/extra delta.
    pub const BSDIFF: u32 = 2;
}

/// Compression engine ids.
pub mod compression_id {
    /// Blob shipped raw.
    pub const NONE: u32 = 0;
    /// Raw deflate.
    pub const DEFLATE: u32 = 1;
}

/// Produces binary deltas between two payloads.
pub trait DeltaGenerator {
    fn id(&self) -> u32;
    /// Whether this engine wants to diff the given pair.
    fn accepts(&self, old: &[u8], new: &[u8]) -> bool;
    fn generate(&self, old: &[u8], new: &[u8]) -> Result<Vec<u8>>;
}

/// Reconstructs a payload from the old payload and a delta.
pub trait DeltaApplier {
    fn id(&self) -> u32;
    fn apply(&self, old: &[u8], delta: &[u8]) -> Result<Vec<u8>>;
}

impl std::fmt::Debug for dyn DeltaApplier + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeltaApplier(id={})", self.id())
    }
}

/// Shrinks delta blobs before they enter the stream.
pub trait Compressor {
    fn id(&self) -> u32;
    fn accepts(&self, data: &[u8]) -> bool;
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Inverse of a [`Compressor`] with the same id.
pub trait Uncompressor {
    fn id(&self) -> u32;
    fn uncompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

impl std::fmt::Debug for dyn Uncompressor + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Uncompressor(id={})", self.id())
    }
}

/// Apply-side engine lookup. Every id a patch references must resolve
/// here; anything else is fatal.
pub struct EngineRegistry {
    delta_appliers: HashMap<u32, Box<dyn DeltaApplier>>,
    uncompressors: HashMap<u32, Box<dyn Uncompressor>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            delta_appliers: HashMap::new(),
            uncompressors: HashMap::new(),
        }
    }

    /// A registry with every built-in engine installed.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_delta_applier(Box::new(BlockDeltaApplier));
        registry.register_delta_applier(Box::new(BsdiffApplier));
        registry.register_uncompressor(Box::new(DeflateUncompressor));
        registry
    }

    /// Install an applier under its own id, displacing any previous holder.
    pub fn register_delta_applier(&mut self, applier: Box<dyn DeltaApplier>) {
        self.delta_appliers.insert(applier.id(), applier);
    }

    pub fn register_uncompressor(&mut self, uncompressor: Box<dyn Uncompressor>) {
        self.uncompressors.insert(uncompressor.id(), uncompressor);
    }

    pub fn delta_applier(&self, id: u32) -> Result<&dyn DeltaApplier> {
        self.delta_appliers
            .get(&id)
            .map(|boxed| boxed.as_ref())
            .ok_or(PatchError::UnknownDeltaEngine(id))
    }

    pub fn uncompressor(&self, id: u32) -> Result<&dyn Uncompressor> {
        self.uncompressors
            .get(&id)
            .map(|boxed| boxed.as_ref())
            .ok_or(PatchError::UnknownCompressionEngine(id))
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Generation-side delta engines in priority order: the first acceptor
/// wins.
pub fn builtin_delta_generators() -> Vec<Box<dyn DeltaGenerator>> {
    vec![
        Box::new(BlockDeltaGenerator),
        Box::new(BsdiffGenerator),
    ]
}

/// Generation-side compressors in priority order.
pub fn builtin_compressors() -> Vec<Box<dyn Compressor>> {
    vec![Box::new(DeflateCompressor)]
}
