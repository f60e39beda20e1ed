//! Structural patches between ZIP archives
//!
//! A patch is a compact, self-describing directive stream that rebuilds a
//! new archive from an old one. Four directive kinds avoid retransmitting
//! payloads that already exist in the old archive: COPY reuses an entry
//! verbatim, REFRESH reuses a payload under replacement headers, PATCH
//! transforms a payload with a pluggable binary delta, and NEW ships a
//! complete entry. A BEGIN directive carrying the new archive's central
//! directory always leads the stream.
//!
//! Generation and application share one wire contract and are
//! deterministic: the same inputs and engine lists produce byte-identical
//! patches, and applying a patch reproduces the new archive byte for byte.

pub mod applier;
pub mod directive;
pub mod engine;
pub mod error;
pub mod generator;
pub mod stream;

pub use applier::PatchApplier;
pub use directive::{EntryHeaders, NewPart, PatchDirective, PatchPart, PatchVersion};
pub use engine::{
    Compressor, DeltaApplier, DeltaGenerator, EngineRegistry, Uncompressor,
};
pub use error::{PatchError, Result};
pub use generator::{PatchGenerator, PatchSummary};
pub use stream::{PatchReader, PatchWriter};
