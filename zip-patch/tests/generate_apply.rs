//! End-to-end: generate a patch between two archives, apply it against the
//! old bytes, and require the new archive byte for byte.

use std::io::{Cursor, Read, Write};

use zip_archive::{Archive, ArchiveBuilder};
use zip_patch::directive::{PatchDirective, PatchVersion};
use zip_patch::engine::{
    self, compression_id, delta_id, DeltaApplier, DeltaGenerator, EngineRegistry,
};
use zip_patch::{PatchApplier, PatchError, PatchGenerator, PatchReader, PatchWriter};

/// Build an archive and its serialized form in one go.
fn build(entries: &[(&str, &[u8], i64)]) -> (Archive, Vec<u8>) {
    let mut builder = ArchiveBuilder::new();
    for (name, payload, millis) in entries {
        builder.add(name, *millis, *payload).expect("add entry");
    }
    let mut archive = builder.finish().expect("finish");
    let bytes = archive.to_bytes().expect("serialize");
    (archive, bytes)
}

fn generate(old: &Archive, new: &Archive) -> Vec<u8> {
    let mut patch = Vec::new();
    PatchGenerator::new(old, new)
        .generate(&mut patch)
        .expect("generate");
    patch
}

fn apply(old_bytes: &[u8], patch: &[u8]) -> Vec<u8> {
    let registry = EngineRegistry::with_builtins();
    let mut applied = PatchApplier::new(old_bytes, &registry)
        .apply(Cursor::new(patch))
        .expect("apply");
    applied.to_bytes().expect("serialize applied")
}

/// Directives after the version header and BEGIN, for shape assertions.
fn directives(patch: &[u8]) -> Vec<PatchDirective> {
    let mut reader = PatchReader::new(Cursor::new(patch)).expect("version header");
    let mut all = Vec::new();
    while let Some(directive) = reader.next_directive().expect("directive") {
        all.push(directive);
    }
    assert!(
        matches!(all.first(), Some(PatchDirective::Begin(_))),
        "stream must open with BEGIN"
    );
    all.split_off(1)
}

#[test]
fn identical_archives_become_one_copy() {
    let (old, old_bytes) = build(&[("a", b"x", 0)]);
    let (new, new_bytes) = build(&[("a", b"x", 0)]);

    let patch = generate(&old, &new);
    let body = directives(&patch);
    assert_eq!(body, vec![PatchDirective::Copy { offset: 0 }]);

    assert_eq!(apply(&old_bytes, &patch), new_bytes);
}

#[test]
fn touched_timestamp_becomes_refresh() {
    let (old, old_bytes) = build(&[("a", b"x", 0)]);
    let (new, new_bytes) = build(&[("a", b"x", 1_402_144_496_000)]);

    let patch = generate(&old, &new);
    let body = directives(&patch);
    assert_eq!(body.len(), 1);
    let PatchDirective::Refresh { offset, headers } = &body[0] else {
        panic!("expected REFRESH, got {body:?}");
    };
    assert_eq!(*offset, 0);
    assert_ne!(
        headers.header.last_modified_date,
        old.local_sections()[0].header.last_modified_date
    );

    let applied = apply(&old_bytes, &patch);
    assert_eq!(applied, new_bytes);

    // the applied entry carries the new stamp over the old payload
    let applied = Archive::from_bytes(&applied).unwrap();
    assert_eq!(
        applied.local_sections()[0].header.last_modified_date,
        new.local_sections()[0].header.last_modified_date
    );
    assert_eq!(applied.local_sections()[0].data, old.local_sections()[0].data);
}

#[test]
fn changed_payload_becomes_patch() {
    let body_old: Vec<u8> = (0..4096u32).flat_map(|i| i.to_le_bytes()).collect();
    let mut body_new = body_old.clone();
    body_new[100] ^= 0xFF;
    body_new.extend_from_slice(b"and a little extra");

    let (old, old_bytes) = build(&[("data.bin", &body_old, 7_000)]);
    let (new, new_bytes) = build(&[("data.bin", &body_new, 7_000)]);

    let patch = generate(&old, &new);
    let body = directives(&patch);
    assert_eq!(body.len(), 1);
    let PatchDirective::Patch { offset, part } = &body[0] else {
        panic!("expected PATCH, got {body:?}");
    };
    assert_eq!(*offset, 0);
    assert_eq!(part.delta_engine(), delta_id::BLOCK);
    assert_eq!(part.compression_engine(), compression_id::DEFLATE);

    assert_eq!(apply(&old_bytes, &patch), new_bytes);
}

#[test]
fn added_entry_becomes_copy_plus_new() {
    let (old, old_bytes) = build(&[("a", b"x", 0)]);
    let (new, new_bytes) = build(&[("a", b"x", 0), ("b", b"fresh", 0)]);

    let patch = generate(&old, &new);
    let body = directives(&patch);
    assert_eq!(body.len(), 2);
    assert_eq!(body[0], PatchDirective::Copy { offset: 0 });
    assert!(matches!(&body[1], PatchDirective::New(part) if part.headers.header.file_name == "b"));

    assert_eq!(apply(&old_bytes, &patch), new_bytes);
}

#[test]
fn removed_entry_disappears() {
    let (old, old_bytes) = build(&[("a", b"x", 0), ("b", b"gone", 0)]);
    let (new, new_bytes) = build(&[("a", b"x", 0)]);

    let patch = generate(&old, &new);
    let body = directives(&patch);
    assert_eq!(body, vec![PatchDirective::Copy { offset: 0 }]);

    assert_eq!(apply(&old_bytes, &patch), new_bytes);
}

#[test]
fn copy_offsets_address_later_entries() {
    let (old, old_bytes) = build(&[("a", b"first", 0), ("b", b"second", 0), ("c", b"third", 0)]);
    // drop the first entry; b and c must copy from their real offsets
    let (new, new_bytes) = build(&[("b", b"second", 0), ("c", b"third", 0)]);

    let patch = generate(&old, &new);
    let body = directives(&patch);
    let offsets: Vec<u32> = body
        .iter()
        .map(|d| match d {
            PatchDirective::Copy { offset } => *offset,
            other => panic!("expected COPY, got {other:?}"),
        })
        .collect();
    assert_eq!(offsets.len(), 2);
    assert_eq!(
        offsets[0] as usize,
        old.local_sections()[0].structure_length()
    );
    assert!(offsets[1] > offsets[0]);

    assert_eq!(apply(&old_bytes, &patch), new_bytes);
}

#[test]
fn mixed_stream_applies_exactly() {
    let big: Vec<u8> = (0..3000u32).flat_map(|i| (i * 7).to_le_bytes()).collect();
    let mut big_touched = big.clone();
    big_touched[5000] = !big_touched[5000];

    let (old, old_bytes) = build(&[
        ("keep", b"unchanged", 1_000),
        ("stamp", b"same bytes", 1_000),
        ("delta", &big, 1_000),
        ("drop", b"removed", 1_000),
    ]);
    let (new, new_bytes) = build(&[
        ("keep", b"unchanged", 1_000),
        ("stamp", b"same bytes", 1_402_144_496_000),
        ("delta", &big_touched, 1_000),
        ("added", b"brand new entry", 1_000),
    ]);

    let patch = generate(&old, &new);
    let body = directives(&patch);
    assert!(matches!(body[0], PatchDirective::Copy { .. }));
    assert!(matches!(body[1], PatchDirective::Refresh { .. }));
    assert!(matches!(body[2], PatchDirective::Patch { .. }));
    assert!(matches!(body[3], PatchDirective::New(_)));

    assert_eq!(apply(&old_bytes, &patch), new_bytes);
}

#[test]
fn generation_is_deterministic() {
    let (old, _) = build(&[("a", b"payload one", 0), ("b", b"payload two", 0)]);
    let (new, _) = build(&[("a", b"payload 1!!", 0), ("c", b"payload three", 0)]);

    assert_eq!(generate(&old, &new), generate(&old, &new));
}

#[test]
fn summary_accounts_for_each_directive() {
    let (old, _) = build(&[("a", b"x", 0), ("b", b"y", 0)]);
    let (new, _) = build(&[("a", b"x", 0), ("b", b"y", 1_402_144_496_000), ("c", b"z", 0)]);

    let mut patch = Vec::new();
    let summary = PatchGenerator::new(&old, &new)
        .generate(&mut patch)
        .unwrap();

    assert_eq!(summary.copies, 1);
    assert_eq!(summary.refreshes, 1);
    assert_eq!(summary.patches, 0);
    assert_eq!(summary.news, 1);
    assert_eq!(summary.directive_count(), 3);
    assert_eq!(summary.copy_bytes, 5);
    assert!(summary.refresh_bytes > 5);
    assert!(summary.data_saved > 0);
    assert!(summary.data_shipped > 0);

    let report = summary.to_string();
    assert!(report.contains("COPY"));
    assert!(report.contains("REFRESH"));
}

/// Test doubles for the engine-priority rule.
struct FixedDelta {
    id: u32,
    marker: u8,
}

impl DeltaGenerator for FixedDelta {
    fn id(&self) -> u32 {
        self.id
    }
    fn accepts(&self, _old: &[u8], _new: &[u8]) -> bool {
        true
    }
    fn generate(&self, _old: &[u8], new: &[u8]) -> zip_patch::Result<Vec<u8>> {
        let mut blob = vec![self.marker];
        blob.extend_from_slice(new);
        Ok(blob)
    }
}

struct FixedDeltaApplier {
    id: u32,
    marker: u8,
}

impl DeltaApplier for FixedDeltaApplier {
    fn id(&self) -> u32 {
        self.id
    }
    fn apply(&self, _old: &[u8], delta: &[u8]) -> zip_patch::Result<Vec<u8>> {
        assert_eq!(delta[0], self.marker);
        Ok(delta[1..].to_vec())
    }
}

#[test]
fn earlier_delta_engine_wins() {
    let (old, old_bytes) = build(&[("a", b"one payload", 0)]);
    let (new, new_bytes) = build(&[("a", b"another payload", 0)]);

    let mut patch = Vec::new();
    PatchGenerator::new(&old, &new)
        .delta_generators(vec![
            Box::new(FixedDelta { id: 60, marker: 0xAA }),
            Box::new(FixedDelta { id: 61, marker: 0xBB }),
        ])
        .compressors(Vec::new())
        .generate(&mut patch)
        .unwrap();

    let body = directives(&patch);
    let PatchDirective::Patch { part, .. } = &body[0] else {
        panic!("expected PATCH, got {body:?}");
    };
    assert_eq!(part.delta_engine(), 60);
    assert_eq!(part.compression_engine(), compression_id::NONE);
    assert_eq!(part.blob[0], 0xAA);

    let mut registry = EngineRegistry::new();
    registry.register_delta_applier(Box::new(FixedDeltaApplier { id: 60, marker: 0xAA }));
    registry.register_delta_applier(Box::new(FixedDeltaApplier { id: 61, marker: 0xBB }));
    let mut applied = PatchApplier::new(&old_bytes, &registry)
        .apply(Cursor::new(&patch))
        .unwrap();
    assert_eq!(applied.to_bytes().unwrap(), new_bytes);
}

#[test]
fn rejecting_engines_fall_through_to_new() {
    struct Refuser;
    impl DeltaGenerator for Refuser {
        fn id(&self) -> u32 {
            70
        }
        fn accepts(&self, _old: &[u8], _new: &[u8]) -> bool {
            false
        }
        fn generate(&self, _old: &[u8], _new: &[u8]) -> zip_patch::Result<Vec<u8>> {
            unreachable!("accepts() said no")
        }
    }

    let (old, old_bytes) = build(&[("a", b"one payload", 0)]);
    let (new, new_bytes) = build(&[("a", b"another payload", 0)]);

    let mut patch = Vec::new();
    PatchGenerator::new(&old, &new)
        .delta_generators(vec![Box::new(Refuser)])
        .generate(&mut patch)
        .unwrap();

    let body = directives(&patch);
    assert!(matches!(body[0], PatchDirective::New(_)));
    assert_eq!(apply(&old_bytes, &patch), new_bytes);
}

#[test]
fn version1_patch_applies_with_default_engines() {
    let (old, old_bytes) = build(&[("a", b"version one payload", 0)]);
    let (new, new_bytes) = build(&[("a", b"version one payload, appended", 0)]);

    // hand-write a v1 stream: BEGIN plus a PATCH with implied (block, none)
    let old_parts = old.local_by_name("a").unwrap();
    let new_parts = new.local_by_name("a").unwrap();
    let delta = engine::BlockDeltaGenerator
        .generate(&old_parts.data, &new_parts.data)
        .unwrap();

    let mut writer = PatchWriter::with_version(Vec::new(), PatchVersion::V1).unwrap();
    writer
        .write_directive(&PatchDirective::Begin(new.central_directory().clone()))
        .unwrap();
    writer
        .write_directive(&PatchDirective::Patch {
            offset: 0,
            part: zip_patch::PatchPart::new(
                zip_patch::EntryHeaders {
                    header: new_parts.header.clone(),
                    descriptor: new_parts.descriptor,
                },
                delta_id::BLOCK,
                compression_id::NONE,
                delta,
            ),
        })
        .unwrap();
    let patch = writer.into_inner();

    assert_eq!(apply(&old_bytes, &patch), new_bytes);
}

#[test]
fn patch_roundtrips_through_a_file() {
    let (old, old_bytes) = build(&[("a", b"file payload", 0)]);
    let (new, new_bytes) = build(&[("a", b"file payload!", 0)]);

    let patch = generate(&old, &new);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&patch).unwrap();
    file.flush().unwrap();

    let mut reread = Vec::new();
    std::fs::File::open(file.path())
        .unwrap()
        .read_to_end(&mut reread)
        .unwrap();

    assert_eq!(apply(&old_bytes, &reread), new_bytes);
}

#[test]
fn stream_without_begin_is_rejected() {
    let (_, old_bytes) = build(&[("a", b"x", 0)]);

    let mut writer = PatchWriter::new(Vec::new()).unwrap();
    writer
        .write_directive(&PatchDirective::Copy { offset: 0 })
        .unwrap();
    let patch = writer.into_inner();

    let registry = EngineRegistry::with_builtins();
    let err = PatchApplier::new(&old_bytes, &registry)
        .apply(Cursor::new(&patch))
        .unwrap_err();
    assert!(matches!(err, PatchError::MissingBegin));
}

#[test]
fn unknown_delta_engine_is_fatal() {
    let (_, old_bytes) = build(&[("a", b"abc", 0)]);
    let (new, _) = build(&[("a", b"abcdef", 0)]);

    let mut writer = PatchWriter::new(Vec::new()).unwrap();
    writer
        .write_directive(&PatchDirective::Begin(new.central_directory().clone()))
        .unwrap();
    let new_parts = new.local_by_name("a").unwrap();
    writer
        .write_directive(&PatchDirective::Patch {
            offset: 0,
            part: zip_patch::PatchPart::new(
                zip_patch::EntryHeaders {
                    header: new_parts.header.clone(),
                    descriptor: new_parts.descriptor,
                },
                99,
                compression_id::NONE,
                vec![1, 2, 3],
            ),
        })
        .unwrap();
    let patch = writer.into_inner();

    let registry = EngineRegistry::with_builtins();
    let err = PatchApplier::new(&old_bytes, &registry)
        .apply(Cursor::new(&patch))
        .unwrap_err();
    assert!(matches!(err, PatchError::UnknownDeltaEngine(99)));
}

#[test]
fn unsupported_version_is_fatal() {
    let (_, old_bytes) = build(&[("a", b"x", 0)]);
    let registry = EngineRegistry::with_builtins();
    let err = PatchApplier::new(&old_bytes, &registry)
        .apply(Cursor::new(&[7u8, 0, 0, 0]))
        .unwrap_err();
    assert!(matches!(err, PatchError::UnsupportedVersion(7)));
}
