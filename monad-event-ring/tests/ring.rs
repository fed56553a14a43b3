// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Single-process ring round trips: file creation, header contents,
//! recording, descriptor copies, and payload reads.

use std::time::{SystemTime, UNIX_EPOCH};

use monad_event_ring::{
    init_ring_file, EventContentType, EventNextResult, EventPayloadResult, EventRing,
    EventRingError, EventRingSize, RawEventDecoder, SnapshotEventRing, TypedEventRing,
};

fn epoch_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}

#[test]
fn init_record_read_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test-ring");
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();

    let ring = EventRing::<RawEventDecoder>::create_at_path(&path, &size).unwrap();

    // The mapped header reproduces exactly what initialization wrote.
    assert_eq!(ring.size(), size);
    assert_eq!(
        ring.raw().content_type_raw(),
        EventContentType::None as u16
    );
    assert_eq!(ring.schema_hash(), [0u8; 32]);

    let mut reader = ring.create_reader();
    let mut recorder = ring.create_recorder().unwrap();

    assert!(matches!(reader.next_descriptor(), EventNextResult::NotReady));

    let t_start = epoch_nanos();
    let seqno = recorder.record(2, [7, 8, 9, 10], &[0xDE, 0xAD, 0xBE, 0xEF]);
    let t_end = epoch_nanos();
    assert_eq!(seqno, 1);

    let descriptor = match reader.next_descriptor() {
        EventNextResult::Ready(descriptor) => descriptor,
        other => panic!("expected event, got {other:?}"),
    };
    let info = descriptor.info();
    assert_eq!(info.seqno, 1);
    assert_eq!(info.event_type, 2);
    assert_eq!(info.payload_size, 4);
    assert_eq!(info.content_ext, [7, 8, 9, 10]);
    assert!((t_start..=t_end).contains(&info.record_epoch_nanos));

    match descriptor.try_read() {
        EventPayloadResult::Payload((event_type, payload)) => {
            assert_eq!(event_type, 2);
            assert_eq!(payload, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        }
        EventPayloadResult::Expired => panic!("payload cannot expire in an idle ring"),
    }

    assert!(matches!(reader.next_descriptor(), EventNextResult::NotReady));
}

#[test]
fn try_copy_distinguishes_unproduced_slots() {
    let dir = tempfile::tempdir().unwrap();
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();
    let ring =
        EventRing::<RawEventDecoder>::create_at_path(dir.path().join("test-ring"), &size).unwrap();
    let mut recorder = ring.create_recorder().unwrap();

    // seqno 0 is the "never written" sentinel and can never be copied.
    assert!(ring.raw().try_copy(0).is_none());
    // Nothing produced yet.
    assert!(ring.raw().try_copy(1).is_none());

    recorder.record(2, [0; 4], b"one");
    recorder.record(2, [0; 4], b"two");

    let event = ring.raw().try_copy(1).unwrap();
    assert_eq!(event.seqno, 1);
    assert_eq!(event.event_type, 2);
    assert_eq!(ring.raw().payload_peek(&event), b"one");
    assert!(ring.raw().payload_check(&event));

    let mut buf = [0u8; 16];
    let copied = ring.raw().payload_memcpy(&event, &mut buf).unwrap();
    assert_eq!(copied, b"one");

    // Beyond the writer's position.
    assert!(ring.raw().try_copy(3).is_none());
}

#[test]
fn payload_extents_are_aligned() {
    let dir = tempfile::tempdir().unwrap();
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();
    let ring =
        EventRing::<RawEventDecoder>::create_at_path(dir.path().join("test-ring"), &size).unwrap();
    let mut recorder = ring.create_recorder().unwrap();

    recorder.record(2, [0; 4], &[1; 3]); // 3 bytes, forces alignment padding
    recorder.record(2, [0; 4], &[2; 5]);

    let first = ring.raw().try_copy(1).unwrap();
    let second = ring.raw().try_copy(2).unwrap();
    assert_eq!(first.payload_buf_offset % 16, 0);
    assert_eq!(second.payload_buf_offset % 16, 0);
    assert!(second.payload_buf_offset >= first.payload_buf_offset + 3);
    assert_eq!(ring.raw().payload_peek(&second), &[2; 5]);
}

#[test]
fn zero_length_payload_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();
    let ring =
        EventRing::<RawEventDecoder>::create_at_path(dir.path().join("test-ring"), &size).unwrap();
    let mut recorder = ring.create_recorder().unwrap();
    let mut reader = ring.create_reader();

    recorder.record(2, [0; 4], &[]);
    match reader.next_event() {
        EventNextResult::Ready(EventPayloadResult::Payload((event_type, payload))) => {
            assert_eq!(event_type, 2);
            assert!(payload.is_empty());
        }
        other => panic!("expected empty event, got {other:?}"),
    }
}

#[test]
fn reserve_then_commit_publishes_once() {
    let dir = tempfile::tempdir().unwrap();
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();
    let ring =
        EventRing::<RawEventDecoder>::create_at_path(dir.path().join("test-ring"), &size).unwrap();
    let mut recorder = ring.create_recorder().unwrap();
    let mut reader = ring.create_reader();

    let mut reservation = recorder.reserve(2, 4, [0; 4]).unwrap();
    assert_eq!(reservation.seqno(), 1);

    // Not yet published: the slot still carries the zero sentinel.
    assert!(ring.raw().try_copy(1).is_none());
    assert!(matches!(reader.next_descriptor(), EventNextResult::NotReady));

    reservation.payload_mut().copy_from_slice(&[1, 2, 3, 4]);
    assert_eq!(reservation.commit(), 1);

    let event = ring.raw().try_copy(1).unwrap();
    assert_eq!(ring.raw().payload_peek(&event), &[1, 2, 3, 4]);
}

#[test]
fn init_file_rejects_reinitialization() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test-ring");
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();

    let ring = EventRing::<RawEventDecoder>::create_at_path(&path, &size).unwrap();
    drop(ring);

    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .unwrap();
    let err = init_ring_file(
        &size,
        EventContentType::Test,
        &[0x11; 32],
        &file,
        0,
        "test-ring",
    )
    .unwrap_err();
    assert!(matches!(err, EventRingError::AlreadyInitialized { .. }));
    assert!(monad_event_ring::last_error().contains("already"));
}

#[test]
fn init_file_requires_presized_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("undersized");
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();

    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .unwrap();
    file.set_len(4096).unwrap();

    let err = init_ring_file(
        &size,
        EventContentType::Test,
        &[0x11; 32],
        &file,
        0,
        "undersized",
    )
    .unwrap_err();
    assert!(matches!(err, EventRingError::BadFile { .. }));
}

#[test]
fn mapping_garbage_fails_bad_magic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage");
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();

    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .unwrap();
    file.set_len(size.total_storage()).unwrap();
    drop(file);

    let err = EventRing::<RawEventDecoder>::new_from_path(&path).unwrap_err();
    assert!(matches!(err, EventRingError::BadMagic { .. }));
}

#[test]
fn read_only_mapping_cannot_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test-ring");
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();

    EventRing::<RawEventDecoder>::create_at_path(&path, &size).unwrap();
    let read_only = EventRing::<RawEventDecoder>::new_from_path(&path).unwrap();
    let err = read_only.create_recorder().unwrap_err();
    assert!(matches!(err, EventRingError::Protection { .. }));
}

#[test]
fn ring_at_offset_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offset-ring");
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();
    let ring_offset = 2 * 1024 * 1024;

    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .unwrap();
    file.set_len(ring_offset + size.total_storage()).unwrap();
    init_ring_file(
        &size,
        EventContentType::None,
        &[0u8; 32],
        &file,
        ring_offset,
        "offset-ring",
    )
    .unwrap();
    drop(file);

    let ring =
        EventRing::<RawEventDecoder>::new_from_path_with_offset(&path, ring_offset).unwrap();
    assert_eq!(ring.size(), size);
}

#[test]
fn snapshot_replays_from_first_event() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test-ring");
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();

    {
        let ring = EventRing::<RawEventDecoder>::create_at_path(&path, &size).unwrap();
        let mut recorder = ring.create_recorder().unwrap();
        for i in 0..10u8 {
            recorder.record(2, [0; 4], &[i; 8]);
        }
    }

    let image = std::fs::read(&path).unwrap();
    let compressed = zstd::stream::encode_all(image.as_slice(), 0).unwrap();
    let snapshot =
        SnapshotEventRing::<RawEventDecoder>::new_from_zstd_bytes(&compressed, "test-snapshot")
            .unwrap();

    let mut reader = snapshot.create_reader();
    for i in 0..10u8 {
        match reader.next_event() {
            EventNextResult::Ready(EventPayloadResult::Payload((event_type, payload))) => {
                assert_eq!(event_type, 2);
                assert_eq!(payload, vec![i; 8]);
            }
            other => panic!("expected snapshot event {i}, got {other:?}"),
        }
    }
    assert!(matches!(reader.next_descriptor(), EventNextResult::NotReady));
}
