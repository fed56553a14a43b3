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

//! End-to-end use of the typed ring API against the TEST schema.

use monad_event_ring::{
    EventContentType, EventDecoder, EventDescriptorInfo, EventNextResult, EventPayloadResult,
    EventRing, EventRingError, EventRingSize, RecordErrorType, SnapshotEventRing, TypedEventRing,
};
use monad_test_events::{
    test_schema_hash, TestEvent, TestEventDecoder, TestEventRef, TEST_EVENT_COUNTER,
    TEST_EVENT_MESSAGE,
};

#[test]
fn typed_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test-events");
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();

    let ring = EventRing::<TestEventDecoder>::create_at_path(&path, &size).unwrap();
    assert_eq!(
        ring.raw().content_type_raw(),
        EventContentType::Test as u16
    );
    assert_eq!(&ring.schema_hash(), test_schema_hash());

    let mut reader = ring.create_reader();
    let mut recorder = ring.create_recorder().unwrap();

    recorder.record(TEST_EVENT_MESSAGE, [0; 4], b"hello ring");
    recorder.record(TEST_EVENT_COUNTER, [0; 4], &42u64.to_le_bytes());

    match reader.next_event() {
        EventNextResult::Ready(EventPayloadResult::Payload(TestEvent::Message(payload))) => {
            assert_eq!(payload, b"hello ring");
        }
        other => panic!("expected message event, got {other:?}"),
    }
    match reader.next_event() {
        EventNextResult::Ready(EventPayloadResult::Payload(TestEvent::Counter(counter))) => {
            assert_eq!(counter, 42);
        }
        other => panic!("expected counter event, got {other:?}"),
    }
    assert!(matches!(reader.next_descriptor(), EventNextResult::NotReady));
}

#[test]
fn zero_copy_filter_map() {
    let dir = tempfile::tempdir().unwrap();
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();
    let ring =
        EventRing::<TestEventDecoder>::create_at_path(dir.path().join("filter"), &size).unwrap();
    let mut reader = ring.create_reader();
    let mut recorder = ring.create_recorder().unwrap();

    recorder.record(TEST_EVENT_COUNTER, [0; 4], &7u64.to_le_bytes());
    recorder.record(TEST_EVENT_MESSAGE, [0; 4], b"skipped");

    // Project only counter events, without copying message payloads.
    let mut counters = Vec::new();
    loop {
        match reader.next_descriptor() {
            EventNextResult::Ready(descriptor) => {
                match descriptor.try_filter_map(|event_ref| match event_ref {
                    TestEventRef::Counter(counter) => Some(counter),
                    _ => None,
                }) {
                    EventPayloadResult::Payload(Some(counter)) => counters.push(counter),
                    EventPayloadResult::Payload(None) => {}
                    EventPayloadResult::Expired => panic!("cannot expire in idle ring"),
                }
            }
            EventNextResult::NotReady => break,
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(counters, vec![7]);
}

#[test]
fn dropped_event_surfaces_as_record_error() {
    let dir = tempfile::tempdir().unwrap();
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();
    let ring =
        EventRing::<TestEventDecoder>::create_at_path(dir.path().join("dropped"), &size).unwrap();
    let mut reader = ring.create_reader();
    let mut recorder = ring.create_recorder().unwrap();

    assert!(recorder
        .reserve(TEST_EVENT_MESSAGE, 0x1_0000_0000, [0; 4])
        .is_none());

    match reader.next_event() {
        EventNextResult::Ready(EventPayloadResult::Payload(TestEvent::RecordError(error))) => {
            assert_eq!(
                RecordErrorType::from_u16(error.error_type),
                Some(RecordErrorType::Overflow4Gb)
            );
            assert_eq!(error.dropped_event_type, TEST_EVENT_MESSAGE);
            assert_eq!(error.requested_payload_size, 0x1_0000_0000);
        }
        other => panic!("expected record error, got {other:?}"),
    }
}

#[test]
fn schema_mismatch_fails_at_map_time() {
    // Same content type, different compiled schema.
    #[derive(Debug)]
    struct StaleTestEventDecoder;

    impl EventDecoder for StaleTestEventDecoder {
        type Event = ();
        type EventRef<'ring> = ();

        fn content_type() -> EventContentType {
            EventContentType::Test
        }

        fn schema_hash() -> &'static [u8; 32] {
            const STALE_HASH: [u8; 32] = [0xab; 32];
            &STALE_HASH
        }

        fn decode_event_ref<'ring>(
            _info: EventDescriptorInfo,
            _payload: &'ring [u8],
        ) -> Self::EventRef<'ring> {
        }

        fn event_ref_to_owned(_event_ref: Self::EventRef<'_>) -> Self::Event {}
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mismatch");
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();
    drop(EventRing::<TestEventDecoder>::create_at_path(&path, &size).unwrap());

    let err = EventRing::<StaleTestEventDecoder>::new_from_path(&path).unwrap_err();
    assert!(matches!(err, EventRingError::SchemaMismatch { .. }));
    assert!(monad_event_ring::last_error().contains("schema hash mismatch"));

    // The genuine decoder still maps the same file.
    drop(EventRing::<TestEventDecoder>::new_from_path(&path).unwrap());
}

#[test]
fn content_type_mismatch_fails_at_map_time() {
    #[derive(Debug)]
    struct ExecLikeDecoder;

    impl EventDecoder for ExecLikeDecoder {
        type Event = ();
        type EventRef<'ring> = ();

        fn content_type() -> EventContentType {
            EventContentType::Exec
        }

        fn schema_hash() -> &'static [u8; 32] {
            const HASH: [u8; 32] = [0xcd; 32];
            &HASH
        }

        fn decode_event_ref<'ring>(
            _info: EventDescriptorInfo,
            _payload: &'ring [u8],
        ) -> Self::EventRef<'ring> {
        }

        fn event_ref_to_owned(_event_ref: Self::EventRef<'_>) -> Self::Event {}
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wrong-type");
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();
    drop(EventRing::<TestEventDecoder>::create_at_path(&path, &size).unwrap());

    let err = EventRing::<ExecLikeDecoder>::new_from_path(&path).unwrap_err();
    assert!(matches!(err, EventRingError::ContentTypeMismatch { .. }));
}

#[test]
fn snapshot_replay_decodes_typed_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot-src");
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();

    {
        let ring = EventRing::<TestEventDecoder>::create_at_path(&path, &size).unwrap();
        let mut recorder = ring.create_recorder().unwrap();
        for counter in 0..100u64 {
            recorder.record(TEST_EVENT_COUNTER, [0; 4], &counter.to_le_bytes());
        }
    }

    let image = std::fs::read(&path).unwrap();
    let compressed = zstd::stream::encode_all(image.as_slice(), 0).unwrap();
    let snapshot =
        SnapshotEventRing::<TestEventDecoder>::new_from_zstd_bytes(&compressed, "typed-snapshot")
            .unwrap();

    let mut reader = snapshot.create_reader();
    for counter in 0..100u64 {
        match reader.next_event() {
            EventNextResult::Ready(EventPayloadResult::Payload(TestEvent::Counter(value))) => {
                assert_eq!(value, counter);
            }
            other => panic!("expected counter {counter}, got {other:?}"),
        }
    }
    assert!(matches!(reader.next_descriptor(), EventNextResult::NotReady));
}
