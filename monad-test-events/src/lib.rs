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

//! Event schema for the TEST content type.
//!
//! The TEST namespace exists for automated tests of the event ring transport
//! itself: its payloads are deliberately trivial (opaque byte messages and a
//! monotonic counter) so that tests exercise the ring protocol rather than a
//! schema. It plays the same role for tests that an execution event schema
//! crate plays for a production ring: it pins the event type codes, the
//! payload layouts, and the schema hash consumers verify at map time.

use std::sync::OnceLock;

use monad_event_ring::{
    EventContentType, EventDecoder, EventDescriptorInfo, EventDomainMetadata, EventMetadata,
    RecordError,
};

/// An invalid value.
pub const TEST_EVENT_NONE: u16 = 0;
/// Reserved record-error event, present in every content namespace.
pub const TEST_EVENT_RECORD_ERROR: u16 = 1;
/// An opaque byte message.
pub const TEST_EVENT_MESSAGE: u16 = 2;
/// A little-endian `u64` counter sample.
pub const TEST_EVENT_COUNTER: u16 = 3;

/// The TEST namespace event table; the schema hash is derived from this.
pub const TEST_EVENT_DOMAIN_METADATA: EventDomainMetadata = EventDomainMetadata {
    content_type: EventContentType::Test,
    events: &[
        EventMetadata {
            event_type: TEST_EVENT_RECORD_ERROR,
            name: "TEST_RECORD_ERROR",
            description: "an error occurred while recording another event",
        },
        EventMetadata {
            event_type: TEST_EVENT_MESSAGE,
            name: "TEST_MESSAGE",
            description: "opaque byte message",
        },
        EventMetadata {
            event_type: TEST_EVENT_COUNTER,
            name: "TEST_COUNTER",
            description: "little-endian u64 counter sample",
        },
    ],
};

/// The schema hash a TEST ring pins in its header.
pub fn test_schema_hash() -> &'static [u8; 32] {
    static HASH: OnceLock<[u8; 32]> = OnceLock::new();
    HASH.get_or_init(|| TEST_EVENT_DOMAIN_METADATA.compute_schema_hash())
}

/// Owned form of a TEST event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TestEvent {
    /// An event was dropped while recording.
    RecordError(RecordError),
    /// Opaque byte message.
    Message(Vec<u8>),
    /// Counter sample.
    Counter(u64),
    /// An event type this decoder does not know; readers must tolerate
    /// arbitrary descriptor bytes.
    Unknown {
        /// The undecodable event type code.
        event_type: u16,
        /// Its raw payload bytes.
        payload: Vec<u8>,
    },
}

/// Zero-copy form of a TEST event, borrowing from the ring's payload buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum TestEventRef<'ring> {
    /// An event was dropped while recording.
    RecordError(RecordError),
    /// Opaque byte message.
    Message(&'ring [u8]),
    /// Counter sample.
    Counter(u64),
    /// An event type this decoder does not know.
    Unknown {
        /// The undecodable event type code.
        event_type: u16,
        /// Its raw payload bytes.
        payload: &'ring [u8],
    },
}

/// [`EventDecoder`] for rings carrying the TEST content type.
#[derive(Debug)]
pub struct TestEventDecoder;

impl EventDecoder for TestEventDecoder {
    type Event = TestEvent;
    type EventRef<'ring> = TestEventRef<'ring>;

    fn content_type() -> EventContentType {
        EventContentType::Test
    }

    fn schema_hash() -> &'static [u8; 32] {
        test_schema_hash()
    }

    fn decode_event_ref<'ring>(
        info: EventDescriptorInfo,
        payload: &'ring [u8],
    ) -> Self::EventRef<'ring> {
        match info.event_type {
            TEST_EVENT_RECORD_ERROR => match RecordError::from_payload(payload) {
                Some(record_error) => TestEventRef::RecordError(record_error),
                None => TestEventRef::Unknown {
                    event_type: info.event_type,
                    payload,
                },
            },
            TEST_EVENT_MESSAGE => TestEventRef::Message(payload),
            TEST_EVENT_COUNTER => match payload.first_chunk::<8>() {
                Some(counter_bytes) => TestEventRef::Counter(u64::from_le_bytes(*counter_bytes)),
                None => TestEventRef::Unknown {
                    event_type: info.event_type,
                    payload,
                },
            },
            _ => TestEventRef::Unknown {
                event_type: info.event_type,
                payload,
            },
        }
    }

    fn event_ref_to_owned(event_ref: Self::EventRef<'_>) -> Self::Event {
        match event_ref {
            TestEventRef::RecordError(record_error) => TestEvent::RecordError(record_error),
            TestEventRef::Message(payload) => TestEvent::Message(payload.to_vec()),
            TestEventRef::Counter(counter) => TestEvent::Counter(counter),
            TestEventRef::Unknown {
                event_type,
                payload,
            } => TestEvent::Unknown {
                event_type,
                payload: payload.to_vec(),
            },
        }
    }
}
