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

use crate::{ring::RawEventRing, EventContentType, EventDescriptorInfo, EventRingError};

/// Associates a ring's content type with Rust-native event types.
///
/// A decoder is the compile-time identity of one content type: it names the
/// [`EventContentType`] tag and schema hash checked at map time, and it turns
/// raw descriptor info plus payload bytes into typed events. The ring core
/// never interprets payload bytes itself; all schema knowledge lives in
/// decoder crates.
pub trait EventDecoder: 'static {
    /// The owned event type produced by [`try_read`].
    ///
    /// [`try_read`]: crate::EventDescriptor::try_read
    type Event;

    /// A zero-copy view of an event, borrowing from the ring's payload
    /// buffer.
    type EventRef<'ring>;

    /// The content type this decoder understands.
    fn content_type() -> EventContentType;

    /// The schema hash this decoder was compiled against.
    fn schema_hash() -> &'static [u8; 32];

    /// Builds the zero-copy view of one event.
    ///
    /// `payload` aliases live writer memory; implementations must not stash
    /// it anywhere that outlives the enclosing expiration re-check.
    fn decode_event_ref<'ring>(
        info: EventDescriptorInfo,
        payload: &'ring [u8],
    ) -> Self::EventRef<'ring>;

    /// Copies a zero-copy view into its owned form.
    fn event_ref_to_owned(event_ref: Self::EventRef<'_>) -> Self::Event;

    /// Validates a freshly mapped ring against this decoder. The default
    /// checks the content type tag and the schema hash; content-type-agnostic
    /// decoders override this.
    fn check_ring(ring: &RawEventRing) -> Result<(), EventRingError> {
        ring.check_content_type(Self::content_type(), Some(Self::schema_hash()))
    }
}

/// A passthrough decoder that accepts any ring and yields raw payload bytes.
///
/// Useful for content-type-agnostic tooling such as the `hexdump` example,
/// and for tests that exercise the ring protocol without a schema crate.
#[derive(Debug)]
pub struct RawEventDecoder;

impl EventDecoder for RawEventDecoder {
    type Event = (u16, Vec<u8>);
    type EventRef<'ring> = (u16, &'ring [u8]);

    fn content_type() -> EventContentType {
        EventContentType::None
    }

    fn schema_hash() -> &'static [u8; 32] {
        const ZERO_HASH: [u8; 32] = [0; 32];
        &ZERO_HASH
    }

    fn decode_event_ref<'ring>(
        info: EventDescriptorInfo,
        payload: &'ring [u8],
    ) -> Self::EventRef<'ring> {
        (info.event_type, payload)
    }

    fn event_ref_to_owned((event_type, payload): Self::EventRef<'_>) -> Self::Event {
        (event_type, payload.to_vec())
    }

    fn check_ring(_ring: &RawEventRing) -> Result<(), EventRingError> {
        // Raw access works against every content type.
        Ok(())
    }
}
