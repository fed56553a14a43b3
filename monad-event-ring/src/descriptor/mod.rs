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

use std::marker::PhantomData;

pub use self::raw::RawEventDescriptor;
use crate::{ring::RawEventRing, EventDecoder, EventPayloadResult};

mod raw;

/// The metadata for one event in an [`EventRing`](crate::EventRing),
/// captured by a reader.
///
/// The descriptor itself is a stable local copy; the payload it points at
/// still lives in shared memory and can be reclaimed by ring wrap-around at
/// any moment, which is why every payload accessor re-checks expiration
/// around the read.
#[derive(Debug)]
pub struct EventDescriptor<'ring, D>
where
    D: EventDecoder,
{
    raw: RawEventDescriptor,
    ring: &'ring RawEventRing,
    _phantom: PhantomData<D>,
}

impl<'ring, D> EventDescriptor<'ring, D>
where
    D: EventDecoder,
{
    pub(crate) fn new(ring: &'ring RawEventRing, raw: RawEventDescriptor) -> Self {
        Self {
            raw,
            ring,
            _phantom: PhantomData,
        }
    }

    /// Information fields of this descriptor.
    pub fn info(&self) -> EventDescriptorInfo {
        EventDescriptorInfo::new(&self.raw)
    }

    /// Attempts to read the payload associated with this event descriptor as
    /// the associated [`D::Event`](EventDecoder::Event) type.
    pub fn try_read(&self) -> EventPayloadResult<D::Event> {
        self.try_filter_map_raw_impl(|info, bytes| {
            D::event_ref_to_owned(D::decode_event_ref(info, bytes))
        })
    }

    /// Attempts to selectively reduce the zero-copy
    /// [`D::EventRef`](EventDecoder::EventRef) view of this event to a
    /// user-specified type.
    ///
    /// `f` runs while the underlying payload bytes may be concurrently
    /// overwritten; if the post-check detects that, its result is discarded
    /// through the [`EventPayloadResult::Expired`] variant. `f` is
    /// intentionally a function pointer rather than a closure so partial
    /// results cannot leak into captured state.
    pub fn try_filter_map<R: 'static>(
        &self,
        f: fn(event_ref: D::EventRef<'_>) -> Option<R>,
    ) -> EventPayloadResult<Option<R>> {
        self.try_filter_map_raw_impl(|info, bytes| f(D::decode_event_ref(info, bytes)))
    }

    /// Like [`try_filter_map`](Self::try_filter_map), but hands `f` the raw
    /// payload byte slice. This should not be used unless you explicitly
    /// need a byte-level view.
    pub fn try_filter_map_raw<R: 'static>(
        &self,
        f: fn(info: EventDescriptorInfo, payload: &[u8]) -> Option<R>,
    ) -> EventPayloadResult<Option<R>> {
        self.try_filter_map_raw_impl(f)
    }

    fn try_filter_map_raw_impl<R>(
        &self,
        f: impl FnOnce(EventDescriptorInfo, &[u8]) -> R,
    ) -> EventPayloadResult<R> {
        if !self.ring.payload_check(&self.raw) {
            return EventPayloadResult::Expired;
        }
        let bytes = self.ring.payload_peek(&self.raw);
        let value = f(EventDescriptorInfo::new(&self.raw), bytes);
        if self.ring.payload_check(&self.raw) {
            EventPayloadResult::Payload(value)
        } else {
            EventPayloadResult::Expired
        }
    }
}

/// Information associated with an event descriptor.
#[derive(Debug, Clone, Copy)]
pub struct EventDescriptorInfo {
    /// Sequence number used to check liveness / detect gapping.
    pub seqno: u64,

    /// Distinguishes event kinds within the ring's content type namespace.
    pub event_type: u16,

    /// Size of the event payload in bytes.
    pub payload_size: u32,

    /// Wall-clock recording time, nanoseconds since the Unix epoch.
    pub record_epoch_nanos: u64,

    /// Content-type-specific extension fields.
    pub content_ext: [u64; 4],
}

impl EventDescriptorInfo {
    fn new(raw: &RawEventDescriptor) -> Self {
        Self {
            seqno: raw.seqno,
            event_type: raw.event_type,
            payload_size: raw.payload_size,
            record_epoch_nanos: raw.record_epoch_nanos,
            content_ext: raw.content_ext,
        }
    }
}
