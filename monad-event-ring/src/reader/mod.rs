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

pub(crate) use self::raw::RawEventReader;
use crate::{EventDecoder, EventDescriptor, EventNextResult, EventPayloadResult};

mod raw;

/// Used to consume events from an [`EventRing`](crate::EventRing).
///
/// Created by [`TypedEventRing::create_reader`](crate::TypedEventRing::create_reader).
/// Multiple readers over one ring iterate independently; each reader is
/// single threaded.
pub struct EventReader<'ring, D>
where
    D: EventDecoder,
{
    raw: RawEventReader<'ring>,
    _phantom: PhantomData<D>,
}

impl<'ring, D> EventReader<'ring, D>
where
    D: EventDecoder,
{
    pub(crate) fn new(raw: RawEventReader<'ring>) -> Self {
        Self {
            raw,
            _phantom: PhantomData,
        }
    }

    /// A reader positioned before the first event ever recorded, so a static
    /// ring image is replayed from the beginning.
    pub(crate) fn new_snapshot(mut raw: RawEventReader<'ring>) -> Self {
        raw.read_last_seqno = 0;

        Self {
            raw,
            _phantom: PhantomData,
        }
    }

    /// Produces the next event in the ring.
    pub fn next_descriptor(&mut self) -> EventNextResult<EventDescriptor<'ring, D>> {
        let ring = self.raw.ring;
        self.raw
            .next_descriptor()
            .map(|raw_descriptor| EventDescriptor::new(ring, raw_descriptor))
    }

    /// Convenience wrapper around [`next_descriptor`](Self::next_descriptor)
    /// followed by [`EventDescriptor::try_read`].
    pub fn next_event(&mut self) -> EventNextResult<EventPayloadResult<D::Event>> {
        self.next_descriptor()
            .map(|event_descriptor| event_descriptor.try_read())
    }

    /// Resets the reader to the latest event in the ring, abandoning
    /// everything between its current position and the writer's; used to
    /// restart after an [`EventNextResult::Gap`]. Returns the new position.
    pub fn reset(&mut self) -> u64 {
        self.raw.reset()
    }

    /// The last sequence number this reader consumed.
    pub fn last_read_seqno(&self) -> u64 {
        self.raw.read_last_seqno
    }

    /// Number of events currently ready for consumption.
    pub fn available(&self) -> u64 {
        self.raw.available()
    }
}
