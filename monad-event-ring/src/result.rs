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

/// The result of attempting to retrieve the next event from an
/// [`EventRing`](crate::EventRing).
#[derive(Debug)]
pub enum EventNextResult<T> {
    /// The next event is available and produced through `T`; the reader has
    /// advanced past it.
    Ready(T),

    /// The next event has not been produced yet; the reader is unchanged.
    NotReady,

    /// The next event was overwritten before this reader consumed it; the
    /// reader is unchanged until [`reset`](crate::EventReader::reset).
    ///
    /// Receiving this variant is a strong indicator that downstream
    /// consumers must switch to a recovery phase to backfill the data lost
    /// from the missing events. Everything in
    /// `[last_read_seqno + 1, last_write_seqno]` that the reader has not yet
    /// seen is unrecoverable from the ring.
    Gap {
        /// The last sequence number this reader consumed.
        last_read_seqno: u64,
        /// The writer's most recently reserved sequence number at the time
        /// the gap was detected.
        last_write_seqno: u64,
    },
}

impl<T> EventNextResult<T> {
    pub(crate) fn map<U>(self, f: impl FnOnce(T) -> U) -> EventNextResult<U> {
        match self {
            EventNextResult::Ready(value) => EventNextResult::Ready(f(value)),
            EventNextResult::NotReady => EventNextResult::NotReady,
            EventNextResult::Gap {
                last_read_seqno,
                last_write_seqno,
            } => EventNextResult::Gap {
                last_read_seqno,
                last_write_seqno,
            },
        }
    }
}

/// The result of attempting to read the payload of an
/// [`EventDescriptor`](crate::EventDescriptor).
#[derive(Debug, PartialEq, Eq)]
pub enum EventPayloadResult<T> {
    /// The payload was retrieved before ring wrap-around reclaimed it.
    Payload(T),

    /// The payload bytes were overwritten while reading them; whatever was
    /// read is invalid and must be discarded.
    Expired,
}

impl<T> EventPayloadResult<T> {
    /// Maps the [`Payload`](EventPayloadResult::Payload) variant to another
    /// type using the provided lambda.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> EventPayloadResult<U> {
        match self {
            EventPayloadResult::Payload(payload) => EventPayloadResult::Payload(f(payload)),
            EventPayloadResult::Expired => EventPayloadResult::Expired,
        }
    }

    /// Converts into an `Option`, discarding the expiration distinction.
    pub fn into_option(self) -> Option<T> {
        match self {
            EventPayloadResult::Payload(payload) => Some(payload),
            EventPayloadResult::Expired => None,
        }
    }
}
