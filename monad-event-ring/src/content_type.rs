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

//! The content type registry and the reserved record-error event payload.
//!
//! Each ring declares exactly one content type, which names the integer
//! namespace the descriptor's `event_type` field is drawn from. In every
//! namespace, `event_type` 0 is invalid and `event_type` 1 is a
//! `RECORD_ERROR` event carrying a [`RecordError`] payload.

/// Describes what kind of event content is recorded in an event ring file;
/// different categories of events have different binary schemas, and this
/// identifies the integer namespace that the descriptor's `u16 event_type`
/// field is drawn from.
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EventContentType {
    /// An invalid value.
    None = 0,
    /// Used in simple automated tests.
    Test = 1,
    /// Core execution events.
    Exec = 2,
}

/// Total number of known content types.
pub const EVENT_CONTENT_TYPE_COUNT: u16 = 3;

impl EventContentType {
    /// Human-readable name, as it appears in diagnostics and tooling.
    pub fn as_str(self) -> &'static str {
        match self {
            EventContentType::None => "none",
            EventContentType::Test => "test",
            EventContentType::Exec => "exec",
        }
    }

    /// Decodes the `content_type` tag of a ring header.
    pub fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(EventContentType::None),
            1 => Some(EventContentType::Test),
            2 => Some(EventContentType::Exec),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In any content namespace, the event type with this code is a record-error
/// event whose payload is a [`RecordError`].
pub const EVENT_TYPE_RECORD_ERROR: u16 = 1;

/// Kind of recording error that occurred.
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecordErrorType {
    /// No error.
    None = 0,
    /// Payload size overflows `u32::MAX`.
    Overflow4Gb = 1,
    /// Payload so large it would expire before publication.
    OverflowExpire = 2,
    /// An expected event from a peer is missing.
    MissingEvent = 3,
}

impl RecordErrorType {
    /// Decodes the `error_type` field of a [`RecordError`] payload.
    pub fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(RecordErrorType::None),
            1 => Some(RecordErrorType::Overflow4Gb),
            2 => Some(RecordErrorType::OverflowExpire),
            3 => Some(RecordErrorType::MissingEvent),
            _ => None,
        }
    }
}

/// Payload of a record-error event, describing an error that occurred while
/// recording another event. Shared-memory resident.
#[repr(C, align(16))]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RecordError {
    /// Kind of recording error that occurred; a [`RecordErrorType`] code.
    pub error_type: u16,
    /// What kind of event was discarded.
    pub dropped_event_type: u16,
    /// Size of the truncated trailing payload, if any.
    pub truncated_payload_size: u32,
    /// Untruncated size of the discarded event's payload.
    pub requested_payload_size: u64,
}

const _: () = assert!(std::mem::size_of::<RecordError>() == 16);

impl RecordError {
    /// Decodes a record-error payload from the leading bytes of an event
    /// payload; returns `None` if the payload is too short to contain one.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() < std::mem::size_of::<Self>() {
            return None;
        }
        // The payload buffer extent is at least 16-byte aligned, but the
        // caller may hand us a copied slice, so read unaligned.
        Some(unsafe { std::ptr::read_unaligned(payload.as_ptr().cast::<Self>()) })
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                (self as *const Self).cast::<u8>(),
                std::mem::size_of::<Self>(),
            )
        }
    }
}
