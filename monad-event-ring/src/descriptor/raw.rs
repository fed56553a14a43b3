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

use std::sync::atomic::AtomicU64;

/// Descriptor for a single event; this fixed-size object describes the common
/// attributes of an event, and is broadcast to other threads via a shared
/// memory ring buffer (the threads are potentially in different processes).
/// The variably-sized extra content of the event (specific to each event
/// type) is called the "event payload"; it lives in a shared memory segment
/// called the "payload buffer", and can be accessed using this descriptor.
///
/// The struct is exactly one 64-byte cache line; `seqno` occupies the first
/// eight bytes and is the atomic publication witness: slots in the ring hold
/// `seqno == 0` until the first event is published into them.
#[repr(C, align(64))]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RawEventDescriptor {
    /// Sequence number, for gap/liveness checks; 1-based, 0 means the slot
    /// was never written.
    pub seqno: u64,
    /// What kind of event this is, within the ring's content type namespace.
    pub event_type: u16,
    /// Unused tail padding; reserved zero.
    pub reserved: u16,
    /// Size of the event payload in bytes.
    pub payload_size: u32,
    /// Wall-clock time the event was recorded, in nanoseconds since the
    /// Unix epoch.
    pub record_epoch_nanos: u64,
    /// Unwrapped offset of the payload in the payload buffer.
    pub payload_buf_offset: u64,
    /// Extension fields for particular content types.
    pub content_ext: [u64; 4],
}

const _: () = assert!(std::mem::size_of::<RawEventDescriptor>() == 64);
const _: () = assert!(std::mem::align_of::<RawEventDescriptor>() == 64);

impl RawEventDescriptor {
    /// Atomic view of a shared-memory slot's `seqno` field.
    ///
    /// Only meaningful for descriptors resident in the ring's descriptor
    /// array; local copies are read through the plain field.
    pub(crate) fn seqno_atomic(&self) -> &AtomicU64 {
        // seqno is the first field of a 64-byte-aligned struct.
        unsafe { AtomicU64::from_ptr((&self.seqno as *const u64).cast_mut()) }
    }
}
