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

//! The writer side of an event ring.
//!
//! There is exactly one producer per ring. Recording is a two-phase
//! reservation protocol with no heap allocation and no suspension points:
//!
//! 1. [`EventRecorder::reserve`] claims the next descriptor slot and a
//!    payload extent, invalidates the slot, fills the descriptor body, and
//!    hands back an [`EventReservation`] whose span the caller fills.
//! 2. [`EventReservation::commit`] publishes the event by storing the
//!    sequence number into the slot with release ordering; that store is the
//!    linearization point of the event.
//!
//! Events that cannot be recorded (oversized payloads) are never reported to
//! the caller as errors; a `RECORD_ERROR` event is published in their place
//! so downstream consumers can account for the loss in-band.

use std::{
    marker::PhantomData,
    sync::atomic::Ordering,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{
    content_type::EVENT_TYPE_RECORD_ERROR,
    layout::{PAYLOAD_ALIGN, WINDOW_INCR},
    ring::RawEventRing,
    EventRingError, RawEventDescriptor, RecordError, RecordErrorType,
};

/// Single-producer writer for an event ring.
///
/// The ring admits exactly one recorder across all processes that map it;
/// enforcing that is the creator's responsibility (see
/// [`util::find_fd_writer_pids`](crate::util::find_fd_writer_pids) for the
/// discovery side). Within a process the `&mut self` receivers make the
/// writer's reservation steps total-ordered.
#[derive(Debug)]
pub struct EventRecorder<'ring> {
    ring: &'ring RawEventRing,
    descriptors: *mut RawEventDescriptor,
    payload_buf: *mut u8,
    desc_capacity_mask: u64,
    payload_buf_size: u64,
    payload_buf_mask: u64,
}

unsafe impl Send for EventRecorder<'_> {}

impl<'ring> EventRecorder<'ring> {
    pub(crate) fn new(ring: &'ring RawEventRing) -> Result<Self, EventRingError> {
        ring.check_prot(libc::PROT_READ | libc::PROT_WRITE, "recording")?;
        let size = ring.size();
        Ok(Self {
            ring,
            descriptors: ring.descriptors_mut_ptr(),
            payload_buf: ring.payload_buf_mut_ptr(),
            desc_capacity_mask: ring.desc_capacity_mask(),
            payload_buf_size: size.payload_buf_size,
            payload_buf_mask: ring.payload_buf_mask(),
        })
    }

    /// Reserves a descriptor slot and a payload extent for an event with a
    /// `payload_size`-byte payload. The caller fills the reservation's
    /// payload span, then commits it.
    ///
    /// Returns `None` if the event cannot be recorded; a `RECORD_ERROR`
    /// event has then been published in its place and the original event
    /// must be considered dropped.
    pub fn reserve(
        &mut self,
        event_type: u16,
        payload_size: usize,
        content_ext: [u64; 4],
    ) -> Option<EventReservation<'_>> {
        // Rejections happen before any allocation so a dropped event does
        // not consume payload buffer space or advance the window.
        if payload_size > u32::MAX as usize {
            self.emit_record_error(
                RecordErrorType::Overflow4Gb,
                event_type,
                payload_size as u64,
            );
            return None;
        }
        if payload_size as u64 >= self.payload_buf_size - WINDOW_INCR {
            // The window would slide past this payload before it could be
            // published.
            self.emit_record_error(
                RecordErrorType::OverflowExpire,
                event_type,
                payload_size as u64,
            );
            return None;
        }
        Some(self.reserve_unchecked(event_type, payload_size, content_ext))
    }

    /// Records a complete event: reserve, copy `payload`, commit. Returns
    /// the sequence number of the published event; if the event was dropped,
    /// this is the sequence number of the `RECORD_ERROR` event published in
    /// its place.
    pub fn record(&mut self, event_type: u16, content_ext: [u64; 4], payload: &[u8]) -> u64 {
        match self.try_record(event_type, content_ext, payload) {
            Some(seqno) => seqno,
            None => self.last_seqno(),
        }
    }

    fn try_record(
        &mut self,
        event_type: u16,
        content_ext: [u64; 4],
        payload: &[u8],
    ) -> Option<u64> {
        let mut reservation = self.reserve(event_type, payload.len(), content_ext)?;
        reservation.payload_mut().copy_from_slice(payload);
        Some(reservation.commit())
    }

    /// Publishes a `RECORD_ERROR` event. Recording failures inside the
    /// reservation path use this internally; higher layers call it to
    /// surface `MISSING_EVENT` conditions in-band.
    pub fn record_error(
        &mut self,
        error_type: RecordErrorType,
        dropped_event_type: u16,
        requested_payload_size: u64,
    ) -> u64 {
        let payload = RecordError {
            error_type: error_type as u16,
            dropped_event_type,
            // No payload bytes exist at reservation time, so nothing is
            // preserved of the dropped event.
            truncated_payload_size: 0,
            requested_payload_size,
        };
        let mut reservation = self.reserve_unchecked(
            EVENT_TYPE_RECORD_ERROR,
            std::mem::size_of::<RecordError>(),
            [0; 4],
        );
        reservation.payload_mut().copy_from_slice(payload.as_bytes());
        reservation.commit()
    }

    /// The most recently reserved sequence number.
    pub fn last_seqno(&self) -> u64 {
        self.ring
            .control()
            .last_seqno_atomic()
            .load(Ordering::Relaxed)
    }

    fn emit_record_error(
        &mut self,
        error_type: RecordErrorType,
        dropped_event_type: u16,
        requested_payload_size: u64,
    ) {
        let seqno = self.record_error(error_type, dropped_event_type, requested_payload_size);
        tracing::warn!(
            ring = %self.ring.name(),
            seqno,
            ?error_type,
            dropped_event_type,
            requested_payload_size,
            "event dropped; record error published"
        );
    }

    fn reserve_unchecked(
        &mut self,
        event_type: u16,
        payload_size: usize,
        content_ext: [u64; 4],
    ) -> EventReservation<'_> {
        let control = self.ring.control();

        let seqno = control.last_seqno_atomic().fetch_add(1, Ordering::Relaxed) + 1;
        let slot_index = (seqno - 1) & self.desc_capacity_mask;
        let slot = unsafe { self.descriptors.add(slot_index as usize) };

        // Invalidate the slot before rewriting it, so a concurrent try_copy
        // of the previous occupant fails its seqno re-check instead of
        // returning a torn descriptor.
        unsafe { (*slot).seqno_atomic().store(0, Ordering::Release) };

        let next_byte = control.next_payload_byte_atomic();
        let base = next_byte.load(Ordering::Relaxed);
        let payload_buf_offset = (base + PAYLOAD_ALIGN - 1) & !(PAYLOAD_ALIGN - 1);
        let payload_end = payload_buf_offset + payload_size as u64;
        next_byte.store(payload_end, Ordering::Relaxed);

        // Advance the expiration floor once per WINDOW_INCR of payload
        // production, before any byte of the new extent is written; the
        // extra increment keeps the floor ahead of the writer until the next
        // boundary crossing.
        if payload_end / WINDOW_INCR > payload_buf_offset / WINDOW_INCR {
            let new_window = (payload_end + WINDOW_INCR).saturating_sub(self.payload_buf_size);
            let window = control.buffer_window_start_atomic();
            if new_window > window.load(Ordering::Relaxed) {
                window.store(new_window, Ordering::Release);
            }
        }

        unsafe {
            (*slot).event_type = event_type;
            (*slot).reserved = 0;
            (*slot).payload_size = payload_size as u32;
            (*slot).record_epoch_nanos = epoch_nanos();
            (*slot).payload_buf_offset = payload_buf_offset;
            (*slot).content_ext = content_ext;
        }

        let payload = unsafe {
            self.payload_buf
                .add((payload_buf_offset & self.payload_buf_mask) as usize)
        };
        EventReservation {
            slot,
            payload,
            payload_len: payload_size,
            seqno,
            _recorder: PhantomData,
        }
    }
}

/// An event slot reserved by [`EventRecorder::reserve`], waiting for its
/// payload bytes.
///
/// The reservation publishes its event when committed or dropped; there is
/// no way to cancel a reservation, because the descriptor slot and payload
/// extent are already consumed. Dropping without filling the span publishes
/// whatever bytes the extent holds, which readers must tolerate like any
/// other payload bytes.
#[must_use]
#[derive(Debug)]
pub struct EventReservation<'rec> {
    slot: *mut RawEventDescriptor,
    payload: *mut u8,
    payload_len: usize,
    seqno: u64,
    _recorder: PhantomData<&'rec mut ()>,
}

impl EventReservation<'_> {
    /// The sequence number this event will publish as.
    pub fn seqno(&self) -> u64 {
        self.seqno
    }

    /// The payload span to fill; lives in shared memory.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.payload, self.payload_len) }
    }

    /// Publishes the event and returns its sequence number.
    pub fn commit(self) -> u64 {
        let seqno = self.seqno;
        drop(self);
        seqno
    }
}

impl Drop for EventReservation<'_> {
    fn drop(&mut self) {
        // Publication: the release store makes every prior descriptor and
        // payload write visible to any reader that observes this seqno.
        unsafe {
            (*self.slot)
                .seqno_atomic()
                .store(self.seqno, Ordering::Release)
        };
    }
}

fn epoch_nanos() -> u64 {
    // CLOCK_REALTIME, as pinned in the schema documentation; a ring is
    // host-local, so wall-clock jumps are a consumer concern, not a
    // correctness one.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}
