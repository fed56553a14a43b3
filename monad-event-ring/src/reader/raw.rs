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

use std::{hint, ptr, sync::atomic::Ordering};

use crate::{ring::RawEventRing, EventNextResult, EventRingError, RawEventDescriptor};

/// Iterator state of a single event ring consumer.
///
/// Readers are lightweight and an arbitrary number may exist per ring, each
/// iterating independently, but each one is single threaded. This has a
/// polling style rather than implementing `Iterator`: `next_descriptor` can
/// report "not produced yet" and "overwritten before consumption" in
/// addition to producing an event.
#[derive(Debug)]
pub(crate) struct RawEventReader<'ring> {
    /// The last sequence number this reader consumed; the next call to
    /// [`next_descriptor`](Self::next_descriptor) attempts `read_last_seqno + 1`.
    pub(crate) read_last_seqno: u64,
    pub(crate) ring: &'ring RawEventRing,
}

impl<'ring> RawEventReader<'ring> {
    /// Positions a new reader at the most recently produced event: events
    /// recorded after this call will be observed, events before it will not.
    pub(crate) fn new(ring: &'ring RawEventRing) -> Result<Self, EventRingError> {
        ring.check_prot(libc::PROT_READ, "reading")?;
        let read_last_seqno = ring.control().last_seqno_atomic().load(Ordering::Acquire);
        Ok(Self {
            read_last_seqno,
            ring,
        })
    }

    /// Copies the next event descriptor and advances the reader, if the next
    /// event is available and no sequence number gap has occurred.
    #[inline]
    pub(crate) fn next_descriptor(&mut self) -> EventNextResult<RawEventDescriptor> {
        let next_seqno = self.read_last_seqno + 1;
        let slot = self.ring.descriptor_slot(next_seqno);
        let slot_seqno = slot.seqno_atomic().load(Ordering::Acquire);
        if slot_seqno == next_seqno {
            // Seqlock-style copy: the acquire load above orders the copy
            // after publication, and the re-check below detects the recorder
            // reclaiming the slot mid-copy (it zeroes seqno first).
            let copied = unsafe { ptr::read_volatile(slot as *const RawEventDescriptor) };
            if slot.seqno_atomic().load(Ordering::Acquire) == next_seqno {
                self.read_last_seqno = next_seqno;
                return EventNextResult::Ready(copied);
            }
            return self.gap();
        }
        if slot_seqno < next_seqno {
            // The slot still holds a previous lap (or was never written).
            EventNextResult::NotReady
        } else {
            self.gap()
        }
    }

    #[cold]
    fn gap(&self) -> EventNextResult<RawEventDescriptor> {
        EventNextResult::Gap {
            last_read_seqno: self.read_last_seqno,
            last_write_seqno: self
                .ring
                .control()
                .last_seqno_atomic()
                .load(Ordering::Acquire),
        }
    }

    /// Repositions the reader at the most recently produced event; used for
    /// "hard" gap recovery. Returns the new cursor position.
    pub(crate) fn reset(&mut self) -> u64 {
        let write_last_seqno = self
            .ring
            .control()
            .last_seqno_atomic()
            .load(Ordering::Acquire);
        if write_last_seqno == 0 {
            self.read_last_seqno = 0;
            return 0;
        }
        // `last_seqno` is incremented at reservation time, before the slot's
        // contents are rewritten; wait for the publication store so the next
        // `next_descriptor` call starts from a committed event.
        let slot = self.ring.descriptor_slot(write_last_seqno);
        while slot.seqno_atomic().load(Ordering::Acquire) < write_last_seqno {
            hint::spin_loop();
        }
        self.read_last_seqno = write_last_seqno;
        write_last_seqno
    }

    /// Number of descriptors the writer has reserved beyond this reader's
    /// position.
    pub(crate) fn available(&self) -> u64 {
        self.ring
            .control()
            .last_seqno_atomic()
            .load(Ordering::Acquire)
            .saturating_sub(self.read_last_seqno)
    }
}

unsafe impl Send for RawEventReader<'_> {}
