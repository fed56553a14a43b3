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

//! Byte layout of an event ring: size limits, the size structure, and the
//! file offsets of the ring's sections.
//!
//! A ring file (or a ring region within a larger file) is laid out as:
//!
//! ```text
//! +-------------------------+  ring start (must be page aligned)
//! | header (one large page) |
//! +-------------------------+  +2 MiB
//! | descriptor array        |  descriptor_capacity * 64 bytes
//! +-------------------------+
//! | payload buffer          |  payload_buf_size bytes
//! +-------------------------+
//! | context area            |  context_area_size bytes
//! +-------------------------+
//! ```
//!
//! Every section size within the legal shift ranges is a large-page multiple,
//! so each section is large-page aligned whenever the ring start is. When the
//! ring is mapped, the payload buffer section is mapped twice back-to-back
//! (see `ring::raw`), so the in-memory span exceeds the file storage by one
//! payload buffer size.

use crate::error::{bail, EventRingError};

/// Magic/version octets at the start of every event ring file; the last two
/// bytes are the version digits and change on any binary-incompatible layout
/// change.
pub const RING_HEADER_VERSION: [u8; 6] = *b"RING01";

/// Smallest legal power-of-two exponent for the descriptor array capacity.
pub const MIN_DESCRIPTORS_SHIFT: u8 = 16;
/// Largest legal power-of-two exponent for the descriptor array capacity.
pub const MAX_DESCRIPTORS_SHIFT: u8 = 32;

/// Smallest legal power-of-two exponent for the payload buffer size.
pub const MIN_PAYLOAD_BUF_SHIFT: u8 = 27;
/// Largest legal power-of-two exponent for the payload buffer size.
pub const MAX_PAYLOAD_BUF_SHIFT: u8 = 40;

/// Sliding payload window advancement increment; the writer republishes the
/// expiration floor only when a payload allocation crosses a boundary of this
/// size.
pub const WINDOW_INCR: u64 = 1 << 24;

/// Payload buffer extents are aligned to this many bytes.
pub const PAYLOAD_ALIGN: u64 = 16;

/// The large page size the layout is aligned to (x86-64 2 MiB huge page).
pub const LARGE_PAGE_SIZE: u64 = 1 << 21;

/// Describes the size of an event ring's primary data structures.
///
/// This structure is shared-memory resident: it is embedded in the ring
/// header exactly as laid out here.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventRingSize {
    /// Number of entries in the event descriptor array; a power of two.
    pub descriptor_capacity: u64,
    /// Byte size of the payload buffer; a power of two.
    pub payload_buf_size: u64,
    /// Byte size of the context area section; a large-page multiple.
    pub context_area_size: u64,
}

impl EventRingSize {
    /// Returns an initialized size structure, after checking the shifts
    /// against the valid size limits; a "shift" is the power-of-2 exponent
    /// for a size.
    pub fn from_shifts(
        descriptors_shift: u8,
        payload_buf_shift: u8,
        context_large_pages: u16,
    ) -> Result<Self, EventRingError> {
        if !(MIN_DESCRIPTORS_SHIFT..=MAX_DESCRIPTORS_SHIFT).contains(&descriptors_shift) {
            return bail(EventRingError::InvalidSize(format!(
                "descriptors shift {descriptors_shift} outside \
                 [{MIN_DESCRIPTORS_SHIFT}, {MAX_DESCRIPTORS_SHIFT}]"
            )));
        }
        if !(MIN_PAYLOAD_BUF_SHIFT..=MAX_PAYLOAD_BUF_SHIFT).contains(&payload_buf_shift) {
            return bail(EventRingError::InvalidSize(format!(
                "payload buffer shift {payload_buf_shift} outside \
                 [{MIN_PAYLOAD_BUF_SHIFT}, {MAX_PAYLOAD_BUF_SHIFT}]"
            )));
        }
        Ok(Self {
            descriptor_capacity: 1 << descriptors_shift,
            payload_buf_size: 1 << payload_buf_shift,
            context_area_size: u64::from(context_large_pages) * LARGE_PAGE_SIZE,
        })
    }

    /// Checks a size structure read back from a file against the same limits
    /// `from_shifts` enforces.
    pub(crate) fn check(&self, name: &str) -> Result<(), EventRingError> {
        let desc_ok = self.descriptor_capacity.is_power_of_two()
            && (MIN_DESCRIPTORS_SHIFT..=MAX_DESCRIPTORS_SHIFT)
                .contains(&(self.descriptor_capacity.trailing_zeros() as u8));
        let buf_ok = self.payload_buf_size.is_power_of_two()
            && (MIN_PAYLOAD_BUF_SHIFT..=MAX_PAYLOAD_BUF_SHIFT)
                .contains(&(self.payload_buf_size.trailing_zeros() as u8));
        let ctx_ok = self.context_area_size % LARGE_PAGE_SIZE == 0;
        if !(desc_ok && buf_ok && ctx_ok) {
            return bail(EventRingError::InvalidSize(format!(
                "`{name}`: size structure out of bounds: {self:?}"
            )));
        }
        Ok(())
    }

    /// Total number of bytes needed to store this ring in a file; used to
    /// `ftruncate(2)` a file range large enough before calling `init_file`.
    pub fn total_storage(&self) -> u64 {
        let layout = self.layout();
        layout.file_storage
    }

    pub(crate) fn layout(&self) -> RingLayout {
        let descriptors_offset = LARGE_PAGE_SIZE;
        let payload_buf_offset = descriptors_offset + self.descriptor_capacity * 64;
        let context_area_offset = payload_buf_offset + self.payload_buf_size;
        let file_storage = context_area_offset + self.context_area_size;
        RingLayout {
            descriptors_offset,
            payload_buf_offset,
            context_area_offset,
            file_storage,
            // The payload buffer is mapped twice.
            map_span: file_storage + self.payload_buf_size,
        }
    }
}

/// File offsets of the ring's sections, relative to the ring's start offset.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RingLayout {
    pub descriptors_offset: u64,
    pub payload_buf_offset: u64,
    pub context_area_offset: u64,
    pub file_storage: u64,
    pub map_span: u64,
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(16, 27, 0 => true; "minimum shifts")]
    #[test_case(32, 40, 1 => true; "maximum shifts")]
    #[test_case(20, 30, 4 => true; "mid range")]
    #[test_case(15, 27, 0 => false; "descriptors shift too small")]
    #[test_case(33, 27, 0 => false; "descriptors shift too large")]
    #[test_case(16, 26, 0 => false; "payload shift too small")]
    #[test_case(16, 41, 0 => false; "payload shift too large")]
    fn shift_bounds(desc: u8, buf: u8, ctx: u16) -> bool {
        EventRingSize::from_shifts(desc, buf, ctx).is_ok()
    }

    #[test]
    fn storage_arithmetic() {
        let size = EventRingSize::from_shifts(16, 27, 2).unwrap();
        assert_eq!(size.descriptor_capacity, 1 << 16);
        assert_eq!(size.payload_buf_size, 1 << 27);
        assert_eq!(size.context_area_size, 2 * LARGE_PAGE_SIZE);

        let layout = size.layout();
        assert_eq!(layout.descriptors_offset, LARGE_PAGE_SIZE);
        assert_eq!(
            layout.payload_buf_offset,
            LARGE_PAGE_SIZE + (1 << 16) * 64
        );
        assert_eq!(
            size.total_storage(),
            LARGE_PAGE_SIZE + (1 << 16) * 64 + (1 << 27) + 2 * LARGE_PAGE_SIZE
        );
        assert_eq!(layout.map_span, layout.file_storage + (1 << 27));

        // Every section lands on a large page boundary.
        for off in [
            layout.descriptors_offset,
            layout.payload_buf_offset,
            layout.context_area_offset,
        ] {
            assert_eq!(off % LARGE_PAGE_SIZE, 0);
        }
    }

    #[test]
    fn invalid_size_sets_last_error() {
        assert!(EventRingSize::from_shifts(1, 27, 0).is_err());
        assert!(crate::last_error().contains("descriptors shift"));
    }
}
