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

use std::{io, ptr, sync::atomic::AtomicU64};

use libc::{c_int, c_void, off_t};

use crate::{
    error::{bail, EventRingError},
    layout::{RingLayout, LARGE_PAGE_SIZE, RING_HEADER_VERSION},
    EventContentType, EventRingSize, RawEventDescriptor,
};

/// Control registers of the event ring; resource allocation within an event
/// ring, i.e., the reserving of an event descriptor slot and payload buffer
/// space to record an event, is tracked using this object.
///
/// `last_seqno` and `next_payload_byte` share the writer-owned cache line;
/// `buffer_window_start` sits on its own line because every reader polls it.
#[repr(C, align(64))]
pub struct RingControl {
    /// Last sequence number allocated by the writer.
    pub last_seqno: u64,
    /// Next unwrapped payload buffer byte to allocate.
    pub next_payload_byte: u64,
    _pad: [u8; 48],
    /// Lowest unwrapped payload buffer offset still valid for readers.
    pub buffer_window_start: u64,
}

const _: () = assert!(std::mem::size_of::<RingControl>() == 128);

impl RingControl {
    pub(crate) fn last_seqno_atomic(&self) -> &AtomicU64 {
        unsafe { AtomicU64::from_ptr((&self.last_seqno as *const u64).cast_mut()) }
    }

    pub(crate) fn next_payload_byte_atomic(&self) -> &AtomicU64 {
        unsafe { AtomicU64::from_ptr((&self.next_payload_byte as *const u64).cast_mut()) }
    }

    pub(crate) fn buffer_window_start_atomic(&self) -> &AtomicU64 {
        unsafe { AtomicU64::from_ptr((&self.buffer_window_start as *const u64).cast_mut()) }
    }
}

/// Event ring shared memory files start with this header structure.
#[repr(C)]
pub struct RingHeader {
    /// `RINGvv`, `vv` = version octets.
    pub magic: [u8; 6],
    /// Kind of events in this ring; an [`EventContentType`] code.
    pub content_type: u16,
    /// Pinned schema hash; ensures event definitions match across processes.
    pub schema_hash: [u8; 32],
    /// Size of the following structures.
    pub size: EventRingSize,
    /// Tracks the ring's allocation state.
    pub control: RingControl,
}

const _: () = assert!(std::mem::size_of::<RingHeader>() == 192);
// The control block must begin at byte 64 so that `buffer_window_start`
// lands on its own cache line at byte 128.
const _: () = assert!(std::mem::offset_of!(RingHeader, size) == 40);
const _: () = assert!(std::mem::offset_of!(RingHeader, control) == 64);

/// A shared memory event ring that has been mapped into the address space of
/// the current process.
///
/// The payload buffer section is mapped twice, back-to-back, so that a
/// payload extent crossing the physical wrap point is still contiguous in
/// virtual memory; both the writer's copy-in and the readers' zero-copy peek
/// rely on this.
#[derive(Debug)]
pub struct RawEventRing {
    name: String,
    mmap_prot: c_int,
    map_base: *mut c_void,
    map_span: usize,
    header: *const RingHeader,
    descriptors: *const RawEventDescriptor,
    payload_buf: *const u8,
    context_area: *mut c_void,
    desc_capacity_mask: u64,
    payload_buf_mask: u64,
}

unsafe impl Send for RawEventRing {}
unsafe impl Sync for RawEventRing {}

fn io_error<T>(name: &str, op: &'static str) -> Result<T, EventRingError> {
    bail(EventRingError::Io {
        name: name.to_owned(),
        op,
        source: io::Error::last_os_error(),
    })
}

fn file_region_len(ring_fd: c_int, name: &str) -> Result<u64, EventRingError> {
    let mut stat = std::mem::MaybeUninit::<libc::stat>::uninit();
    if unsafe { libc::fstat(ring_fd, stat.as_mut_ptr()) } == -1 {
        return io_error(name, "fstat(2)");
    }
    Ok(unsafe { stat.assume_init() }.st_size as u64)
}

fn check_ring_offset(ring_offset: off_t, name: &str) -> Result<u64, EventRingError> {
    if ring_offset < 0 || ring_offset as u64 % LARGE_PAGE_SIZE != 0 {
        return bail(EventRingError::BadFile {
            name: name.to_owned(),
            reason: format!("ring offset {ring_offset} is not large page aligned"),
        });
    }
    Ok(ring_offset as u64)
}

/// mmap(2) one file region, optionally at a fixed address inside an already
/// reserved span.
unsafe fn map_region(
    addr: *mut c_void,
    len: u64,
    prot: c_int,
    flags: c_int,
    fd: c_int,
    offset: u64,
    name: &str,
) -> Result<*mut c_void, EventRingError> {
    let p = libc::mmap(addr, len as usize, prot, flags, fd, offset as off_t);
    if p == libc::MAP_FAILED {
        return io_error(name, "mmap(2)");
    }
    Ok(p)
}

impl RawEventRing {
    /// Given an open file descriptor which contains an initialized event ring
    /// at `ring_offset`, mmap the event ring into our address space;
    /// `mmap_extra_flags` is OR'ed with `MAP_SHARED` to produce the final
    /// flags.
    pub fn mmap_from_fd(
        mmap_prot: c_int,
        mmap_extra_flags: c_int,
        ring_fd: c_int,
        ring_offset: off_t,
        error_name: &str,
    ) -> Result<Self, EventRingError> {
        let ring_start = check_ring_offset(ring_offset, error_name)?;

        let file_len = file_region_len(ring_fd, error_name)?;
        if file_len < ring_start + LARGE_PAGE_SIZE {
            return bail(EventRingError::BadFile {
                name: error_name.to_owned(),
                reason: format!(
                    "file length {file_len} cannot hold a ring header at offset {ring_start}"
                ),
            });
        }

        // Map the header section alone first: the section offsets of the rest
        // of the ring are not known until the size structure is validated.
        let header_probe = unsafe {
            map_region(
                ptr::null_mut(),
                LARGE_PAGE_SIZE,
                libc::PROT_READ,
                libc::MAP_SHARED,
                ring_fd,
                ring_start,
                error_name,
            )?
        };
        let (size, layout) = {
            let header = unsafe { &*header_probe.cast::<RingHeader>() };
            let result = Self::check_header(header, error_name);
            unsafe { libc::munmap(header_probe, LARGE_PAGE_SIZE as usize) };
            result?
        };

        if file_len < ring_start + layout.file_storage {
            return bail(EventRingError::BadFile {
                name: error_name.to_owned(),
                reason: format!(
                    "file length {file_len} smaller than ring storage {} at offset {ring_start}",
                    layout.file_storage
                ),
            });
        }

        // Reserve one contiguous span of address space, then overlay the
        // file sections onto it with MAP_FIXED. The payload buffer section is
        // overlaid twice (mirror mapping).
        let map_span = layout.map_span as usize;
        let base = unsafe {
            map_region(
                ptr::null_mut(),
                layout.map_span,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
                error_name,
            )?
        };

        let flags = libc::MAP_SHARED | libc::MAP_FIXED | mmap_extra_flags;
        let sections: [(u64, u64, u64); 4] = [
            // (span offset, length, file offset)
            (0, layout.payload_buf_offset, ring_start),
            (
                layout.payload_buf_offset,
                size.payload_buf_size,
                ring_start + layout.payload_buf_offset,
            ),
            (
                layout.payload_buf_offset + size.payload_buf_size,
                size.payload_buf_size,
                ring_start + layout.payload_buf_offset,
            ),
            (
                layout.payload_buf_offset + 2 * size.payload_buf_size,
                size.context_area_size,
                ring_start + layout.context_area_offset,
            ),
        ];
        for (span_offset, len, file_offset) in sections {
            if len == 0 {
                continue;
            }
            let addr = unsafe { base.cast::<u8>().add(span_offset as usize) }.cast::<c_void>();
            if let Err(e) =
                unsafe { map_region(addr, len, mmap_prot, flags, ring_fd, file_offset, error_name) }
            {
                unsafe { libc::munmap(base, map_span) };
                return Err(e);
            }
        }

        let header = base.cast::<RingHeader>();
        let ring = Self {
            name: error_name.to_owned(),
            mmap_prot,
            map_base: base,
            map_span,
            header,
            descriptors: unsafe {
                base.cast::<u8>()
                    .add(layout.descriptors_offset as usize)
                    .cast::<RawEventDescriptor>()
            },
            payload_buf: unsafe { base.cast::<u8>().add(layout.payload_buf_offset as usize) },
            context_area: unsafe {
                base.cast::<u8>()
                    .add((layout.payload_buf_offset + 2 * size.payload_buf_size) as usize)
                    .cast::<c_void>()
            },
            desc_capacity_mask: size.descriptor_capacity - 1,
            payload_buf_mask: size.payload_buf_size - 1,
        };
        tracing::debug!(
            name = %ring.name,
            descriptor_capacity = size.descriptor_capacity,
            payload_buf_size = size.payload_buf_size,
            context_area_size = size.context_area_size,
            "mapped event ring"
        );
        Ok(ring)
    }

    fn check_header(
        header: &RingHeader,
        name: &str,
    ) -> Result<(EventRingSize, RingLayout), EventRingError> {
        if header.magic != RING_HEADER_VERSION {
            return bail(EventRingError::BadMagic {
                name: name.to_owned(),
            });
        }
        let size = header.size;
        size.check(name)?;
        Ok((size, size.layout()))
    }

    /// Initializes an event ring "shared file", to be mmap'ed by multiple
    /// processes later. Given an open file descriptor, this creates the event
    /// ring data structures at the given offset within that file. The file
    /// region must already be at least [`EventRingSize::total_storage`]
    /// bytes; callers pre-size it with `ftruncate(2)`.
    pub fn init_fd(
        size: &EventRingSize,
        content_type: EventContentType,
        schema_hash: &[u8; 32],
        ring_fd: c_int,
        ring_offset: off_t,
        error_name: &str,
    ) -> Result<(), EventRingError> {
        let ring_start = check_ring_offset(ring_offset, error_name)?;
        size.check(error_name)?;
        let layout = size.layout();

        let file_len = file_region_len(ring_fd, error_name)?;
        if file_len < ring_start + layout.file_storage {
            return bail(EventRingError::BadFile {
                name: error_name.to_owned(),
                reason: format!(
                    "file length {file_len} smaller than ring storage {} at offset {ring_start}; \
                     pre-size the file before initializing",
                    layout.file_storage
                ),
            });
        }

        let header_map = unsafe {
            map_region(
                ptr::null_mut(),
                LARGE_PAGE_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                ring_fd,
                ring_start,
                error_name,
            )?
        };
        let result = (|| {
            let header = header_map.cast::<RingHeader>();
            if unsafe { (*header).magic } == RING_HEADER_VERSION {
                return bail(EventRingError::AlreadyInitialized {
                    name: error_name.to_owned(),
                });
            }
            unsafe {
                ptr::write_bytes(header_map.cast::<u8>(), 0, std::mem::size_of::<RingHeader>());
                ptr::write(
                    header,
                    RingHeader {
                        magic: RING_HEADER_VERSION,
                        content_type: content_type as u16,
                        schema_hash: *schema_hash,
                        size: *size,
                        control: std::mem::zeroed::<RingControl>(),
                    },
                );
            }
            Ok(())
        })();
        unsafe { libc::munmap(header_map, LARGE_PAGE_SIZE as usize) };
        result?;

        // Every descriptor slot must read back seqno == 0 ("never written").
        // Hole punching deallocates the descriptor section without dirtying
        // pages; the fallback memset covers filesystems that cannot punch.
        let punched = unsafe {
            libc::fallocate(
                ring_fd,
                libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE,
                (ring_start + layout.descriptors_offset) as off_t,
                (size.descriptor_capacity * 64) as off_t,
            ) == 0
        };
        if !punched {
            let desc_bytes = (size.descriptor_capacity * 64) as usize;
            let desc_map = unsafe {
                map_region(
                    ptr::null_mut(),
                    size.descriptor_capacity * 64,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    ring_fd,
                    ring_start + layout.descriptors_offset,
                    error_name,
                )?
            };
            unsafe {
                ptr::write_bytes(desc_map.cast::<u8>(), 0, desc_bytes);
                libc::munmap(desc_map, desc_bytes);
            }
        }

        tracing::debug!(
            name = %error_name,
            content_type = %content_type,
            "initialized event ring file"
        );
        Ok(())
    }

    /// Validate that the ring records the expected content type and, when
    /// one is supplied, the expected schema hash.
    pub(crate) fn check_content_type(
        &self,
        expected: EventContentType,
        expected_schema_hash: Option<&[u8; 32]>,
    ) -> Result<(), EventRingError> {
        let header = self.header();
        if header.content_type != expected as u16 {
            return bail(EventRingError::ContentTypeMismatch {
                name: self.name.clone(),
                expected,
                actual: header.content_type,
            });
        }
        if let Some(expected_hash) = expected_schema_hash {
            if &header.schema_hash != expected_hash {
                return bail(EventRingError::SchemaMismatch {
                    name: self.name.clone(),
                    expected: hex::encode(expected_hash),
                    actual: hex::encode(header.schema_hash),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn check_prot(
        &self,
        needed_prot: c_int,
        needed: &'static str,
    ) -> Result<(), EventRingError> {
        if self.mmap_prot & needed_prot != needed_prot {
            return bail(EventRingError::Protection {
                name: self.name.clone(),
                needed,
            });
        }
        Ok(())
    }

    /// Try to copy the event descriptor corresponding to a particular
    /// sequence number; returns the copy only if the slot currently holds
    /// that sequence number.
    #[inline]
    pub fn try_copy(&self, seqno: u64) -> Option<RawEventDescriptor> {
        if seqno == 0 {
            return None;
        }
        let slot = self.descriptor_slot(seqno);
        // Volatile copy first, acquire re-check second: the recorder zeroes
        // the slot's seqno before rewriting its body, so a slot that still
        // carries `seqno` after the copy completed was not touched during it.
        let copied = unsafe { ptr::read_volatile(slot as *const RawEventDescriptor) };
        let ring_seqno = slot.seqno_atomic().load(std::sync::atomic::Ordering::Acquire);
        (ring_seqno == seqno).then_some(copied)
    }

    /// Obtain the event's payload bytes in shared memory in a zero-copy
    /// fashion; the returned slice may alias live writer memory, so it is
    /// only trustworthy between two successful [`payload_check`] calls.
    ///
    /// [`payload_check`]: Self::payload_check
    #[inline]
    pub fn payload_peek(&self, event: &RawEventDescriptor) -> &[u8] {
        let begin = event.payload_buf_offset & self.payload_buf_mask;
        // Clamp to the mirrored span so a descriptor holding arbitrary bytes
        // cannot produce an out-of-bounds slice.
        let available = 2 * (self.payload_buf_mask + 1) - begin;
        let len = u64::from(event.payload_size).min(available);
        unsafe { std::slice::from_raw_parts(self.payload_buf.add(begin as usize), len as usize) }
    }

    /// Return true if the payload bytes for the given descriptor have not
    /// been overwritten by ring wrap-around.
    #[inline]
    pub fn payload_check(&self, event: &RawEventDescriptor) -> bool {
        event.payload_buf_offset
            >= self
                .control()
                .buffer_window_start_atomic()
                .load(std::sync::atomic::Ordering::Acquire)
    }

    /// Copy the event payload into `dst`, up to `dst.len()` bytes; returns
    /// the filled prefix of `dst`, or `None` if the payload was overwritten
    /// before or during the copy.
    ///
    /// The window is re-checked after the copy: a single pre-copy check would
    /// leave the copy interval unprotected against the writer wrapping.
    #[inline]
    pub fn payload_memcpy<'a>(
        &self,
        event: &RawEventDescriptor,
        dst: &'a mut [u8],
    ) -> Option<&'a mut [u8]> {
        if !self.payload_check(event) {
            return None;
        }
        let src = self.payload_peek(event);
        let n = dst.len().min(src.len());
        dst[..n].copy_from_slice(&src[..n]);
        if !self.payload_check(event) {
            return None; // payload expired during the copy
        }
        Some(&mut dst[..n])
    }

    #[inline]
    pub(crate) fn descriptor_slot(&self, seqno: u64) -> &RawEventDescriptor {
        debug_assert!(seqno != 0);
        let index = (seqno - 1) & self.desc_capacity_mask;
        unsafe { &*self.descriptors.add(index as usize) }
    }

    pub(crate) fn descriptors_mut_ptr(&self) -> *mut RawEventDescriptor {
        self.descriptors.cast_mut()
    }

    pub(crate) fn payload_buf_mut_ptr(&self) -> *mut u8 {
        self.payload_buf.cast_mut()
    }

    pub(crate) fn header(&self) -> &RingHeader {
        unsafe { &*self.header }
    }

    pub(crate) fn control(&self) -> &RingControl {
        &self.header().control
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn desc_capacity_mask(&self) -> u64 {
        self.desc_capacity_mask
    }

    pub(crate) fn payload_buf_mask(&self) -> u64 {
        self.payload_buf_mask
    }

    /// Ring metadata as recorded in the mapped header.
    pub fn size(&self) -> EventRingSize {
        self.header().size
    }

    /// The content type tag recorded in the mapped header, undecoded.
    pub fn content_type_raw(&self) -> u16 {
        self.header().content_type
    }

    /// The 32-byte schema hash pinned in the mapped header.
    pub fn schema_hash(&self) -> [u8; 32] {
        self.header().schema_hash
    }

    /// Raw pointer to the context area; what this contains depends on the
    /// ring's content type.
    pub fn context_area(&self) -> *mut c_void {
        self.context_area
    }
}

impl Drop for RawEventRing {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.map_base, self.map_span) };
        tracing::debug!(name = %self.name, "unmapped event ring");
    }
}
