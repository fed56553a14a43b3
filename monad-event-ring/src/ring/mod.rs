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

use std::{
    fs::{File, OpenOptions},
    marker::PhantomData,
    os::fd::AsRawFd,
    path::Path,
};

use libc::c_int;

pub use self::{
    raw::{RawEventRing, RingControl, RingHeader},
    snapshot::SnapshotEventRing,
};
use crate::{
    error::{bail, EventRingError},
    reader::RawEventReader,
    util::path_supports_hugetlb,
    EventContentType, EventDecoder, EventReader, EventRecorder, EventRingSize,
};

mod raw;
mod snapshot;

/// A unified interface for event rings.
pub trait TypedEventRing {
    /// The decoder for this ring's content type.
    type Decoder: EventDecoder;

    /// Produces a reader that consumes events from this ring.
    fn create_reader<'ring>(&'ring self) -> EventReader<'ring, Self::Decoder>;
}

/// An event ring mapped from a file.
///
/// The lifetime of this object controls when the ring's shared memory
/// mappings are removed from the process address space (on [`Drop`]). It is
/// `Send + Sync` and can be shared by wrapping it in an
/// [`Arc`](std::sync::Arc).
pub struct EventRing<D>
where
    D: EventDecoder,
{
    raw: RawEventRing,
    _phantom: PhantomData<D>,
}

impl<D> std::fmt::Debug for EventRing<D>
where
    D: EventDecoder,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRing")
            .field("raw", &self.raw)
            .field("content_type", &D::content_type())
            .finish()
    }
}

impl<D> EventRing<D>
where
    D: EventDecoder,
{
    /// Maps the event ring stored at `path` read-only.
    pub fn new_from_path(path: impl AsRef<Path>) -> Result<Self, EventRingError> {
        Self::new_from_path_with_offset(path, 0)
    }

    /// Maps the event ring stored at `path` starting at `ring_offset`
    /// read-only.
    ///
    /// This method should only be used if the event ring starts at an offset
    /// within the file; in most cases use
    /// [`new_from_path`](Self::new_from_path) instead.
    pub fn new_from_path_with_offset(
        path: impl AsRef<Path>,
        ring_offset: u64,
    ) -> Result<Self, EventRingError> {
        Self::map_path(path.as_ref(), ring_offset, libc::PROT_READ)
    }

    /// Maps the event ring stored at `path` read-write, as needed to create
    /// a recorder.
    pub fn writable_from_path(path: impl AsRef<Path>) -> Result<Self, EventRingError> {
        Self::map_path(path.as_ref(), 0, libc::PROT_READ | libc::PROT_WRITE)
    }

    /// Creates a fresh ring file at `path` sized from `size`, initializes it
    /// with this decoder's content type and schema hash, and maps it
    /// read-write.
    ///
    /// Fails with [`EventRingError::AlreadyInitialized`] if `path` already
    /// holds a ring image.
    pub fn create_at_path(
        path: impl AsRef<Path>,
        size: &EventRingSize,
    ) -> Result<Self, EventRingError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
        {
            Ok(file) => file,
            Err(source) => {
                return bail(EventRingError::Io {
                    name,
                    op: "open(2)",
                    source,
                })
            }
        };
        // Grow, never shrink: shrinking would corrupt a ring image that is
        // already present (which init_fd reports as AlreadyInitialized).
        let current_len = file.metadata().map(|m| m.len()).unwrap_or(0);
        if current_len < size.total_storage() {
            if let Err(source) = file.set_len(size.total_storage()) {
                return bail(EventRingError::Io {
                    name,
                    op: "ftruncate(2)",
                    source,
                });
            }
        }
        RawEventRing::init_fd(
            size,
            D::content_type(),
            D::schema_hash(),
            file.as_raw_fd(),
            0,
            &name,
        )?;
        drop(file);
        Self::map_path(path, 0, libc::PROT_READ | libc::PROT_WRITE)
    }

    fn map_path(path: &Path, ring_offset: u64, mmap_prot: c_int) -> Result<Self, EventRingError> {
        let name = path.display().to_string();

        let mmap_extra_flags = if path_supports_hugetlb(path)? {
            libc::MAP_POPULATE | libc::MAP_HUGETLB
        } else {
            libc::MAP_POPULATE
        };

        let writable = mmap_prot & libc::PROT_WRITE == libc::PROT_WRITE;
        let ring_file = match OpenOptions::new().read(true).write(writable).open(path) {
            Ok(file) => file,
            Err(source) => {
                return bail(EventRingError::Io {
                    name,
                    op: "open(2)",
                    source,
                })
            }
        };

        let raw = RawEventRing::mmap_from_fd(
            mmap_prot,
            mmap_extra_flags,
            ring_file.as_raw_fd(),
            ring_offset as libc::off_t,
            &name,
        )?;

        // The mappings keep the file alive; the descriptor can close here.
        Self::new(raw)
    }

    pub(crate) fn new(raw: RawEventRing) -> Result<Self, EventRingError> {
        D::check_ring(&raw)?;

        Ok(Self {
            raw,
            _phantom: PhantomData,
        })
    }

    /// Creates the single-producer recorder for this ring; fails unless the
    /// ring is mapped read-write.
    pub fn create_recorder(&self) -> Result<EventRecorder<'_>, EventRingError> {
        EventRecorder::new(&self.raw)
    }

    /// Protocol-level access to the mapped ring: descriptor copies by
    /// sequence number and payload window checks.
    pub fn raw(&self) -> &RawEventRing {
        &self.raw
    }

    /// The size structure recorded in the ring header.
    pub fn size(&self) -> EventRingSize {
        self.raw.size()
    }

    /// The 32-byte schema hash pinned in the ring header.
    pub fn schema_hash(&self) -> [u8; 32] {
        self.raw.schema_hash()
    }

    /// Raw pointer to the ring's context area; its contents depend on the
    /// content type.
    pub fn context_area(&self) -> *mut libc::c_void {
        self.raw.context_area()
    }
}

impl<D> TypedEventRing for EventRing<D>
where
    D: EventDecoder,
{
    type Decoder = D;

    fn create_reader<'ring>(&'ring self) -> EventReader<'ring, D> {
        let raw = RawEventReader::new(&self.raw).expect("event ring is mapped for reading");

        EventReader::new(raw)
    }
}

/// Initializes an event ring image inside `file` at `ring_offset`, which
/// must be large-page aligned. The file region must already be at least
/// [`EventRingSize::total_storage`] bytes past the offset; callers pre-size
/// it with [`File::set_len`].
pub fn init_ring_file(
    size: &EventRingSize,
    content_type: EventContentType,
    schema_hash: &[u8; 32],
    file: &File,
    ring_offset: u64,
    error_name: &str,
) -> Result<(), EventRingError> {
    if ring_offset > libc::off_t::MAX as u64 {
        return bail(EventRingError::BadFile {
            name: error_name.to_owned(),
            reason: format!("ring offset {ring_offset} out of range"),
        });
    }
    RawEventRing::init_fd(
        size,
        content_type,
        schema_hash,
        file.as_raw_fd(),
        ring_offset as libc::off_t,
        error_name,
    )
}
