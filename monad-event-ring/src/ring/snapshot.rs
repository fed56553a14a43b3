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
    ffi::CString,
    fs::File,
    io::Write,
    os::fd::{AsRawFd, FromRawFd},
};

use super::{raw::RawEventRing, EventRing, TypedEventRing};
use crate::{
    error::{bail, EventRingError},
    reader::RawEventReader,
    EventDecoder, EventReader,
};

/// A special kind of event ring mapped from a static ring image, for
/// replaying a recorded event stream.
///
/// Intended for tests, benches, and gap-recovery tooling where, during
/// normal operation, an [`EventRing`] would be used. Readers created from a
/// snapshot start before the first event instead of at the most recent one.
#[derive(Debug)]
pub struct SnapshotEventRing<D>
where
    D: EventDecoder,
{
    ring: EventRing<D>,
    // The anonymous file backing the mappings; held only so the image shows
    // up with a name in /proc/self/fd while the snapshot is alive.
    _file: File,
}

impl<D> SnapshotEventRing<D>
where
    D: EventDecoder,
{
    /// Produces an event ring by zstd-decoding `zstd_bytes` into an
    /// anonymous in-memory file and mapping it read-only.
    pub fn new_from_zstd_bytes(
        zstd_bytes: &[u8],
        name: impl AsRef<str>,
    ) -> Result<Self, EventRingError> {
        let name = name.as_ref();
        let mut decompressed = Vec::new();
        if let Err(e) = zstd::stream::copy_decode(zstd_bytes, &mut decompressed) {
            return bail(EventRingError::BadFile {
                name: name.to_owned(),
                reason: format!("could not decompress ring snapshot: {e}"),
            });
        }
        Self::new_from_ring_image(&decompressed, name)
    }

    /// Produces an event ring from an uncompressed ring image.
    pub fn new_from_ring_image(image: &[u8], name: impl AsRef<str>) -> Result<Self, EventRingError> {
        let name = name.as_ref();
        let name_cstr = match CString::new(name) {
            Ok(s) => s,
            Err(_) => {
                return bail(EventRingError::BadFile {
                    name: name.to_owned(),
                    reason: "snapshot name contains an embedded nul".to_owned(),
                })
            }
        };

        let snapshot_fd = unsafe { libc::memfd_create(name_cstr.as_ptr(), libc::MFD_CLOEXEC) };
        if snapshot_fd == -1 {
            return bail(EventRingError::Io {
                name: name.to_owned(),
                op: "memfd_create(2)",
                source: std::io::Error::last_os_error(),
            });
        }
        let mut file = unsafe { File::from_raw_fd(snapshot_fd) };
        if let Err(source) = file.write_all(image) {
            return bail(EventRingError::Io {
                name: name.to_owned(),
                op: "write(2)",
                source,
            });
        }

        let raw = RawEventRing::mmap_from_fd(libc::PROT_READ, 0, file.as_raw_fd(), 0, name)?;

        Ok(Self {
            ring: EventRing::new(raw)?,
            _file: file,
        })
    }
}

impl<D> TypedEventRing for SnapshotEventRing<D>
where
    D: EventDecoder,
{
    type Decoder = D;

    fn create_reader<'ring>(&'ring self) -> EventReader<'ring, D> {
        let raw = RawEventReader::new(&self.ring.raw).expect("snapshot is mapped for reading");

        EventReader::new_snapshot(raw)
    }
}
