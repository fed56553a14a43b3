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

//! Error surface of the event ring library.
//!
//! Initialization and mapping failures are returned synchronously as
//! [`EventRingError`] values and are also recorded in a thread-local
//! last-error string, retrievable with [`last_error`]. Recording failures are
//! never surfaced here; the recorder preserves them in the event stream as
//! `RECORD_ERROR` events so downstream consumers can account for loss.

use std::cell::RefCell;

use thiserror::Error;

use crate::EventContentType;

/// Errors produced while sizing, initializing, or mapping an event ring.
#[derive(Debug, Error)]
pub enum EventRingError {
    /// A size shift fell outside its documented power-of-two bounds.
    #[error("invalid event ring size: {0}")]
    InvalidSize(String),

    /// The file does not contain a usable event ring image.
    #[error("`{name}`: not a usable event ring file: {reason}")]
    BadFile {
        /// The path or name of the ring file.
        name: String,
        /// Why the file could not be used as an event ring.
        reason: String,
    },

    /// An OS-level operation on the ring file failed.
    #[error("`{name}`: {op} failed: {source}")]
    Io {
        /// The path or name of the ring file.
        name: String,
        /// The operation that failed.
        op: &'static str,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The header's magic/version octets are not those of this library.
    #[error("`{name}`: bad magic bytes in event ring header")]
    BadMagic {
        /// The path or name of the ring file.
        name: String,
    },

    /// `init_file` found a valid ring image already present; the caller must
    /// decide whether to reuse it.
    #[error("`{name}`: file already contains an initialized event ring")]
    AlreadyInitialized {
        /// The path or name of the ring file.
        name: String,
    },

    /// The ring records a different content type than the caller expects.
    #[error("`{name}`: content type mismatch: ring has {actual}, expected {expected}")]
    ContentTypeMismatch {
        /// The path or name of the ring file.
        name: String,
        /// The content type the caller expected.
        expected: EventContentType,
        /// The content type actually recorded in the ring.
        actual: u16,
    },

    /// The ring's pinned schema hash differs from the caller's compiled
    /// expectation; the binary event definitions are incompatible.
    #[error("`{name}`: schema hash mismatch: ring has {actual}, expected {expected}")]
    SchemaMismatch {
        /// The path or name of the ring file.
        name: String,
        /// The schema hash the caller expected.
        expected: String,
        /// The schema hash actually recorded in the ring.
        actual: String,
    },

    /// The ring's memory segments are not mapped with the protection the
    /// requested operation needs.
    #[error("`{name}`: event ring memory segments are not mapped for {needed}")]
    Protection {
        /// The path or name of the ring file.
        name: String,
        /// The protection the requested operation needs.
        needed: &'static str,
    },
}

thread_local! {
    static LAST_ERROR: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Returns a description of the most recent event ring failure on the
/// current thread, or an empty string if none has occurred.
pub fn last_error() -> String {
    LAST_ERROR.with(|e| e.borrow().clone())
}

pub(crate) fn record_last_error(err: &EventRingError) {
    LAST_ERROR.with(|e| {
        let mut buf = e.borrow_mut();
        buf.clear();
        use std::fmt::Write;
        let _ = write!(buf, "{err}");
    });
}

/// Records `err` in the thread-local last-error buffer and returns it.
pub(crate) fn bail<T>(err: EventRingError) -> Result<T, EventRingError> {
    record_last_error(&err);
    Err(err)
}
