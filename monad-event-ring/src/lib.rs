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

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

//! A shared memory event ring: a fixed-capacity, single-writer, many-reader,
//! lock-free broadcast buffer that lives in a file-backed shared memory
//! region and is mapped concurrently by multiple processes.
//!
//! # Introduction
//!
//! A producer records variable-sized events; consumers in other processes
//! observe those events with zero copy where possible, and with an explicit,
//! race-free protocol for detecting when an event payload has been
//! overwritten by ring wrap-around. The ring is a generic broadcast
//! notification system: this crate contains the ring protocol itself and
//! **not** the event types recorded over it. Content type crates (e.g.
//! `monad-test-events` for the TEST namespace) define the event schemas and
//! implement [`EventDecoder`] for them.
//!
//! A ring image lives in a file: one process creates it with
//! [`init_ring_file`] (or [`EventRing::create_at_path`]) and any number of
//! processes then map it with [`EventRing::new_from_path`]. The underlying
//! file may be unlinked once all interested processes have mapped it.
//!
//! ## Consuming events
//!
//! To begin consuming, create an [`EventRing`], which loads the ring's
//! shared memory mappings into the current process's address space; the
//! lifetime of this object controls when the mappings are unloaded (on
//! [`Drop`]). Then call [`TypedEventRing::create_reader`] to obtain an
//! [`EventReader`], which produces [`EventNextResult::Ready`] when another
//! event is available and [`EventNextResult::NotReady`] when there isn't.
//!
//! Unlike iterators, event rings are backed by a fixed-size descriptor array
//! and a fixed-size payload buffer, both of which are overwritten in place
//! if this process falls behind the producer. A descriptor overwritten
//! before consumption surfaces as [`EventNextResult::Gap`]; payload bytes
//! overwritten while being read surface as [`EventPayloadResult::Expired`].
//! Once overwritten, an event is **unrecoverable** from the ring: programs
//! that depend on seeing every event must enter a recovery phase when the
//! ring gaps, and should test that phase (a [`SnapshotEventRing`] helps
//! there).
//!
//! Readers are single threaded, use the lifetime of a reference to the ring
//! to keep the mappings pinned, and iterate independently of one another:
//! every reader sees every event exactly once, absent gaps.
//!
//! ## Recording events
//!
//! The writer side maps the ring read-write and creates an [`EventRecorder`]
//! with [`EventRing::create_recorder`]. There is exactly one producer per
//! ring; the recorder reserves a descriptor slot and payload extent, the
//! caller fills the payload span, and [`EventReservation::commit`] publishes
//! the event. Events that cannot be recorded (oversized payloads) are
//! replaced in-band by `RECORD_ERROR` events rather than reported to the
//! caller, so the loss is visible to every consumer of the stream.

pub use self::{
    content_type::*, decoder::*, descriptor::*, error::*, layout::*, metadata::*, reader::*,
    recorder::*, result::*, ring::*,
};

pub mod util;

mod content_type;
mod decoder;
mod descriptor;
mod error;
mod layout;
mod metadata;
mod reader;
mod recorder;
mod result;
mod ring;
