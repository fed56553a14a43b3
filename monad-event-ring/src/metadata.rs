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

//! Event domain metadata: the table of event types a content type defines,
//! and the schema hash derived from it.
//!
//! The 32-byte schema hash pinned in a ring's header is the SHA-256 digest of
//! the domain's serialized metadata table. Any change to the event type codes
//! or their payload definitions changes the hash, which makes stale consumers
//! fail at map time instead of misinterpreting payload bytes.

use sha2::{Digest, Sha256};

use crate::EventContentType;

/// Describes one event type within a content type's namespace.
#[derive(Debug)]
pub struct EventMetadata {
    /// The event type code within the owning namespace.
    pub event_type: u16,
    /// Stable identifier of the event type.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
}

/// The full event type table of one content type.
#[derive(Debug)]
pub struct EventDomainMetadata {
    /// The content type whose namespace this table defines.
    pub content_type: EventContentType,
    /// All event types in the namespace, including the reserved
    /// `RECORD_ERROR` entry at code 1.
    pub events: &'static [EventMetadata],
}

impl EventDomainMetadata {
    /// Computes the 32-byte schema hash for this domain.
    ///
    /// Callers that need a `&'static [u8; 32]` (e.g. `EventDecoder`
    /// implementations) should cache the result in a `OnceLock`.
    pub fn compute_schema_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update((self.content_type as u16).to_le_bytes());
        for event in self.events {
            hasher.update(event.event_type.to_le_bytes());
            hasher.update((event.name.len() as u64).to_le_bytes());
            hasher.update(event.name.as_bytes());
            hasher.update((event.description.len() as u64).to_le_bytes());
            hasher.update(event.description.as_bytes());
        }
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN_A: EventDomainMetadata = EventDomainMetadata {
        content_type: EventContentType::Test,
        events: &[EventMetadata {
            event_type: 1,
            name: "RECORD_ERROR",
            description: "recording error",
        }],
    };

    #[test]
    fn schema_hash_is_deterministic_and_schema_sensitive() {
        assert_eq!(
            DOMAIN_A.compute_schema_hash(),
            DOMAIN_A.compute_schema_hash()
        );

        let renamed = EventDomainMetadata {
            content_type: EventContentType::Test,
            events: &[EventMetadata {
                event_type: 1,
                name: "RECORD_ERROR_V2",
                description: "recording error",
            }],
        };
        assert_ne!(
            DOMAIN_A.compute_schema_hash(),
            renamed.compute_schema_hash()
        );
    }
}
