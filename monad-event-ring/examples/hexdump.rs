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

//! Tails an arbitrary event ring and hexdumps every payload; works against
//! any content type because it only uses the raw byte view.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use itertools::Itertools;
use monad_event_ring::{
    EventNextResult, EventPayloadResult, EventRing, RawEventDecoder, TypedEventRing,
};

#[derive(Debug, Parser)]
#[command(name = "event-ring-hexdump", about, long_about = None)]
pub struct Cli {
    #[arg(long)]
    event_ring_path: PathBuf,

    #[arg(short, long, default_value_t = 32)]
    width: usize,
}

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt::init();

    let Cli {
        event_ring_path,
        width,
    } = Cli::parse();

    let event_ring = EventRing::<RawEventDecoder>::new_from_path(event_ring_path)?;

    let mut event_reader = event_ring.create_reader();

    loop {
        let event_descriptor = match event_reader.next_descriptor() {
            EventNextResult::Gap {
                last_read_seqno,
                last_write_seqno,
            } => {
                eprintln!(
                    "gap: lost events in ({last_read_seqno}, {last_write_seqno}]; \
                     resetting to latest"
                );
                event_reader.reset();
                continue;
            }
            EventNextResult::NotReady => {
                std::thread::sleep(Duration::from_millis(1));
                continue;
            }
            EventNextResult::Ready(event_descriptor) => event_descriptor,
        };

        // Note: do NOT println inside `try_filter_map_raw`: the bytes can be
        // overwritten mid-read, in which case the event is "Expired" and the
        // partial output would be garbage.
        let (info, hexdump) = match event_descriptor.try_filter_map_raw(|info, bytes| {
            Some((
                info,
                bytes
                    .iter()
                    .map(|byte| format!("{byte:02x?}"))
                    .collect_vec(),
            ))
        }) {
            EventPayloadResult::Expired => {
                eprintln!("payload expired before it could be dumped");
                continue;
            }
            EventPayloadResult::Payload(None) => unreachable!(),
            EventPayloadResult::Payload(Some(dump)) => dump,
        };

        println!(
            "{:08x} {:02x} | {}",
            info.seqno,
            info.event_type,
            hexdump
                .into_iter()
                .chunks(width)
                .into_iter()
                .map(|mut chunk| chunk.join(" "))
                .join("\n               ")
        );
    }
}
