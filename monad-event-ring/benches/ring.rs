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

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use monad_event_ring::{
    EventNextResult, EventRing, EventRingSize, RawEventDecoder, SnapshotEventRing, TypedEventRing,
};

const EVENTS: u64 = 100_000;
const PAYLOAD: [u8; 64] = [0xa5; 64];

fn bench_record(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();
    let ring =
        EventRing::<RawEventDecoder>::create_at_path(dir.path().join("bench-ring"), &size).unwrap();
    let mut recorder = ring.create_recorder().unwrap();

    let mut g = c.benchmark_group("record");
    g.throughput(criterion::Throughput::Elements(1));
    g.bench_function("record_64b", |b| {
        b.iter(|| black_box(recorder.record(2, [0; 4], &PAYLOAD)));
    });
    g.finish();
}

fn bench_snapshot_iter(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let ring_path = dir.path().join("bench-ring");
    let size = EventRingSize::from_shifts(16, 27, 0).unwrap();
    {
        let ring = EventRing::<RawEventDecoder>::create_at_path(&ring_path, &size).unwrap();
        let mut recorder = ring.create_recorder().unwrap();
        for _ in 0..EVENTS {
            recorder.record(2, [0; 4], &PAYLOAD);
        }
    }
    let image = std::fs::read(&ring_path).unwrap();
    let snapshot =
        SnapshotEventRing::<RawEventDecoder>::new_from_ring_image(&image, "bench-snapshot")
            .unwrap();

    let mut g = c.benchmark_group("snapshot");

    g.bench_function("reader_create_drop", |b| {
        b.iter(|| {
            black_box(snapshot.create_reader());
        });
    });

    g.throughput(criterion::Throughput::Elements(EVENTS));
    g.bench_function("iter", |b| {
        b.iter_batched_ref(
            || snapshot.create_reader(),
            |event_reader| loop {
                match event_reader.next_descriptor() {
                    EventNextResult::Ready(event_descriptor) => {
                        let first_byte = event_descriptor
                            .try_filter_map_raw(|_, bytes| bytes.first().cloned());
                        black_box(first_byte);
                    }
                    EventNextResult::NotReady => break,
                    EventNextResult::Gap { .. } => panic!("snapshot cannot gap"),
                };
            },
            BatchSize::SmallInput,
        );
    });
    g.finish();
}

criterion_group!(benches, bench_record, bench_snapshot_iter);
criterion_main!(benches);
