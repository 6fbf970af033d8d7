use std::time::{Duration, Instant};

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rftp_engine::congestion::{CongestionController, CubicController};
use rftp_engine::retransmit_queue::RetransmitQueue;

use bytes::Bytes;

fn benchmark_congestion(c: &mut Criterion) {
    let mut group = c.benchmark_group("cubic_congestion");

    group.bench_function("slow_start_to_steady_state_5000_acks", |b| {
        b.iter_batched(
            || CubicController::new(1200, 64 * 1024 * 1024, 3),
            |mut cc| {
                let now = Instant::now();
                for i in 0..5000u64 {
                    let t = now + Duration::from_millis(i);
                    black_box(cc.on_new_ack(1200, t));
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("fast_retransmit_then_recover_100_events", |b| {
        b.iter_batched(
            || CubicController::new(1200, 64 * 1024 * 1024, 3),
            |mut cc| {
                let now = Instant::now();
                for i in 0..100u64 {
                    let t = now + Duration::from_millis(i * 50);
                    for _ in 0..20 {
                        cc.on_new_ack(1200, t);
                    }
                    black_box(cc.on_fast_retransmit(t));
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn benchmark_retransmit_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("retransmit_queue");

    // Fills the queue with a full clean-channel-sized window, then applies
    // one cumulative ACK covering it all: the steady-state hot path for a
    // loss-free transfer.
    group.bench_function("enqueue_then_cumulative_ack_5000_segments", |b| {
        b.iter_batched(
            || {
                let mut q = RetransmitQueue::new();
                let now = Instant::now();
                let payload = Bytes::from(vec![0u8; 1180]);
                for i in 0..5000u32 {
                    q.enqueue(i * 1180, payload.clone(), now);
                }
                (q, now)
            },
            |(mut q, now)| {
                let later = now + Duration::from_millis(50);
                black_box(q.ack(5000 * 1180, later));
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("scan_overdue_5000_segments_batch_32", |b| {
        b.iter_batched(
            || {
                let mut q = RetransmitQueue::new();
                let now = Instant::now();
                let payload = Bytes::from(vec![0u8; 1180]);
                for i in 0..5000u32 {
                    q.enqueue(i * 1180, payload.clone(), now);
                }
                (q, now)
            },
            |(mut q, now)| {
                let later = now + Duration::from_secs(1);
                black_box(q.scan_overdue(later, Duration::from_millis(200), 32));
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, benchmark_congestion, benchmark_retransmit_queue);
criterion_main!(benches);
