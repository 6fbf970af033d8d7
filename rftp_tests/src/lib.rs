//! Test-only simulation harness: drives a [`SenderEngine`]/[`ReceiverEngine`]
//! pair across a simulated lossy/reordering channel without any real
//! sockets, exercising the same pure, `Instant`-parameterized step functions
//! the production binaries call. Deterministic given a fixed seed.

#![allow(dead_code)]

pub mod real_socket;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rftp_core::segment::Segment;
use rftp_engine::config::EngineConfig;
use rftp_engine::receiver::ReceiverEngine;
use rftp_engine::sender::{AckEvent, SenderEngine};

/// Per-direction channel impairment.
#[derive(Debug, Clone, Copy, Default)]
pub struct Impairment {
    pub loss_prob: f64,
    /// Probability a delivered segment is instead held back and released
    /// after `reorder_delay` plus up to `reorder_window` extra in-flight
    /// segments have passed it.
    pub reorder_prob: f64,
    pub reorder_window: usize,
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub forward: Impairment,
    pub backward: Impairment,
    pub seed: u64,
    pub step: Duration,
    /// Hard cap on simulated steps, so a broken engine fails the test
    /// instead of hanging the harness.
    pub max_steps: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            forward: Impairment::default(),
            backward: Impairment::default(),
            seed: 42,
            step: Duration::from_millis(1),
            max_steps: 2_000_000,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct SimStats {
    pub retransmissions: usize,
    pub fast_retransmits: usize,
    pub cwnd_trace: Vec<usize>,
}

#[derive(Debug)]
pub struct SimOutcome {
    pub received: Vec<u8>,
    pub stats: SimStats,
}

struct InFlight {
    deliver_at: Instant,
    wire: Bytes,
}

/// Queue of in-flight datagrams for one direction, with reordering modeled
/// as holding a fraction of segments a few slots longer than their nominal
/// arrival time.
struct Link {
    impairment: Impairment,
    queue: VecDeque<InFlight>,
}

impl Link {
    fn new(impairment: Impairment) -> Self {
        Self {
            impairment,
            queue: VecDeque::new(),
        }
    }

    fn send(&mut self, wire: Bytes, now: Instant, base_delay: Duration, rng: &mut StdRng) {
        if rng.gen_bool(self.impairment.loss_prob) {
            return;
        }
        let extra = if rng.gen_bool(self.impairment.reorder_prob) && self.impairment.reorder_window > 0 {
            base_delay * rng.gen_range(1..=self.impairment.reorder_window as u32)
        } else {
            Duration::ZERO
        };
        self.queue.push_back(InFlight {
            deliver_at: now + base_delay + extra,
            wire,
        });
    }

    /// Drain everything due by `now`, in delivery-time order (simulating
    /// that reordered segments can overtake ones sent before them).
    fn drain_due(&mut self, now: Instant) -> Vec<Bytes> {
        let mut due = Vec::new();
        let mut remaining = VecDeque::new();
        while let Some(item) = self.queue.pop_front() {
            if item.deliver_at <= now {
                due.push((item.deliver_at, item.wire));
            } else {
                remaining.push_back(item);
            }
        }
        self.queue = remaining;
        due.sort_by_key(|(t, _)| *t);
        due.into_iter().map(|(_, w)| w).collect()
    }
}

/// Runs a full sender/receiver session over a simulated channel until the
/// sender reports completion (or `max_steps` elapses, which panics — a
/// stuck simulation means the engines disagree about termination).
pub fn run_simulation(payload: &[u8], config: EngineConfig, sim: SimConfig) -> SimOutcome {
    let mut rng = StdRng::seed_from_u64(sim.seed);
    let start = Instant::now();

    let mut sender = SenderEngine::new(Bytes::copy_from_slice(payload), config.clone(), start);
    let mut receiver = ReceiverEngine::new(&config, start);

    let mut to_receiver = Link::new(sim.forward);
    let mut to_sender = Link::new(sim.backward);

    let mut received = Vec::with_capacity(payload.len());
    let mut stats = SimStats::default();
    let one_way = Duration::from_millis(5);

    let mut now = start;
    for _ in 0..sim.max_steps {
        now += sim.step;

        while let Some(seg) = sender.emit_next(now) {
            let wire = seg.encode().expect("encodable segment");
            to_receiver.send(wire, now, one_way, &mut rng);
        }

        for wire in to_receiver.drain_due(now) {
            let seg = Segment::decode(&wire).expect("well-formed segment");
            let step = receiver.process_segment(&seg, now);
            for drained in step.drained {
                if !drained.is_eof {
                    received.extend_from_slice(&drained.payload);
                }
            }
            let ack_wire = step.ack.encode().expect("encodable ack");
            to_sender.send(ack_wire, now, one_way, &mut rng);
        }

        for wire in to_sender.drain_due(now) {
            let ack = Segment::decode(&wire).expect("well-formed ack");
            match sender
                .process_ack(&ack, now)
                .expect("retransmit cap not exceeded in test scenarios")
            {
                AckEvent::Done => {
                    stats.cwnd_trace.push(sender.current_cwnd());
                    return SimOutcome { received, stats };
                }
                AckEvent::DuplicateAck {
                    fast_retransmit: Some(segment),
                } => {
                    stats.fast_retransmits += 1;
                    let wire = segment.encode().expect("encodable segment");
                    to_receiver.send(wire, now, one_way, &mut rng);
                }
                _ => {}
            }
        }

        let retransmits = sender
            .handle_timeout(now)
            .expect("retransmit cap not exceeded in test scenarios");
        if !retransmits.is_empty() {
            stats.retransmissions += retransmits.len();
            for seg in retransmits {
                let wire = seg.encode().expect("encodable segment");
                to_receiver.send(wire, now, one_way, &mut rng);
            }
        }

        stats.cwnd_trace.push(sender.current_cwnd());
    }

    panic!("simulation exceeded max_steps without the sender reporting completion");
}
