use std::time::Instant;

use rftp_core::segment::Segment;

use crate::config::EngineConfig;
use crate::reassembly::{AcceptOutcome, Drained, ReassemblyBuffer};

/// Result of feeding one inbound segment to [`ReceiverEngine::process_segment`]:
/// any newly in-order bytes to hand to the sink, and the one ACK the policy
/// says to send back (one ACK per received segment, no delayed ACKs).
pub struct ReceiveStep {
    pub drained: Vec<Drained>,
    pub ack: Segment,
}

/// The receiver side of the protocol: reassembly, cumulative + selective
/// ACK, and the EOF handshake. Pure and `Instant`-parameterized like
/// [`crate::sender::SenderEngine`] — no socket, no sink I/O; the driver
/// writes `drained` payloads to the sink and the `ack` segment to the wire.
pub struct ReceiverEngine {
    buf: ReassemblyBuffer,
    done: bool,
    last_activity: Instant,
}

impl ReceiverEngine {
    pub fn new(config: &EngineConfig, now: Instant) -> Self {
        Self {
            buf: ReassemblyBuffer::new(0, config.reassembly_cap),
            done: false,
            last_activity: now,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn next_expected(&self) -> u32 {
        self.buf.next_expected()
    }

    /// Apply one inbound segment: in-order segments drain the contiguous
    /// prefix (an EOF anywhere in that prefix finishes the session);
    /// out-of-order segments buffer (or
    /// drop, past capacity); segments below `next_expected` are duplicates.
    /// Every branch re-emits the current cumulative ACK with at most one
    /// SACK block describing the lowest buffered run.
    pub fn process_segment(&mut self, seg: &Segment, now: Instant) -> ReceiveStep {
        self.last_activity = now;

        let outcome = if seg.is_eof() {
            self.buf.accept_eof(seg.seq, seg.payload.clone())
        } else {
            self.buf.accept(seg.seq, seg.payload.clone())
        };

        match outcome {
            AcceptOutcome::InOrder { drained } => {
                let finished = drained.iter().any(|d| d.is_eof);
                let next_expected = self.buf.next_expected();
                let sack = self.buf.lowest_buffered_run();
                let ack = if finished {
                    self.done = true;
                    tracing::debug!(next_expected, "eof drained, session done");
                    Segment::eof_ack(next_expected, sack)
                } else {
                    Segment::ack(next_expected, sack)
                };
                ReceiveStep { drained, ack }
            }
            AcceptOutcome::Dropped => {
                tracing::debug!(seq = seg.seq, "reassembly buffer full, dropping out-of-order segment");
                let sack = self.buf.lowest_buffered_run();
                let ack = Segment::ack(self.buf.next_expected(), sack);
                ReceiveStep {
                    drained: Vec::new(),
                    ack,
                }
            }
            AcceptOutcome::Buffered | AcceptOutcome::Duplicate => {
                let sack = self.buf.lowest_buffered_run();
                let ack = Segment::ack(self.buf.next_expected(), sack);
                ReceiveStep {
                    drained: Vec::new(),
                    ack,
                }
            }
        }
    }
}
