use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use bytes::Bytes;

struct Record {
    payload: Bytes,
    send_time: Instant,
    retransmit_count: u32,
    sacked: bool,
}

/// Result of applying a cumulative ACK: how many bytes it newly covered, and
/// (per Karn's rule) an RTT sample drawn only if at least one covered record
/// had never been retransmitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct AckOutcome {
    pub bytes_acked: usize,
    pub rtt_sample: Option<Duration>,
}

/// Ordered map from sequence number to in-flight record, with an auxiliary
/// (send_time, seq) index for oldest-first timeout scanning. A
/// retransmission removes and reinserts the send-time index entry, which is
/// what "moves the record to the tail" for scan purposes while its identity
/// in the main map is unchanged.
///
/// Invariant: `seq < base ⇒ absent`; `base ≤ seq < next_seq ⇒ present`,
/// enforced by the caller only ever calling `ack` with non-decreasing
/// cumulative values.
pub struct RetransmitQueue {
    records: BTreeMap<u32, Record>,
    order: BTreeSet<(Instant, u32)>,
    inflight_bytes: usize,
}

impl RetransmitQueue {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            order: BTreeSet::new(),
            inflight_bytes: 0,
        }
    }

    pub fn enqueue(&mut self, seq: u32, payload: Bytes, now: Instant) {
        self.inflight_bytes += payload.len();
        self.order.insert((now, seq));
        self.records.insert(
            seq,
            Record {
                payload,
                send_time: now,
                retransmit_count: 0,
                sacked: false,
            },
        );
    }

    /// Remove every record with `seq < cum_ack`, returning the bytes freed
    /// and (if eligible) an RTT sample.
    pub fn ack(&mut self, cum_ack: u32, now: Instant) -> AckOutcome {
        let covered: Vec<u32> = self
            .records
            .range(..cum_ack)
            .map(|(&seq, _)| seq)
            .collect();

        let mut outcome = AckOutcome::default();
        let mut latest_unretransmitted: Option<Instant> = None;

        for seq in covered {
            if let Some(record) = self.records.remove(&seq) {
                outcome.bytes_acked += record.payload.len();
                self.inflight_bytes = self.inflight_bytes.saturating_sub(record.payload.len());
                self.order.remove(&(record.send_time, seq));

                if record.retransmit_count == 0 {
                    latest_unretransmitted = Some(match latest_unretransmitted {
                        Some(t) if t > record.send_time => t,
                        _ => record.send_time,
                    });
                }
            }
        }

        if let Some(send_time) = latest_unretransmitted {
            outcome.rtt_sample = Some(now.saturating_duration_since(send_time));
        }

        outcome
    }

    /// Mark every record fully contained in `[start, end)` as SACK'd. SACK'd
    /// records stay in the queue — they're in flight until the cumulative
    /// ACK passes them — but are skipped by fast retransmit and RTO scans.
    pub fn sack(&mut self, start: u32, end: u32) {
        for (&seq, record) in self.records.range_mut(start..end) {
            let covers_whole_payload = seq >= start
                && seq.saturating_add(record.payload.len() as u32) <= end;
            if covers_whole_payload {
                record.sacked = true;
            }
        }
    }

    /// Lowest-sequence record whose SACK bit is clear.
    pub fn oldest_unsacked(&self) -> Option<(u32, Bytes)> {
        self.records
            .iter()
            .find(|(_, r)| !r.sacked)
            .map(|(&seq, r)| (seq, r.payload.clone()))
    }

    pub fn peek_oldest_send_time(&self) -> Option<Instant> {
        self.order.iter().next().map(|&(t, _)| t)
    }

    /// Scan for unsacked records overdue for retransmission (oldest first),
    /// up to `batch_limit` records, bumping their retransmit count and
    /// send-time as a side effect. Returns `(seq, payload, retransmit_count)`
    /// for each, so the caller can check the retransmission cap.
    pub fn scan_overdue(
        &mut self,
        now: Instant,
        rto: Duration,
        batch_limit: usize,
    ) -> Vec<(u32, Bytes, u32)> {
        let overdue_seqs: Vec<u32> = self
            .order
            .iter()
            .filter(|&&(send_time, seq)| {
                now.saturating_duration_since(send_time) > rto
                    && !self.records.get(&seq).map(|r| r.sacked).unwrap_or(true)
            })
            .take(batch_limit)
            .map(|&(_, seq)| seq)
            .collect();

        let mut out = Vec::with_capacity(overdue_seqs.len());
        for seq in overdue_seqs {
            if let Some(record) = self.records.get_mut(&seq) {
                self.order.remove(&(record.send_time, seq));
                record.send_time = now;
                record.retransmit_count += 1;
                self.order.insert((now, seq));
                out.push((seq, record.payload.clone(), record.retransmit_count));
            }
        }
        out
    }

    /// Bump retransmit bookkeeping for a single record (used by fast
    /// retransmit, which resends exactly one segment outside the RTO scan).
    pub fn mark_retransmitted(&mut self, seq: u32, now: Instant) -> Option<u32> {
        let record = self.records.get_mut(&seq)?;
        self.order.remove(&(record.send_time, seq));
        record.send_time = now;
        record.retransmit_count += 1;
        self.order.insert((now, seq));
        Some(record.retransmit_count)
    }

    pub fn inflight_bytes(&self) -> usize {
        self.inflight_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub fn contains(&self, seq: u32) -> bool {
        self.records.contains_key(&seq)
    }
}

impl Default for RetransmitQueue {
    fn default() -> Self {
        Self::new()
    }
}
