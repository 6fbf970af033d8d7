use std::collections::BTreeMap;

use bytes::Bytes;

/// One drained segment: its starting byte offset, payload, and whether it
/// was the dedicated EOF segment (whose payload is a sentinel, ignored).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drained {
    pub seq: u32,
    pub payload: Bytes,
    pub is_eof: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// This segment extended the in-order prefix; `drained` lists it and any
    /// now-contiguous buffered segments, in ascending order.
    InOrder { drained: Vec<Drained> },
    /// Out-of-order, newly buffered.
    Buffered,
    /// Already delivered or already buffered.
    Duplicate,
    /// Out-of-order but the buffer is at capacity; the sender will recover
    /// it on timeout.
    Dropped,
}

struct Entry {
    payload: Bytes,
    is_eof: bool,
    /// Sequence-space width. Equal to `payload.len()` for data segments;
    /// fixed at 1 for the EOF segment, since its acknowledgment is defined
    /// as `final_offset + 1` regardless of its sentinel payload's length.
    len: u32,
}

/// Out-of-order segment buffer keyed by sequence number. A `BTreeMap`
/// doubles as the ordered structure for oldest-first draining and the set
/// membership needed for duplicate suppression.
///
/// Invariant: no entry has `seq < next_expected`; no two entries share a
/// `seq` (both enforced by construction below).
pub struct ReassemblyBuffer {
    next_expected: u32,
    buffered: BTreeMap<u32, Entry>,
    cap: usize,
}

impl ReassemblyBuffer {
    pub fn new(next_expected: u32, cap: usize) -> Self {
        Self {
            next_expected,
            buffered: BTreeMap::new(),
            cap,
        }
    }

    pub fn next_expected(&self) -> u32 {
        self.next_expected
    }

    /// Accept a data segment; its sequence-space width is `payload.len()`.
    pub fn accept(&mut self, seq: u32, payload: Bytes) -> AcceptOutcome {
        let len = payload.len() as u32;
        self.accept_entry(seq, payload, false, len)
    }

    /// Accept the dedicated EOF segment, whose sequence-space width is
    /// fixed at 1 byte regardless of its sentinel payload.
    pub fn accept_eof(&mut self, seq: u32, sentinel: Bytes) -> AcceptOutcome {
        self.accept_entry(seq, sentinel, true, 1)
    }

    fn accept_entry(&mut self, seq: u32, payload: Bytes, is_eof: bool, len: u32) -> AcceptOutcome {
        if seq < self.next_expected {
            return AcceptOutcome::Duplicate;
        }

        if seq == self.next_expected {
            let mut drained = vec![Drained {
                seq,
                payload,
                is_eof,
            }];
            self.next_expected = self.next_expected.wrapping_add(len);

            while let Some(entry) = self.buffered.remove(&self.next_expected) {
                drained.push(Drained {
                    seq: self.next_expected,
                    payload: entry.payload,
                    is_eof: entry.is_eof,
                });
                self.next_expected = self.next_expected.wrapping_add(entry.len);
            }

            AcceptOutcome::InOrder { drained }
        } else {
            if self.buffered.contains_key(&seq) {
                return AcceptOutcome::Duplicate;
            }
            if self.buffered.len() >= self.cap {
                return AcceptOutcome::Dropped;
            }
            self.buffered.insert(seq, Entry { payload, is_eof, len });
            AcceptOutcome::Buffered
        }
    }

    /// The lowest-sequence contiguous run currently buffered, as a SACK
    /// block `[start, end)`. `None` if nothing is buffered.
    pub fn lowest_buffered_run(&self) -> Option<(u32, u32)> {
        let mut iter = self.buffered.iter();
        let (&start, first) = iter.next()?;
        let mut end = start.wrapping_add(first.len);

        for (&seq, entry) in iter {
            if seq == end {
                end = end.wrapping_add(entry.len);
            } else {
                break;
            }
        }
        Some((start, end))
    }

    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_segment_advances_next_expected() {
        let mut buf = ReassemblyBuffer::new(0, 2000);
        let outcome = buf.accept(0, Bytes::from_static(b"abcd"));
        assert_eq!(
            outcome,
            AcceptOutcome::InOrder {
                drained: vec![Drained {
                    seq: 0,
                    payload: Bytes::from_static(b"abcd"),
                    is_eof: false
                }]
            }
        );
        assert_eq!(buf.next_expected(), 4);
    }

    #[test]
    fn out_of_order_then_gap_fill_drains_contiguous_prefix() {
        let mut buf = ReassemblyBuffer::new(0, 2000);
        assert_eq!(
            buf.accept(4, Bytes::from_static(b"bbbb")),
            AcceptOutcome::Buffered
        );
        assert_eq!(buf.next_expected(), 0);

        let outcome = buf.accept(0, Bytes::from_static(b"aaaa"));
        match outcome {
            AcceptOutcome::InOrder { drained } => {
                assert_eq!(drained.len(), 2);
                assert_eq!(drained[0].seq, 0);
                assert_eq!(drained[1].seq, 4);
            }
            other => panic!("expected InOrder, got {other:?}"),
        }
        assert_eq!(buf.next_expected(), 8);
        assert_eq!(buf.buffered_len(), 0);
    }

    #[test]
    fn duplicate_below_next_expected_is_rejected() {
        let mut buf = ReassemblyBuffer::new(8, 2000);
        assert_eq!(
            buf.accept(0, Bytes::from_static(b"aaaa")),
            AcceptOutcome::Duplicate
        );
    }

    #[test]
    fn duplicate_already_buffered_is_rejected() {
        let mut buf = ReassemblyBuffer::new(0, 2000);
        buf.accept(4, Bytes::from_static(b"bbbb"));
        assert_eq!(
            buf.accept(4, Bytes::from_static(b"bbbb")),
            AcceptOutcome::Duplicate
        );
    }

    #[test]
    fn buffer_saturation_drops_new_out_of_order_segments() {
        let mut buf = ReassemblyBuffer::new(0, 1);
        assert_eq!(
            buf.accept(100, Bytes::from_static(b"x")),
            AcceptOutcome::Buffered
        );
        assert_eq!(
            buf.accept(200, Bytes::from_static(b"y")),
            AcceptOutcome::Dropped
        );
    }

    #[test]
    fn lowest_buffered_run_reports_contiguous_prefix_only() {
        let mut buf = ReassemblyBuffer::new(0, 2000);
        buf.accept(4, Bytes::from_static(b"bbbb"));
        buf.accept(8, Bytes::from_static(b"cccc"));
        buf.accept(20, Bytes::from_static(b"d")); // not contiguous with [4,12)
        assert_eq!(buf.lowest_buffered_run(), Some((4, 12)));
    }

    #[test]
    fn eof_segment_advances_next_expected_by_one_not_by_sentinel_length() {
        let mut buf = ReassemblyBuffer::new(10, 2000);
        let outcome = buf.accept_eof(10, Bytes::from_static(&[0, 0, 0]));
        match outcome {
            AcceptOutcome::InOrder { drained } => {
                assert!(drained[0].is_eof);
            }
            other => panic!("expected InOrder, got {other:?}"),
        }
        assert_eq!(buf.next_expected(), 11);
    }

    #[test]
    fn out_of_order_eof_buffers_and_drains_after_gap_fill() {
        let mut buf = ReassemblyBuffer::new(0, 2000);
        assert_eq!(
            buf.accept_eof(4, Bytes::from_static(&[0, 0, 0])),
            AcceptOutcome::Buffered
        );
        let outcome = buf.accept(0, Bytes::from_static(b"aaaa"));
        match outcome {
            AcceptOutcome::InOrder { drained } => {
                assert_eq!(drained.len(), 2);
                assert!(drained[1].is_eof);
            }
            other => panic!("expected InOrder, got {other:?}"),
        }
        assert_eq!(buf.next_expected(), 5);
    }
}
