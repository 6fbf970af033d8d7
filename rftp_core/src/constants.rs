use std::time::Duration;

/// Fixed header size in bytes: seq(4) + ack(4) + flags(2) + sack_start(4) + sack_end(4) + reserved(2).
pub const HEADER_LEN: usize = 20;

/// Maximum payload bytes per segment.
pub const MAX_PAYLOAD: usize = 1180;

/// Maximum segment size on the wire (header + payload).
pub const MSS: usize = HEADER_LEN + MAX_PAYLOAD;

/// Maximum datagram size accepted by either endpoint.
pub const MAX_DATAGRAM: usize = 1200;

pub const MIN_RTO: Duration = Duration::from_millis(50);
pub const MAX_RTO: Duration = Duration::from_secs(3);
pub const INITIAL_RTO: Duration = Duration::from_millis(300);

/// Upper bound on the congestion window, in bytes.
pub const MAX_CWND: usize = 64 * 1024 * 1024;

/// Duplicate-ACK count that triggers a fast retransmit.
pub const DUP_ACK_THRESHOLD: u32 = 3;

/// A single sequence retransmitted more than this many times aborts the session.
pub const MAX_RETRANSMITS: u32 = 15;

/// Sender watchdog: declare the peer dead after this much silence.
pub const SENDER_WATCHDOG: Duration = Duration::from_secs(30);

/// Receiver watchdog: close cleanly after this much silence from the sender.
pub const RECEIVER_WATCHDOG: Duration = Duration::from_secs(30);

/// Cap on buffered out-of-order segments at the receiver.
pub const REASSEMBLY_CAP: usize = 2000;

/// CUBIC's multiplicative decrease factor.
pub const CUBIC_BETA: f64 = 0.7;

/// CUBIC's window growth constant.
pub const CUBIC_C: f64 = 0.4;

/// RTT estimator smoothing constants (RFC 6298 naming).
pub const RTT_ALPHA: f64 = 1.0 / 8.0;
pub const RTT_BETA: f64 = 1.0 / 4.0;

/// Handshake retry policy for the receiver's file-request datagram.
pub const HANDSHAKE_RETRIES: u32 = 5;
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);
pub const HANDSHAKE_REQUEST_BYTE: u8 = 0x01;

/// Payload byte count of the dedicated EOF segment (content is a sentinel, ignored).
pub const EOF_PAYLOAD_LEN: usize = 3;

/// Upper bound on retransmissions issued from a single RTO scan, to avoid starvation
/// of new-segment emission when many segments are simultaneously overdue.
pub const RETRANSMIT_BATCH_LIMIT: usize = 32;
