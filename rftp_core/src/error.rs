/// Errors surfaced across the wire codec and the engine's class-3..5 failures.
///
/// Classes 1 (transient network error) and 2 (backpressure) in the protocol's
/// failure taxonomy are recovered silently inside the engine and never reach
/// this type; it exists for the conditions that must terminate a session.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("datagram too short for a header: {len} bytes, need at least {needed}")]
    ShortHeader { len: usize, needed: usize },

    #[error("malformed SACK block: start={start} end={end}")]
    InvalidSack { start: u32, end: u32 },

    #[error("payload exceeds maximum segment payload: {len} > {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("peer silent past watchdog ({0:?})")]
    PeerTimeout(std::time::Duration),

    #[error("segment {seq} retransmitted {count} times, exceeding the cap")]
    RetransmitLimitExceeded { seq: u32, count: u32 },

    #[error("failed to open payload source: {0}")]
    SourceOpenFailed(#[source] std::io::Error),

    #[error("failed to open output sink: {0}")]
    SinkOpenFailed(#[source] std::io::Error),

    #[error("failed to write to output sink: {0}")]
    SinkWriteFailed(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
