use std::time::Duration;

use rftp_core::constants::{
    DUP_ACK_THRESHOLD, HANDSHAKE_RETRIES, HANDSHAKE_TIMEOUT, INITIAL_RTO, MAX_CWND, MAX_RETRANSMITS,
    MAX_RTO, MIN_RTO, MSS, REASSEMBLY_CAP, RECEIVER_WATCHDOG, RETRANSMIT_BATCH_LIMIT,
    SENDER_WATCHDOG,
};

/// Every tunable named by the protocol, with defaults matching the
/// standards-aligned constants. Builder follows the same pattern as a
/// connection/server config in the rest of the stack: a `Default` impl plus
/// a fluent builder that only overrides what's set.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub mss: usize,
    pub min_rto: Duration,
    pub max_rto: Duration,
    pub initial_rto: Duration,
    pub max_cwnd: usize,
    pub dup_ack_threshold: u32,
    pub retransmit_batch_limit: usize,
    pub max_retransmits: u32,
    pub reassembly_cap: usize,
    pub sender_watchdog: Duration,
    pub receiver_watchdog: Duration,
    pub handshake_retries: u32,
    pub handshake_timeout: Duration,
    /// `Some(bytes)` pins the congestion window to a fixed value (the CLI's
    /// window-size hint); `None` runs CUBIC congestion control.
    pub fixed_window: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mss: MSS,
            min_rto: MIN_RTO,
            max_rto: MAX_RTO,
            initial_rto: INITIAL_RTO,
            max_cwnd: MAX_CWND,
            dup_ack_threshold: DUP_ACK_THRESHOLD,
            retransmit_batch_limit: RETRANSMIT_BATCH_LIMIT,
            max_retransmits: MAX_RETRANSMITS,
            reassembly_cap: REASSEMBLY_CAP,
            sender_watchdog: SENDER_WATCHDOG,
            receiver_watchdog: RECEIVER_WATCHDOG,
            handshake_retries: HANDSHAKE_RETRIES,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            fixed_window: None,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    sender_watchdog: Option<Duration>,
    receiver_watchdog: Option<Duration>,
    fixed_window: Option<Option<usize>>,
    max_retransmits: Option<u32>,
}

impl EngineConfigBuilder {
    pub fn sender_watchdog(mut self, d: Duration) -> Self {
        self.sender_watchdog = Some(d);
        self
    }

    pub fn receiver_watchdog(mut self, d: Duration) -> Self {
        self.receiver_watchdog = Some(d);
        self
    }

    pub fn fixed_window(mut self, bytes: Option<usize>) -> Self {
        self.fixed_window = Some(bytes);
        self
    }

    pub fn max_retransmits(mut self, count: u32) -> Self {
        self.max_retransmits = Some(count);
        self
    }

    pub fn build(self) -> EngineConfig {
        let default = EngineConfig::default();
        EngineConfig {
            sender_watchdog: self.sender_watchdog.unwrap_or(default.sender_watchdog),
            receiver_watchdog: self.receiver_watchdog.unwrap_or(default.receiver_watchdog),
            fixed_window: self.fixed_window.unwrap_or(default.fixed_window),
            max_retransmits: self.max_retransmits.unwrap_or(default.max_retransmits),
            ..default
        }
    }
}
