use std::time::{Duration, Instant};

use rftp_core::constants::{CUBIC_BETA, CUBIC_C};

/// The two growth phases of the congestion window, modeled as a tagged
/// variant rather than a sentinel timestamp so there's no "congestion epoch
/// not yet set" special case to handle separately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CongestionPhase {
    SlowStart,
    CongestionAvoidance {
        t_last_congestion: Instant,
        w_max: f64,
        k: f64,
    },
}

/// Common interface for the sender's rate governor. `CubicController` is the
/// protocol default; `FixedWindowController` backs the CLI's window-size
/// hint mode.
pub trait CongestionController {
    fn on_new_ack(&mut self, acked_bytes: usize, now: Instant);
    fn on_dup_ack(&mut self) -> bool;
    fn on_fast_retransmit(&mut self, now: Instant);
    fn on_timeout(&mut self, now: Instant);
    fn current_cwnd(&self) -> usize;
    fn ssthresh(&self) -> usize;
    fn phase_name(&self) -> &'static str;
    /// Feed the session's minimum observed RTT. CUBIC uses this as the
    /// Reno-friendly bound's `rtt_min`; controllers that don't need it
    /// (e.g. the fixed-window mode) ignore it.
    fn update_rtt_min(&mut self, _rtt_min: Duration) {}
}

/// CUBIC-like congestion avoidance with slow start, fast retransmit/recovery,
/// and a soft timeout collapse (to `ssthresh`, not to one MSS).
#[derive(Debug, Clone)]
pub struct CubicController {
    mss: usize,
    max_cwnd: usize,
    dup_ack_threshold: u32,
    cwnd: f64,
    ssthresh: f64,
    phase: CongestionPhase,
    dup_ack_count: u32,
    fast_retransmit_sent: bool,
    rtt_min: Duration,
}

impl CubicController {
    pub fn new(mss: usize, max_cwnd: usize, dup_ack_threshold: u32) -> Self {
        Self {
            mss,
            max_cwnd,
            dup_ack_threshold,
            cwnd: mss as f64,
            ssthresh: f64::MAX,
            phase: CongestionPhase::SlowStart,
            dup_ack_count: 0,
            fast_retransmit_sent: false,
            rtt_min: Duration::from_millis(1),
        }
    }

    fn min_cwnd(&self) -> f64 {
        self.mss as f64
    }

    fn min_ssthresh(&self) -> f64 {
        2.0 * self.mss as f64
    }

    /// Shared multiplicative-decrease + fast-convergence bookkeeping for a
    /// congestion event (fast retransmit or timeout).
    fn on_congestion_event(&mut self, now: Instant) {
        let pre_event_cwnd = self.cwnd;
        let prev_w_max = match self.phase {
            CongestionPhase::CongestionAvoidance { w_max, .. } => w_max,
            CongestionPhase::SlowStart => pre_event_cwnd,
        };

        self.ssthresh = (self.cwnd * CUBIC_BETA).max(self.min_ssthresh());
        self.cwnd = self.ssthresh;
        tracing::trace!(cwnd = self.cwnd, ssthresh = self.ssthresh, "congestion event");

        // Fast convergence: yield faster to a newer competing flow.
        let w_max = if pre_event_cwnd < prev_w_max {
            pre_event_cwnd * (1.0 + CUBIC_BETA) / 2.0
        } else {
            pre_event_cwnd
        };

        let k = cube_root(w_max * (1.0 - CUBIC_BETA) / CUBIC_C / self.mss as f64);
        self.phase = CongestionPhase::CongestionAvoidance {
            t_last_congestion: now,
            w_max,
            k,
        };
        self.dup_ack_count = 0;
    }
}

impl CongestionController for CubicController {
    fn on_new_ack(&mut self, acked_bytes: usize, now: Instant) {
        self.dup_ack_count = 0;
        self.fast_retransmit_sent = false;
        match self.phase {
            CongestionPhase::SlowStart => {
                self.cwnd += acked_bytes as f64;
                if self.cwnd >= self.ssthresh {
                    // ssthresh is only finite after a congestion event, in
                    // which case on_congestion_event already set the phase;
                    // this only fires for the degenerate case of ssthresh
                    // being lowered externally before any loss.
                    self.phase = CongestionPhase::CongestionAvoidance {
                        t_last_congestion: now,
                        w_max: self.cwnd,
                        k: 0.0,
                    };
                }
            }
            CongestionPhase::CongestionAvoidance {
                t_last_congestion,
                w_max,
                k,
            } => {
                let t = now.saturating_duration_since(t_last_congestion).as_secs_f64();
                let mss = self.mss as f64;
                let w_max_segs = w_max / mss;

                let w_cubic = CUBIC_C * (t - k).powi(3) + w_max_segs;
                let w_tcp = (self.ssthresh / mss)
                    + (3.0 * CUBIC_BETA / (2.0 - CUBIC_BETA)) * (t / self.rtt_min.as_secs_f64());
                let w_target = w_cubic.max(w_tcp) * mss;

                let delta = (w_target - self.cwnd).max(0.0) * acked_bytes as f64 / self.cwnd.max(1.0);
                self.cwnd = (self.cwnd + delta).min(self.max_cwnd as f64);
            }
        }
        self.cwnd = self.cwnd.max(self.min_cwnd());
    }

    fn on_dup_ack(&mut self) -> bool {
        self.dup_ack_count += 1;
        if self.dup_ack_count >= self.dup_ack_threshold && !self.fast_retransmit_sent {
            self.fast_retransmit_sent = true;
            true
        } else {
            false
        }
    }

    fn on_fast_retransmit(&mut self, now: Instant) {
        self.on_congestion_event(now);
    }

    fn on_timeout(&mut self, now: Instant) {
        self.on_congestion_event(now);
    }

    fn current_cwnd(&self) -> usize {
        self.cwnd.round() as usize
    }

    fn ssthresh(&self) -> usize {
        if self.ssthresh.is_finite() {
            self.ssthresh.round() as usize
        } else {
            usize::MAX
        }
    }

    fn phase_name(&self) -> &'static str {
        match self.phase {
            CongestionPhase::SlowStart => "slow_start",
            CongestionPhase::CongestionAvoidance { .. } => "congestion_avoidance",
        }
    }

    /// Feed the controller's view of the session's minimum RTT (the caller
    /// falls back to `srtt` until the first real sample arrives).
    fn update_rtt_min(&mut self, rtt_min: Duration) {
        if rtt_min > Duration::ZERO {
            self.rtt_min = rtt_min;
        }
    }
}

/// Pins the congestion window to a fixed byte count, as honored by the
/// CLI's sender-window-size hint. ACK/loss events are still tallied (for
/// diagnostics) but never change the window.
#[derive(Debug, Clone)]
pub struct FixedWindowController {
    cwnd: usize,
}

impl FixedWindowController {
    pub fn new(window_bytes: usize) -> Self {
        Self { cwnd: window_bytes.max(1) }
    }
}

impl CongestionController for FixedWindowController {
    fn on_new_ack(&mut self, _acked_bytes: usize, _now: Instant) {}
    fn on_dup_ack(&mut self) -> bool {
        false
    }
    fn on_fast_retransmit(&mut self, _now: Instant) {}
    fn on_timeout(&mut self, _now: Instant) {}
    fn current_cwnd(&self) -> usize {
        self.cwnd
    }
    fn ssthresh(&self) -> usize {
        usize::MAX
    }
    fn phase_name(&self) -> &'static str {
        "fixed"
    }
}

fn cube_root(x: f64) -> f64 {
    if x >= 0.0 {
        x.powf(1.0 / 3.0)
    } else {
        -(-x).powf(1.0 / 3.0)
    }
}
