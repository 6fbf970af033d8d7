use std::time::Duration;

use rftp_core::constants::{RTT_ALPHA, RTT_BETA};

/// Classical smoothed RTT estimator (RFC 6298-style), with a multiplicative
/// RTO backoff track for timeout-triggered retransmissions.
///
/// Deterministic and clock-free: callers pass samples in directly rather
/// than this type reading `Instant::now()`, so the congestion/timeout
/// logic that consumes it can be driven by a test harness with fabricated
/// timings.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    srtt: Option<Duration>,
    rttvar: Duration,
    rtt_min: Option<Duration>,
    rto: Duration,
    min_rto: Duration,
    max_rto: Duration,
}

impl RttEstimator {
    pub fn new(initial_rto: Duration, min_rto: Duration, max_rto: Duration) -> Self {
        Self {
            srtt: None,
            rttvar: Duration::ZERO,
            rtt_min: None,
            rto: initial_rto,
            min_rto,
            max_rto,
        }
    }

    /// Feed one RTT sample. Callers must uphold Karn's rule themselves: never
    /// call this for a segment that was retransmitted.
    pub fn sample(&mut self, rtt: Duration) {
        match self.srtt {
            None => {
                self.srtt = Some(rtt);
                self.rttvar = rtt / 2;
            }
            Some(srtt) => {
                let delta = if rtt > srtt { rtt - srtt } else { srtt - rtt };
                self.rttvar = duration_lerp(self.rttvar, delta, RTT_BETA);
                self.srtt = Some(duration_lerp(srtt, rtt, RTT_ALPHA));
            }
        }

        self.rtt_min = Some(match self.rtt_min {
            Some(min) => min.min(rtt),
            None => rtt,
        });

        self.recompute_rto();
    }

    /// Multiplicatively back off the RTO after a timeout-triggered
    /// retransmission (factor 1.5, capped at `max_rto`). The backoff is
    /// replaced by the smoothed value on the next valid sample.
    pub fn backoff(&mut self) {
        let scaled = self.rto.mul_f64(1.5);
        self.rto = scaled.min(self.max_rto).max(self.min_rto);
    }

    fn recompute_rto(&mut self) {
        let base = match self.srtt {
            Some(srtt) => srtt + self.rttvar * 4,
            None => self.rto,
        };
        self.rto = base.clamp(self.min_rto, self.max_rto);
    }

    pub fn rto(&self) -> Duration {
        self.rto
    }

    pub fn srtt(&self) -> Duration {
        self.srtt.unwrap_or(self.rto)
    }

    /// Minimum observed RTT over the session, falling back to `srtt` (and
    /// then to the current RTO) before any sample has arrived.
    pub fn rtt_min(&self) -> Duration {
        self.rtt_min.unwrap_or_else(|| self.srtt())
    }
}

fn duration_lerp(a: Duration, b: Duration, weight: f64) -> Duration {
    a.mul_f64(1.0 - weight) + b.mul_f64(weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rftp_core::constants::{INITIAL_RTO, MAX_RTO, MIN_RTO};

    #[test]
    fn first_sample_initializes_srtt_and_half_rttvar() {
        let mut est = RttEstimator::new(INITIAL_RTO, MIN_RTO, MAX_RTO);
        est.sample(Duration::from_millis(100));
        assert_eq!(est.srtt(), Duration::from_millis(100));
        // rto = srtt + 4*rttvar = 100 + 4*50 = 300ms
        assert_eq!(est.rto(), Duration::from_millis(300));
    }

    #[test]
    fn rto_clamped_to_bounds() {
        let mut est = RttEstimator::new(INITIAL_RTO, MIN_RTO, MAX_RTO);
        est.sample(Duration::from_micros(100));
        assert!(est.rto() >= MIN_RTO);

        est.sample(Duration::from_secs(10));
        assert!(est.rto() <= MAX_RTO);
    }

    #[test]
    fn rtt_min_tracks_minimum_over_session() {
        let mut est = RttEstimator::new(INITIAL_RTO, MIN_RTO, MAX_RTO);
        est.sample(Duration::from_millis(100));
        est.sample(Duration::from_millis(40));
        est.sample(Duration::from_millis(80));
        assert_eq!(est.rtt_min(), Duration::from_millis(40));
    }

    #[test]
    fn backoff_multiplies_rto_and_is_cleared_by_next_sample() {
        let mut est = RttEstimator::new(Duration::from_millis(200), MIN_RTO, MAX_RTO);
        let before = est.rto();
        est.backoff();
        assert_eq!(est.rto(), before.mul_f64(1.5));

        est.backoff();
        assert_eq!(est.rto(), before.mul_f64(1.5).mul_f64(1.5));

        // A valid sample replaces the backed-off value with the smoothed one.
        est.sample(Duration::from_millis(50));
        assert_ne!(est.rto(), before.mul_f64(1.5).mul_f64(1.5));
    }

    #[test]
    fn backoff_capped_at_max_rto() {
        let mut est = RttEstimator::new(MAX_RTO, MIN_RTO, MAX_RTO);
        for _ in 0..10 {
            est.backoff();
        }
        assert_eq!(est.rto(), MAX_RTO);
    }
}
