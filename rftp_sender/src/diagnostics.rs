use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Instant;

/// Appends `timestamp_s,cwnd_bytes,ssthresh_bytes,state` rows to
/// `cwnd_log_<port>.csv`, one row per congestion-state change, for offline
/// plotting. Enabled by setting `RFTP_CWND_LOG=1`; the experiment harness
/// and plotting itself stay external collaborators, this only produces the
/// raw series.
pub struct CwndLog {
    writer: Option<BufWriter<File>>,
    start: Instant,
    last_state: Option<(&'static str, usize)>,
}

impl CwndLog {
    pub fn new(port: u16, start: Instant) -> Self {
        let enabled = std::env::var("RFTP_CWND_LOG").as_deref() == Ok("1");
        let writer = enabled
            .then(|| File::create(format!("cwnd_log_{port}.csv")))
            .and_then(Result::ok)
            .map(|f| {
                let mut w = BufWriter::new(f);
                let _ = writeln!(w, "timestamp_s,cwnd_bytes,ssthresh_bytes,state");
                w
            });
        Self {
            writer,
            start,
            last_state: None,
        }
    }

    /// Records a row only when `(state, ssthresh_bytes)` differs from the
    /// last one written, matching the documented "on every congestion-state
    /// change" cadence rather than every loop tick.
    pub fn record(&mut self, now: Instant, cwnd_bytes: usize, ssthresh_bytes: usize, state: &'static str) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let current = (state, ssthresh_bytes);
        if self.last_state == Some(current) {
            return;
        }
        self.last_state = Some(current);
        let elapsed_s = now.saturating_duration_since(self.start).as_secs_f64();
        let _ = writeln!(writer, "{elapsed_s:.6},{cwnd_bytes},{ssthresh_bytes},{state}");
    }
}
