use std::time::{Duration, Instant};

use bytes::Bytes;
use rftp_core::constants::{CUBIC_BETA, MSS};
use rftp_core::segment::Segment;
use rftp_engine::config::EngineConfig;
use rftp_engine::sender::{AckEvent, SenderEngine};
use rftp_tests::{run_simulation, Impairment, SimConfig};

#[test]
fn clean_channel_cwnd_never_decreases() {
    let payload = vec![0u8; 200_000];
    let outcome = run_simulation(&payload, EngineConfig::default(), SimConfig::default());

    assert!(
        outcome.stats.cwnd_trace.windows(2).all(|w| w[1] >= w[0]),
        "cwnd should never shrink on a loss-free channel"
    );
}

#[test]
fn lossy_channel_cwnd_exhibits_a_sawtooth() {
    let payload = vec![0u8; 300_000];
    let sim = SimConfig {
        forward: Impairment {
            loss_prob: 0.01,
            ..Default::default()
        },
        seed: 9,
        ..Default::default()
    };
    let outcome = run_simulation(&payload, EngineConfig::default(), sim);

    assert!(
        outcome.stats.cwnd_trace.windows(2).any(|w| w[1] < w[0]),
        "loss should eventually reduce cwnd at least once"
    );
}

#[test]
fn third_duplicate_ack_drops_cwnd_to_documented_floor() {
    let now = Instant::now();
    let payload = Bytes::from(vec![1u8; MSS * 8]);
    let mut engine = SenderEngine::new(payload, EngineConfig::default(), now);

    while engine.emit_next(now).is_some() {}
    let cwnd_before = engine.current_cwnd() as f64;

    for _ in 0..2 {
        let event = engine.process_ack(&Segment::ack(0, None), now).unwrap();
        assert_eq!(event, AckEvent::DuplicateAck { fast_retransmit: None });
    }
    let event = engine.process_ack(&Segment::ack(0, None), now).unwrap();
    assert!(matches!(event, AckEvent::DuplicateAck { fast_retransmit: Some(_) }));

    let expected_floor = (cwnd_before * CUBIC_BETA).max(2.0 * MSS as f64);
    assert!(
        (engine.current_cwnd() as f64 - expected_floor).abs() < 1.0,
        "cwnd should soft-collapse to max(cwnd*{CUBIC_BETA}, 2*MSS)"
    );
    assert!(engine.current_cwnd() >= 2 * MSS);
}

#[test]
fn timeout_backs_off_rto_and_soft_collapses_cwnd() {
    let now = Instant::now();
    let mut engine = SenderEngine::new(Bytes::from_static(b"hello world"), EngineConfig::default(), now);
    engine.emit_next(now);

    let rto_before = engine.rto();
    let later = now + rto_before + Duration::from_millis(1);
    let retransmitted = engine.handle_timeout(later).expect("below retransmit cap");

    assert_eq!(retransmitted.len(), 1);
    assert!(engine.rto() > rto_before, "RTO should back off after a timeout");
}
