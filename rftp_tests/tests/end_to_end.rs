use rand::RngCore;

use rftp_engine::config::EngineConfig;
use rftp_tests::{run_simulation, Impairment, SimConfig};

fn random_payload(size: usize, seed: u64) -> Vec<u8> {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut buf = vec![0u8; size];
    rng.fill_bytes(&mut buf);
    buf
}

#[test]
fn clean_channel_transfers_full_payload_with_zero_retransmissions() {
    let payload = random_payload(120_000, 1);
    let outcome = run_simulation(&payload, EngineConfig::default(), SimConfig::default());

    assert_eq!(outcome.received, payload);
    assert_eq!(outcome.stats.retransmissions, 0);
}

#[test]
fn one_percent_loss_preserves_digest() {
    let payload = random_payload(120_000, 2);
    let sim = SimConfig {
        forward: Impairment {
            loss_prob: 0.01,
            ..Default::default()
        },
        seed: 7,
        ..Default::default()
    };
    let outcome = run_simulation(&payload, EngineConfig::default(), sim);

    assert_eq!(outcome.received, payload);
    assert!(outcome.stats.retransmissions > 0, "loss should force some retransmissions");
}

#[test]
fn reorder_preserves_digest_with_few_spurious_fast_retransmits() {
    // A small payload keeps the number of segments low, bounding how many
    // duplicate ACKs a reordered segment's hole can accumulate before it's
    // filled, per the documented window<=2 reordering scenario.
    let payload = random_payload(30 * 1200, 3);
    let sim = SimConfig {
        forward: Impairment {
            reorder_prob: 0.2,
            reorder_window: 2,
            ..Default::default()
        },
        seed: 11,
        ..Default::default()
    };
    let outcome = run_simulation(&payload, EngineConfig::default(), sim);

    assert_eq!(outcome.received, payload);
    assert!(
        outcome.stats.fast_retransmits <= 3,
        "reordering within a window of 2 shouldn't spuriously trigger many fast retransmits, got {}",
        outcome.stats.fast_retransmits
    );
}

#[test]
fn zero_byte_payload_transfers_cleanly() {
    let outcome = run_simulation(&[], EngineConfig::default(), SimConfig::default());
    assert!(outcome.received.is_empty());
    assert_eq!(outcome.stats.retransmissions, 0);
}

#[test]
fn payload_exactly_one_mss_is_one_data_segment_plus_eof() {
    let payload = random_payload(rftp_core::constants::MAX_PAYLOAD, 5);
    let outcome = run_simulation(&payload, EngineConfig::default(), SimConfig::default());
    assert_eq!(outcome.received, payload);
}
