//! Real-socket integration harness: drives the engines over actual loopback
//! UDP sockets through a relay that can drop, duplicate, and reorder
//! datagrams, exercising the same wire codec and `Instant`-parameterized step
//! functions the production binaries call, but timed by genuine OS sockets
//! instead of the in-process simulated channel in [`crate::run_simulation`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;

use rftp_core::segment::Segment;
use rftp_engine::config::EngineConfig;
use rftp_engine::receiver::ReceiverEngine;
use rftp_engine::sender::{AckEvent, SenderEngine};

/// Per-direction relay impairment knobs.
#[derive(Debug, Clone, Copy)]
pub struct RelayImpairment {
    pub loss_prob: f64,
    pub duplicate_prob: f64,
    pub reorder_prob: f64,
    pub reorder_delay: Duration,
}

impl Default for RelayImpairment {
    fn default() -> Self {
        Self {
            loss_prob: 0.0,
            duplicate_prob: 0.0,
            reorder_prob: 0.0,
            reorder_delay: Duration::from_millis(20),
        }
    }
}

/// Binds a relay socket and spawns a task that forwards every datagram it
/// receives to `forward_to`, applying `impairment`. Returns the relay's bind
/// address for callers to address as "the peer".
async fn spawn_relay(forward_to: SocketAddr, impairment: RelayImpairment, seed: u64) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind relay socket");
    let addr = socket.local_addr().expect("relay local addr");
    let socket = Arc::new(socket);

    tokio::spawn(async move {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut buf = vec![0u8; 2048];
        loop {
            let len = match socket.recv_from(&mut buf).await {
                Ok((len, _from)) => len,
                Err(_) => break,
            };
            if rng.gen_bool(impairment.loss_prob) {
                continue;
            }
            let datagram = buf[..len].to_vec();
            let copies = if rng.gen_bool(impairment.duplicate_prob) { 2 } else { 1 };
            for _ in 0..copies {
                if impairment.reorder_prob > 0.0 && rng.gen_bool(impairment.reorder_prob) {
                    let sock = Arc::clone(&socket);
                    let data = datagram.clone();
                    let delay = impairment.reorder_delay;
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = sock.send_to(&data, forward_to).await;
                    });
                } else {
                    let _ = socket.send_to(&datagram, forward_to).await;
                }
            }
        }
    });

    addr
}

/// Runs one sender/receiver transfer over real loopback sockets, each side
/// addressing its own relay rather than the peer directly, and returns the
/// bytes the receiver reassembled. Panics (via `timeout`/`expect`) on
/// anything the caller's test should treat as a failure.
pub async fn run_real_socket_transfer(
    payload: Vec<u8>,
    config: EngineConfig,
    forward_impairment: RelayImpairment,
    backward_impairment: RelayImpairment,
    overall_timeout: Duration,
) -> Vec<u8> {
    let sender_socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind sender socket");
    let receiver_socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind receiver socket");
    let sender_addr = sender_socket.local_addr().unwrap();
    let receiver_addr = receiver_socket.local_addr().unwrap();

    // relay_fwd carries sender -> receiver traffic; relay_bwd carries
    // receiver -> sender ACKs. Each side sends to its own relay's address,
    // which then forwards on to the real peer.
    let relay_fwd_addr = spawn_relay(receiver_addr, forward_impairment, 101).await;
    let relay_bwd_addr = spawn_relay(sender_addr, backward_impairment, 202).await;

    tokio::time::timeout(overall_timeout, async {
        let sender_task = tokio::spawn(run_sender(
            sender_socket,
            relay_fwd_addr,
            Bytes::from(payload),
            config.clone(),
        ));
        let receiver_task = tokio::spawn(run_receiver(receiver_socket, relay_bwd_addr, config));
        let (_, received) = tokio::join!(sender_task, receiver_task);
        received.expect("receiver task panicked")
    })
    .await
    .expect("real-socket transfer timed out")
}

async fn run_sender(socket: UdpSocket, peer: SocketAddr, payload: Bytes, config: EngineConfig) {
    let start = Instant::now();
    let mut engine = SenderEngine::new(payload, config, start);
    let mut buf = vec![0u8; 2048];

    loop {
        let now = Instant::now();
        while let Some(seg) = engine.emit_next(now) {
            let wire = seg.encode().expect("encodable segment");
            let _ = socket.send_to(&wire, peer).await;
        }

        let deadline = engine.next_deadline(Instant::now(), Duration::from_millis(50));
        let sleep = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline));
        tokio::select! {
            res = socket.recv_from(&mut buf) => {
                if let Ok((len, _from)) = res {
                    if let Ok(seg) = Segment::decode(&buf[..len]) {
                        if seg.is_ack() {
                            match engine.process_ack(&seg, Instant::now()) {
                                Ok(AckEvent::Done) => return,
                                Ok(AckEvent::DuplicateAck { fast_retransmit: Some(segment) }) => {
                                    let wire = segment.encode().expect("encodable segment");
                                    let _ = socket.send_to(&wire, peer).await;
                                }
                                _ => {}
                            }
                        }
                    }
                }
            }
            _ = sleep => {
                if let Ok(retransmits) = engine.handle_timeout(Instant::now()) {
                    for seg in retransmits {
                        let wire = seg.encode().expect("encodable segment");
                        let _ = socket.send_to(&wire, peer).await;
                    }
                }
            }
        }
    }
}

async fn run_receiver(socket: UdpSocket, peer: SocketAddr, config: EngineConfig) -> Vec<u8> {
    let mut engine = ReceiverEngine::new(&config, Instant::now());
    let mut buf = vec![0u8; 2048];
    let mut received = Vec::new();

    loop {
        let (len, _from) = socket.recv_from(&mut buf).await.expect("receiver socket closed");
        let seg = match Segment::decode(&buf[..len]) {
            Ok(seg) => seg,
            Err(_) => continue,
        };
        let step = engine.process_segment(&seg, Instant::now());
        for drained in step.drained {
            if !drained.is_eof {
                received.extend_from_slice(&drained.payload);
            }
        }
        let wire = step.ack.encode().expect("encodable ack");
        let _ = socket.send_to(&wire, peer).await;

        if engine.is_done() {
            return received;
        }
    }
}
