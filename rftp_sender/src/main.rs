mod diagnostics;
mod logging;
mod net;

use std::fs;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use clap::Parser;
use rftp_core::constants::{HANDSHAKE_REQUEST_BYTE, MAX_DATAGRAM};
use rftp_core::error::CoreError;
use rftp_core::segment::Segment;
use rftp_engine::config::EngineConfig;
use rftp_engine::sender::{AckEvent, SenderEngine};

use crate::diagnostics::CwndLog;
use crate::net::UdpTransport;

/// Reliable, congestion-controlled file sender.
///
/// Binds to `ip:port`, waits for the receiver's file-request handshake, and
/// streams `data.txt` from the working directory exactly once.
#[derive(Parser)]
#[command(name = "rftp_sender", about = "Reliable congestion-controlled file sender")]
struct Cli {
    /// Local IP address to bind.
    ip: String,
    /// Local UDP port to bind.
    port: u16,
    /// Sender window-size hint in bytes. 0 selects the CUBIC congestion
    /// controller; a positive value pins a fixed-window controller at that cap.
    window_size_hint: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let bind_addr: SocketAddr = format!("{}:{}", cli.ip, cli.port)
        .parse()
        .context("invalid bind address")?;

    let payload = fs::read("data.txt").map_err(CoreError::SourceOpenFailed)?;
    tracing::info!(bytes = payload.len(), "loaded payload from data.txt");

    let config = EngineConfig::builder()
        .fixed_window(if cli.window_size_hint > 0 {
            Some(cli.window_size_hint)
        } else {
            None
        })
        .build();

    let transport = UdpTransport::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "sender listening for handshake request");

    let peer = await_handshake(&transport).await?;
    tracing::info!(peer = %peer, "handshake received, beginning transfer");

    match run_session(transport, peer, Bytes::from(payload), config, cli.port).await {
        Ok(()) => {
            tracing::info!("transfer complete");
            Ok(())
        }
        Err(err) => {
            tracing::error!(error = %err, "transfer aborted");
            std::process::exit(1);
        }
    }
}

/// Waits for the receiver's single-byte file-request datagram. The first
/// data segment sent afterward is treated as the handshake response; there
/// is no explicit reply to the request itself.
async fn await_handshake(transport: &UdpTransport) -> Result<SocketAddr> {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, addr) = transport.recv_from(&mut buf).await?;
        if len == 1 && buf[0] == HANDSHAKE_REQUEST_BYTE {
            return Ok(addr);
        }
        tracing::debug!(len, %addr, "ignoring non-handshake datagram while waiting");
    }
}

/// What an inbound datagram turned out to be, once decoded and fed to the
/// engine.
enum Inbound {
    Ignored,
    Retransmit(Segment),
    Done,
}

/// Decode and apply one inbound datagram. Malformed datagrams (short header,
/// invalid SACK) are logged and dropped rather than propagated — a single
/// corrupted datagram must not abort the session.
fn process_inbound_datagram(engine: &mut SenderEngine, data: &[u8], now: Instant) -> Result<Inbound> {
    let seg = match Segment::decode(data) {
        Ok(seg) => seg,
        Err(err) => {
            tracing::debug!(error = %err, "dropping malformed datagram");
            return Ok(Inbound::Ignored);
        }
    };
    if !seg.is_ack() {
        return Ok(Inbound::Ignored);
    }
    match engine.process_ack(&seg, now)? {
        AckEvent::Done => Ok(Inbound::Done),
        AckEvent::DuplicateAck {
            fast_retransmit: Some(segment),
        } => Ok(Inbound::Retransmit(segment)),
        _ => Ok(Inbound::Ignored),
    }
}

/// Drains every currently-readable datagram from `transport` without
/// blocking, so a burst of ACKs arriving right at the RTO deadline is fully
/// applied before any retransmission decision is made. Returns `true` if the
/// session completed while draining.
async fn drain_ready_acks(
    transport: &UdpTransport,
    peer: SocketAddr,
    engine: &mut SenderEngine,
    recv_buf: &mut [u8],
) -> Result<bool> {
    loop {
        match transport.try_recv_from(recv_buf) {
            Ok((len, from)) => {
                if from != peer {
                    continue;
                }
                match process_inbound_datagram(engine, &recv_buf[..len], Instant::now())? {
                    Inbound::Done => return Ok(true),
                    Inbound::Retransmit(segment) => {
                        let wire = segment.encode()?;
                        transport.send_to(&wire, peer).await?;
                    }
                    Inbound::Ignored => {}
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(false),
            Err(err) => return Err(err.into()),
        }
    }
}

async fn run_session(
    transport: UdpTransport,
    peer: SocketAddr,
    payload: Bytes,
    config: EngineConfig,
    port: u16,
) -> Result<()> {
    let watchdog = config.sender_watchdog;
    let session_start = Instant::now();
    let mut engine = SenderEngine::new(payload, config, session_start);
    let mut recv_buf = vec![0u8; MAX_DATAGRAM];
    let mut cwnd_log = CwndLog::new(port, session_start);

    loop {
        let now = Instant::now();
        if now.saturating_duration_since(engine.last_activity()) > watchdog {
            return Err(anyhow!("receiver silent past watchdog ({watchdog:?})"));
        }

        while let Some(seg) = engine.emit_next(now) {
            let wire = seg.encode()?;
            transport.send_to(&wire, peer).await?;
        }
        cwnd_log.record(
            now,
            engine.current_cwnd(),
            engine.congestion_ssthresh(),
            engine.congestion_state(),
        );

        if drain_ready_acks(&transport, peer, &mut engine, &mut recv_buf).await? {
            tracing::debug!(cwnd = engine.current_cwnd(), "eof acknowledged");
            return Ok(());
        }

        let deadline = engine.next_deadline(Instant::now(), Duration::from_millis(100));
        let sleep = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline));

        tokio::select! {
            res = transport.recv_from(&mut recv_buf) => {
                let (len, from) = res?;
                if from != peer {
                    continue;
                }
                match process_inbound_datagram(&mut engine, &recv_buf[..len], Instant::now())? {
                    Inbound::Done => {
                        tracing::debug!(cwnd = engine.current_cwnd(), "eof acknowledged");
                        return Ok(());
                    }
                    Inbound::Retransmit(segment) => {
                        let wire = segment.encode()?;
                        transport.send_to(&wire, peer).await?;
                    }
                    Inbound::Ignored => {}
                }
            }
            _ = sleep => {
                // A burst of ACKs may have landed in the same instant the
                // RTO elapsed; drain them before treating this as a genuine
                // timeout.
                if drain_ready_acks(&transport, peer, &mut engine, &mut recv_buf).await? {
                    tracing::debug!(cwnd = engine.current_cwnd(), "eof acknowledged");
                    return Ok(());
                }
                let retransmits = engine.handle_timeout(Instant::now())?;
                if !retransmits.is_empty() {
                    tracing::debug!(count = retransmits.len(), rto = ?engine.rto(), "retransmitting after timeout");
                }
                for seg in retransmits {
                    let wire = seg.encode()?;
                    transport.send_to(&wire, peer).await?;
                }
            }
        }
    }
}
