mod logging;
mod net;

use std::fs::File;
use std::io::Write;
use std::net::SocketAddr;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use rftp_core::constants::{HANDSHAKE_REQUEST_BYTE, MAX_DATAGRAM};
use rftp_core::error::CoreError;
use rftp_core::segment::Segment;
use rftp_engine::config::EngineConfig;
use rftp_engine::receiver::ReceiverEngine;

use crate::net::UdpTransport;

/// Reliable, congestion-controlled file receiver.
///
/// Requests a transfer from `server_ip:server_port` and writes the reply
/// stream to `<output_prefix>received_data.txt`.
#[derive(Parser)]
#[command(name = "rftp_receiver", about = "Reliable congestion-controlled file receiver")]
struct Cli {
    /// Sender's IP address.
    server_ip: String,
    /// Sender's UDP port.
    server_port: u16,
    /// Prefix for the output file, written as `<prefix>received_data.txt`.
    output_prefix: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let server_addr: SocketAddr = format!("{}:{}", cli.server_ip, cli.server_port)
        .parse()
        .context("invalid server address")?;

    let local_addr: SocketAddr = if server_addr.is_ipv4() {
        "0.0.0.0:0".parse().unwrap()
    } else {
        "[::]:0".parse().unwrap()
    };
    let transport = UdpTransport::bind(local_addr).await?;
    tracing::info!(local = %transport.local_addr()?, server = %server_addr, "requesting transfer");

    let config = EngineConfig::default();
    let first_segment = request_transfer(&transport, server_addr, &config).await?;

    let output_path = format!("{}received_data.txt", cli.output_prefix);
    let mut sink = File::create(&output_path).map_err(CoreError::SinkOpenFailed)?;
    tracing::info!(path = %output_path, "writing received data");

    match run_session(transport, server_addr, config, first_segment, &mut sink).await {
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

/// Sends the single-byte file-request datagram, retrying with the configured
/// timeout up to `handshake_retries` times. The first data segment received
/// in response doubles as the handshake acknowledgment.
async fn request_transfer(
    transport: &UdpTransport,
    server_addr: SocketAddr,
    config: &EngineConfig,
) -> Result<Segment> {
    let request = [HANDSHAKE_REQUEST_BYTE];
    let mut buf = vec![0u8; MAX_DATAGRAM];

    for attempt in 1..=config.handshake_retries {
        transport.send_to(&request, server_addr).await?;
        tracing::debug!(attempt, "sent file-request handshake");

        let recv = tokio::time::timeout(config.handshake_timeout, transport.recv_from(&mut buf)).await;
        match recv {
            Ok(Ok((len, from))) if from == server_addr => {
                return Segment::decode(&buf[..len]).context("decoding handshake response");
            }
            Ok(Ok(_)) => continue, // datagram from an unexpected peer
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                tracing::debug!(attempt, "handshake attempt timed out");
            }
        }
    }

    Err(anyhow!(
        "sender did not respond to the file-request handshake after {} attempts",
        config.handshake_retries
    ))
}

async fn run_session(
    transport: UdpTransport,
    peer: SocketAddr,
    config: EngineConfig,
    first_segment: Segment,
    sink: &mut File,
) -> Result<()> {
    let watchdog = config.receiver_watchdog;
    let mut engine = ReceiverEngine::new(&config, Instant::now());
    let mut recv_buf = vec![0u8; MAX_DATAGRAM];

    let mut pending = Some(first_segment);

    loop {
        let now = Instant::now();
        if now.saturating_duration_since(engine.last_activity()) > watchdog {
            return Err(anyhow!("sender silent past watchdog ({watchdog:?})"));
        }

        let seg = if let Some(seg) = pending.take() {
            seg
        } else {
            let deadline = engine.last_activity() + watchdog;
            let sleep = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline));
            tokio::select! {
                res = transport.recv_from(&mut recv_buf) => {
                    let (len, from) = res?;
                    if from != peer {
                        continue;
                    }
                    match Segment::decode(&recv_buf[..len]) {
                        Ok(seg) => seg,
                        Err(err) => {
                            tracing::debug!(error = %err, "dropping malformed datagram");
                            continue;
                        }
                    }
                }
                _ = sleep => {
                    return Err(anyhow!("sender silent past watchdog ({watchdog:?})"));
                }
            }
        };

        let step = engine.process_segment(&seg, Instant::now());
        for drained in &step.drained {
            if drained.is_eof {
                continue; // sentinel payload, not part of the file
            }
            sink.write_all(&drained.payload)
                .map_err(CoreError::SinkWriteFailed)?;
        }

        let wire = step.ack.encode()?;
        transport.send_to(&wire, peer).await?;

        if engine.is_done() {
            sink.flush().map_err(CoreError::SinkWriteFailed)?;
            return Ok(());
        }
    }
}
