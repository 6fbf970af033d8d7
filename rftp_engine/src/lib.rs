//! Pure transport engine: RTT estimation, the retransmission queue, CUBIC
//! congestion control, the reassembly buffer, and the sender/receiver state
//! machines built on top of them. No sockets, no sleeping, no wall-clock
//! reads — every step function is `Instant`-parameterized so a driver
//! (real or a test harness) supplies time and gets segments back.

pub mod config;
pub mod congestion;
pub mod reassembly;
pub mod retransmit_queue;
pub mod receiver;
pub mod rtt;
pub mod sender;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use congestion::{CongestionController, CubicController, FixedWindowController};
pub use reassembly::{AcceptOutcome, Drained, ReassemblyBuffer};
pub use receiver::{ReceiveStep, ReceiverEngine};
pub use retransmit_queue::{AckOutcome, RetransmitQueue};
pub use rtt::RttEstimator;
pub use sender::{AckEvent, SenderEngine};
