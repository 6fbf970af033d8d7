pub mod constants;
pub mod error;
pub mod segment;

pub use constants::*;
pub use error::CoreError;
pub use segment::{Segment, SegmentFlags};
