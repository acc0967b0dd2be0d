//! STP ("Simple Transport Protocol"): a reliable, byte-oriented,
//! unidirectional file-transfer protocol layered over a connectionless
//! datagram substrate, with sequence numbers, cumulative acknowledgements,
//! single-timer retransmission, fast retransmit, a fixed-size sliding
//! window and a three-phase connection lifecycle.

pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod loss;
pub mod receiver;
pub mod sender;
pub mod seq;
pub mod timer;
pub mod transport;

pub use codec::{Segment, SegmentType, MSS};
pub use error::{ConfigError, StpError};
