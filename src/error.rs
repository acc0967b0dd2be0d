use std::io;

/// Bad CLI arguments. Reported to the user and the process exits non-zero
/// before any socket or file is touched.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid port argument, must be numerical: {0}")]
    NotNumeric(String),

    #[error("invalid port argument, must be between {min} and {max}: {port}")]
    PortOutOfRange { port: u32, min: u16, max: u16 },

    #[error("invalid max_win, must be greater than or equal to 1000 and be a multiple of 1000 bytes: {0}")]
    BadWindow(u32),

    #[error("invalid rto, must be an unsigned integer: {0}")]
    BadRto(String),

    #[error("invalid flp/rlp, must be between 0 and 1 (inclusive): {0}")]
    BadProbability(f64),

    #[error("could not open {path}: {source}")]
    BadFile { path: String, source: io::Error },
}

/// Top-level error type for the STP engine.
#[derive(Debug, thiserror::Error)]
pub enum StpError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Header too short or an unrecognized segment type. Recovered locally:
    /// log and drop, never propagated out of the codec.
    #[error("malformed segment ({len} bytes): {reason}")]
    MalformedSegment { len: usize, reason: &'static str },

    /// The peer violated the protocol's invariants (ring slot already
    /// occupied, more than max_win in flight, ...). Not recoverable locally;
    /// the endpoint aborts.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Recoverable socket condition (would-block, interrupted). Caller
    /// should ignore and retry.
    #[error("transient socket error: {0}")]
    TransientSocketError(#[source] io::Error),

    /// Unrecoverable socket or file condition. Caller closes and exits
    /// non-zero.
    #[error("fatal socket error: {0}")]
    FatalSocketError(#[source] io::Error),
}

impl StpError {
    /// Classifies a raw I/O error the way the transport layer must: most
    /// kinds are fatal, but a would-block/timeout on a non-blocking or
    /// read-timeout socket is expected and should be retried.
    pub fn from_io(err: io::Error) -> StpError {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => {
                StpError::TransientSocketError(err)
            }
            _ => StpError::FatalSocketError(err),
        }
    }
}

impl From<io::Error> for StpError {
    fn from(err: io::Error) -> Self {
        StpError::from_io(err)
    }
}

pub type Result<T> = std::result::Result<T, StpError>;
