//! The fixed-format, append-only protocol event log mandated for each
//! side: one line per send/receive/drop, columns fixed-width so the log
//! is diffable across runs.
//!
//! ```text
//! action(3) time_ms(7) segtype(4) seqno(5) bytes
//! ```

use std::fs::File;
use std::io::Write;
use std::sync::Mutex;

use crate::codec::SegmentType;
use crate::error::StpError;
use crate::transport::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogAction {
    Send,
    Receive,
    Dropped,
}

impl LogAction {
    fn as_str(&self) -> &'static str {
        match self {
            LogAction::Send => "snd",
            LogAction::Receive => "rcv",
            LogAction::Dropped => "drp",
        }
    }
}

struct Inner {
    file: File,
    start_time_ms: Option<f64>,
}

/// One event log, shared by every thread on this side of the connection.
/// Log emission is serialized so that racing senders/receivers never
/// interleave partial lines.
pub struct ProtocolLog {
    inner: Mutex<Inner>,
}

impl ProtocolLog {
    /// Truncates (or creates) `path`, matching the driver's "reset the
    /// log" step at startup.
    pub fn create(path: &str) -> Result<ProtocolLog, StpError> {
        let file = File::create(path).map_err(StpError::from_io)?;
        Ok(ProtocolLog { inner: Mutex::new(Inner { file, start_time_ms: None }) })
    }

    pub fn log(
        &self,
        clock: &dyn Clock,
        action: LogAction,
        segtype: SegmentType,
        seqno: u16,
        num_bytes: usize,
    ) {
        let mut inner = self.inner.lock().unwrap();

        let now = clock.now_ms();
        let time_diff = match inner.start_time_ms {
            None => {
                inner.start_time_ms = Some(now);
                0.0
            }
            Some(start) => now - start,
        };

        let line = format!(
            "{:<3} {:<7.2} {:<4} {:>5} {}\n",
            action.as_str(),
            time_diff,
            segtype.log_name(),
            seqno,
            num_bytes
        );

        // Best-effort: a log write failure must not take down the
        // protocol engine.
        let _ = inner.file.write_all(line.as_bytes());
    }
}
