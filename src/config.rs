//! Command-line configuration for both binaries. Validation mirrors the
//! constraints the original parser enforced (port range, `max_win`
//! divisibility, `rto` sign, probability range), surfaced as
//! [`ConfigError`] instead of a bare process exit.

use clap::Parser;

use crate::error::ConfigError;

const MIN_PORT: u16 = 49152;
const MAX_PORT: u16 = 65535;

fn parse_port(s: &str) -> Result<u16, String> {
    let port: u32 = s.parse().map_err(|_| ConfigError::NotNumeric(s.to_string()).to_string())?;
    if port < MIN_PORT as u32 || port > MAX_PORT as u32 {
        return Err(ConfigError::PortOutOfRange { port, min: MIN_PORT, max: MAX_PORT }.to_string());
    }
    Ok(port as u16)
}

fn parse_max_win(s: &str) -> Result<u32, String> {
    let max_win: u32 = s.parse().map_err(|_| ConfigError::BadWindow(0).to_string())?;
    if max_win < 1000 || max_win % 1000 != 0 {
        return Err(ConfigError::BadWindow(max_win).to_string());
    }
    Ok(max_win)
}

fn parse_rto(s: &str) -> Result<u64, String> {
    let rto: i64 = s.parse().map_err(|_| ConfigError::BadRto(s.to_string()).to_string())?;
    if rto < 0 {
        return Err(ConfigError::BadRto(s.to_string()).to_string());
    }
    Ok(rto as u64)
}

fn parse_prop(s: &str) -> Result<f64, String> {
    let p: f64 = s.parse().map_err(|_| ConfigError::BadProbability(f64::NAN).to_string())?;
    if !(0.0..=1.0).contains(&p) {
        return Err(ConfigError::BadProbability(p).to_string());
    }
    Ok(p)
}

/// `sender <sender_port> <rcvr_port> <txt_file_to_send> <max_win> <rto> <flp> <rlp>`
#[derive(Debug, Parser)]
#[command(name = "sender", about = "STP sender")]
pub struct SenderArgs {
    #[arg(value_parser = parse_port)]
    pub sender_port: u16,

    #[arg(value_parser = parse_port)]
    pub rcvr_port: u16,

    pub txt_file_to_send: String,

    #[arg(value_parser = parse_max_win)]
    pub max_win: u32,

    /// Retransmission timeout, milliseconds.
    #[arg(value_parser = parse_rto)]
    pub rto: u64,

    /// Forward-loss probability.
    #[arg(value_parser = parse_prop)]
    pub flp: f64,

    /// Reverse-loss probability.
    #[arg(value_parser = parse_prop)]
    pub rlp: f64,
}

/// `receiver <rcvr_port> <sender_port> <txt_file_received> <max_win>`
#[derive(Debug, Parser)]
#[command(name = "receiver", about = "STP receiver")]
pub struct ReceiverArgs {
    #[arg(value_parser = parse_port)]
    pub rcvr_port: u16,

    #[arg(value_parser = parse_port)]
    pub sender_port: u16,

    pub txt_file_received: String,

    #[arg(value_parser = parse_max_win)]
    pub max_win: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn accepts_well_formed_sender_args() {
        let args = SenderArgs::try_parse_from([
            "sender", "50000", "50001", "file.txt", "2000", "1000", "0.1", "0.2",
        ])
        .unwrap();
        assert_eq!(args.sender_port, 50000);
        assert_eq!(args.max_win, 2000);
        assert_eq!(args.rto, 1000);
    }

    #[test]
    fn rejects_port_below_range() {
        let err = SenderArgs::try_parse_from([
            "sender", "80", "50001", "file.txt", "2000", "1000", "0.1", "0.2",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_window_not_multiple_of_mss() {
        let err = SenderArgs::try_parse_from([
            "sender", "50000", "50001", "file.txt", "1500", "1000", "0.1", "0.2",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_negative_rto() {
        let err = SenderArgs::try_parse_from([
            "sender", "50000", "50001", "file.txt", "2000", "-1", "0.1", "0.2",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_probability_out_of_range() {
        let err = SenderArgs::try_parse_from([
            "sender", "50000", "50001", "file.txt", "2000", "1000", "1.5", "0.2",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn accepts_well_formed_receiver_args() {
        let args =
            ReceiverArgs::try_parse_from(["receiver", "50001", "50000", "out.txt", "1000"])
                .unwrap();
        assert_eq!(args.rcvr_port, 50001);
        assert_eq!(args.max_win, 1000);
    }
}
