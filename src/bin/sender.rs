use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use stp::config::SenderArgs;
use stp::logging::ProtocolLog;
use stp::loss::LossSimulator;
use stp::sender::{self, SenderConfig};
use stp::transport::{SystemClock, UdpTransport};

/// Fixed seed for the loss simulator: the protocol requires reproducible
/// drops given the same `flp`/`rlp`, not operator-controlled randomness.
const LOSS_SEED: u64 = 0x5750;

fn main() {
    tracing_subscriber::fmt::init();

    let args = SenderArgs::parse();

    let file_bytes = match std::fs::read(&args.txt_file_to_send) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("could not open {}: {e}", args.txt_file_to_send);
            std::process::exit(2);
        }
    };

    let log = match ProtocolLog::create("sender_log.txt") {
        Ok(log) => Arc::new(log),
        Err(e) => {
            eprintln!("could not open sender_log.txt: {e}");
            std::process::exit(1);
        }
    };

    let transport = match UdpTransport::connect(args.sender_port, args.rcvr_port) {
        Ok(t) => Arc::new(t),
        Err(e) => {
            eprintln!("could not connect to 127.0.0.1:{}: {e}", args.rcvr_port);
            std::process::exit(1);
        }
    };

    info!(sender_port = args.sender_port, rcvr_port = args.rcvr_port, "starting STP sender");

    let clock = Arc::new(SystemClock::new());
    let loss = Arc::new(LossSimulator::new(LOSS_SEED));
    let config = SenderConfig {
        max_win: args.max_win,
        rto: Duration::from_millis(args.rto),
        flp: args.flp,
        rlp: args.rlp,
    };

    let result = sender::run(transport, clock, log, loss, file_bytes, config, None);

    match result {
        Ok(()) => {
            info!("transfer complete");
        }
        Err(e) => {
            error!(error = %e, "sender terminated with an error");
            std::process::exit(1);
        }
    }
}
