use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use stp::config::ReceiverArgs;
use stp::logging::ProtocolLog;
use stp::receiver::{self, ReceiverConfig};
use stp::transport::{FileWriterSink, SystemClock, UdpTransport};

fn main() {
    tracing_subscriber::fmt::init();

    let args = ReceiverArgs::parse();

    let log = match ProtocolLog::create("receiver_log.txt") {
        Ok(log) => Arc::new(log),
        Err(e) => {
            eprintln!("could not open receiver_log.txt: {e}");
            std::process::exit(1);
        }
    };

    let sink = match FileWriterSink::create(&args.txt_file_received) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            eprintln!("could not open {}: {e}", args.txt_file_received);
            std::process::exit(2);
        }
    };

    let transport = match UdpTransport::connect(args.rcvr_port, args.sender_port) {
        Ok(t) => Arc::new(t),
        Err(e) => {
            eprintln!("could not bind 127.0.0.1:{}: {e}", args.rcvr_port);
            std::process::exit(1);
        }
    };

    info!(rcvr_port = args.rcvr_port, sender_port = args.sender_port, "starting STP receiver");

    let clock = Arc::new(SystemClock::new());
    let config = ReceiverConfig { max_win: args.max_win };

    match receiver::run(transport, clock, log, sink, config) {
        Ok(()) => {
            info!("transfer complete");
        }
        Err(e) => {
            error!(error = %e, "receiver terminated with an error");
            std::process::exit(1);
        }
    }
}
