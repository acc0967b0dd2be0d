//! Drives a full sender/receiver pair over an in-memory channel to cover
//! the literal end-to-end scenarios and boundary cases.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use stp::logging::ProtocolLog;
use stp::loss::LossSimulator;
use stp::receiver::{self, ReceiverConfig};
use stp::sender::{self, SenderConfig};
use stp::transport::{ChannelTransport, MemorySink, SystemClock};

fn temp_log(label: &str) -> String {
    std::env::temp_dir()
        .join(format!("stp_e2e_{}_{}_{}.txt", label, std::process::id(), rand_suffix()))
        .to_str()
        .unwrap()
        .to_string()
}

// Tests must not depend on the crate's own seeded loss simulator for
// uniqueness; a cheap process-local counter keeps parallel test log paths
// from colliding.
fn rand_suffix() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

struct TransferResult {
    output: Vec<u8>,
}

fn run_transfer(
    file_bytes: Vec<u8>,
    max_win: u32,
    rto_ms: u64,
    flp: f64,
    rlp: f64,
    isn: Option<u16>,
) -> TransferResult {
    let (sender_transport, receiver_transport) = ChannelTransport::pair();

    let sink = Arc::new(MemorySink::new());

    let sender_handle = {
        let transport = sender_transport;
        let clock = Arc::new(SystemClock::new());
        let log = Arc::new(ProtocolLog::create(&temp_log("sender")).unwrap());
        let loss = Arc::new(LossSimulator::new(42));
        let config = SenderConfig { max_win, rto: Duration::from_millis(rto_ms), flp, rlp };

        thread::spawn(move || sender::run(transport, clock, log, loss, file_bytes, config, isn))
    };

    let receiver_handle = {
        let transport = receiver_transport;
        let clock = Arc::new(SystemClock::new());
        let log = Arc::new(ProtocolLog::create(&temp_log("receiver")).unwrap());
        let sink = Arc::clone(&sink);
        let config = ReceiverConfig { max_win };

        thread::spawn(move || receiver::run(transport, clock, log, sink, config))
    };

    sender_handle.join().expect("sender thread panicked").expect("sender returned an error");
    receiver_handle.join().expect("receiver thread panicked").expect("receiver returned an error");

    TransferResult { output: sink.contents() }
}

#[test]
fn scenario_hello_small_window() {
    let result = run_transfer(b"hello".to_vec(), 1000, 100, 0.0, 0.0, Some(0));
    assert_eq!(result.output, b"hello");
}

#[test]
fn scenario_two_full_segments_then_a_third() {
    let data = vec![b'A'; 2500];
    let result = run_transfer(data.clone(), 2000, 100, 0.0, 0.0, Some(0));
    assert_eq!(result.output, data);
}

#[test]
fn scenario_forward_loss_still_delivers_everything() {
    let data = vec![b'x'; 3000];
    let result = run_transfer(data.clone(), 1000, 50, 0.3, 0.0, Some(0));
    assert_eq!(result.output, data);
}

#[test]
fn scenario_reverse_loss_still_delivers_everything() {
    let data = vec![b'y'; 3000];
    let result = run_transfer(data.clone(), 1000, 50, 0.0, 0.3, Some(0));
    assert_eq!(result.output, data);
}

#[test]
fn scenario_seqno_wraps_mid_transfer() {
    let data = b"0123456789".to_vec();
    let result = run_transfer(data.clone(), 1000, 100, 0.0, 0.0, Some(65530));
    assert_eq!(result.output, data);
}

#[test]
fn scenario_mixed_loss_both_directions() {
    let data = vec![b'z'; 3000];
    let result = run_transfer(data.clone(), 1000, 50, 0.3, 0.3, Some(0));
    assert_eq!(result.output, data);
}

#[test]
fn boundary_empty_file() {
    let result = run_transfer(Vec::new(), 1000, 100, 0.0, 0.0, Some(0));
    assert!(result.output.is_empty());
}

#[test]
fn boundary_exactly_one_mss() {
    let data = vec![b'm'; 1000];
    let result = run_transfer(data.clone(), 1000, 100, 0.0, 0.0, Some(0));
    assert_eq!(result.output, data);
}

#[test]
fn boundary_not_a_multiple_of_mss() {
    let data = vec![b'n'; 2300];
    let result = run_transfer(data.clone(), 2000, 100, 0.0, 0.0, Some(0));
    assert_eq!(result.output, data);
}

#[test]
fn boundary_stop_and_wait_window() {
    let data = vec![b'w'; 3000];
    let result = run_transfer(data.clone(), 1000, 80, 0.0, 0.0, Some(0));
    assert_eq!(result.output, data);
}

#[test]
fn boundary_window_larger_than_file() {
    let data = vec![b'q'; 500];
    let result = run_transfer(data.clone(), 5000, 100, 0.0, 0.0, Some(0));
    assert_eq!(result.output, data);
}
