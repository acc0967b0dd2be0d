//! The sender side of the protocol: SYN_SENT, ESTABLISHED, CLOSING.
//!
//! ESTABLISHED runs two cooperating activities, a producer ("send loop")
//! and a consumer ("receive loop"), sharing `(SenderWindow, SingleTimer,
//! DuplicateACKCounter)` behind one mutex, exactly as laid out in the
//! design this module follows. Grounded in
//! `examples/original_source/src/sender/states.py`'s `Est_Threads`, with
//! the mutex-guarded control block pattern taken from the teacher's
//! `TcpStream`/`Manager` (`Arc<Mutex<_>>` shared between worker threads,
//! condition-variable handoff at the boundary).

mod segment_table;

pub use segment_table::{SegmentEntry, SegmentTable};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::codec::{Segment, SegmentType, MSS};
use crate::error::StpError;
use crate::logging::{LogAction, ProtocolLog};
use crate::loss::LossSimulator;
use crate::seq;
use crate::timer::SingleTimer;
use crate::transport::{Clock, Transport};

const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct SenderConfig {
    pub max_win: u32,
    pub rto: Duration,
    pub flp: f64,
    pub rlp: f64,
}

struct Shared {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    log: Arc<ProtocolLog>,
    loss: Arc<LossSimulator>,
    config: SenderConfig,
    timer: SingleTimer,
    /// First fatal error observed by a retransmission callback or the
    /// producer thread. Neither has a caller to return a `Result` to, so
    /// they stash it here for the nearest polling loop to notice and
    /// unwind with instead of retrying forever.
    failure: Mutex<Option<StpError>>,
}

impl Shared {
    fn fail(&self, err: StpError) {
        let mut guard = self.failure.lock().unwrap();
        if guard.is_none() {
            *guard = Some(err);
        }
    }

    fn has_failed(&self) -> bool {
        self.failure.lock().unwrap().is_some()
    }

    fn take_failure(&self) -> Option<StpError> {
        self.failure.lock().unwrap().take()
    }
}

struct EstInner {
    table: SegmentTable,
    send_base: usize,
    end: usize,
    dup_ack: u32,
    timer_armed: bool,
}

/// Runs a full sender lifecycle: handshake, the windowed data transfer,
/// and graceful teardown. Blocks the calling thread until the transfer
/// either completes or a fatal error occurs.
///
/// `isn_override` lets tests and the scenario in which the wire format
/// must wrap mid-transfer pin the initial sequence number; production
/// callers pass `None` and get a uniformly random ISN.
pub fn run(
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    log: Arc<ProtocolLog>,
    loss: Arc<LossSimulator>,
    file_bytes: Vec<u8>,
    config: SenderConfig,
    isn_override: Option<u16>,
) -> Result<(), StpError> {
    let isn = isn_override.unwrap_or_else(|| rand::thread_rng().gen_range(0..=u16::MAX));

    let shared = Arc::new(Shared {
        transport,
        clock,
        log,
        loss,
        config,
        timer: SingleTimer::new(),
        failure: Mutex::new(None),
    });

    let seqno_after_syn = run_syn_sent(&shared, isn)?;
    let seqno_after_est = run_established(&shared, seqno_after_syn, &file_bytes)?;
    run_closing(&shared, seqno_after_est)?;

    Ok(())
}

fn send_control_segment(shared: &Shared, segtype: SegmentType, seqno: u16) -> Result<(), StpError> {
    let drop_p = shared.config.flp;
    if shared.loss.maybe_drop(drop_p) {
        shared.log.log(shared.clock.as_ref(), LogAction::Dropped, segtype, seqno, 0);
        return Ok(());
    }
    shared.log.log(shared.clock.as_ref(), LogAction::Send, segtype, seqno, 0);
    let segment = match segtype {
        SegmentType::Syn => Segment::syn(seqno),
        SegmentType::Fin => Segment::fin(seqno),
        SegmentType::Ack => Segment::ack(seqno),
        SegmentType::Data => unreachable!("control segments never carry the DATA type"),
    };
    shared.transport.send(&segment.encode())
}

// ---------------------------------------------------------------- SYN_SENT

fn run_syn_sent(shared: &Arc<Shared>, isn: u16) -> Result<u16, StpError> {
    send_control_segment(shared, SegmentType::Syn, isn)?;

    let done = Arc::new(AtomicBool::new(false));
    let cb_shared = Arc::clone(shared);
    let cb_done = Arc::clone(&done);
    shared.timer.arm(shared.config.rto, isn, Arc::new(move |seqno| retransmit_syn(&cb_shared, &cb_done, seqno)));

    let expected_ack = seq::add(isn, 1);

    loop {
        if let Some(err) = shared.take_failure() {
            return Err(err);
        }

        let bytes = match shared.transport.recv_timeout(POLL_INTERVAL)? {
            None => continue,
            Some(bytes) => bytes,
        };

        let seg = match Segment::decode(&bytes) {
            Ok(seg) => seg,
            Err(_) => continue, // MalformedSegment: drop silently
        };

        if shared.loss.maybe_drop(shared.config.rlp) {
            shared.log.log(shared.clock.as_ref(), LogAction::Dropped, seg.segtype, seg.seqno, 0);
            continue;
        }
        shared.log.log(shared.clock.as_ref(), LogAction::Receive, seg.segtype, seg.seqno, 0);

        if seg.segtype == SegmentType::Ack && seg.seqno == expected_ack {
            done.store(true, Ordering::Release);
            shared.timer.cancel();
            return Ok(expected_ack);
        }
    }
}

/// Fires when the SYN retransmission timer expires. `done` catches the
/// race against `run_syn_sent`'s own `cancel()`: if the handshake already
/// completed, this fire is stale and must not resend or rearm.
fn retransmit_syn(shared: &Arc<Shared>, done: &Arc<AtomicBool>, seqno: u16) {
    if done.load(Ordering::Acquire) {
        return;
    }
    if let Err(err) = send_control_segment(shared, SegmentType::Syn, seqno) {
        shared.fail(err);
        return;
    }
    let cb_shared = Arc::clone(shared);
    let cb_done = Arc::clone(done);
    shared.timer.arm(shared.config.rto, seqno, Arc::new(move |seqno| retransmit_syn(&cb_shared, &cb_done, seqno)));
}

// -------------------------------------------------------------- ESTABLISHED

fn run_established(
    shared: &Arc<Shared>,
    seqno_after_syn: u16,
    file_bytes: &[u8],
) -> Result<u16, StpError> {
    let table = SegmentTable::from_bytes(file_bytes, seqno_after_syn);
    let n = table.len();

    if n == 0 {
        // Empty file: nothing to send, go straight to CLOSING (boundary
        // case: SYN -> FIN with no DATA in between).
        return Ok(seqno_after_syn);
    }

    let end = (shared.config.max_win as usize) / MSS;
    let inner = Arc::new(Mutex::new(EstInner { table, send_base: 0, end, dup_ack: 0, timer_armed: false }));

    let producer_shared = Arc::clone(shared);
    let producer_inner = Arc::clone(&inner);
    let producer = thread::spawn(move || producer_loop(producer_shared, producer_inner, n));

    let final_seqno = consumer_loop(shared, &inner, n)?;

    producer.join().expect("sender producer thread panicked");
    shared.timer.cancel();

    Ok(final_seqno)
}

fn producer_loop(shared: Arc<Shared>, inner: Arc<Mutex<EstInner>>, n: usize) {
    let mut index = 0;
    while index < n {
        if shared.has_failed() {
            // The consumer (or a retransmission callback) already recorded
            // a fatal error; stop producing, `consumer_loop` will unwind.
            return;
        }

        let ready = inner.lock().unwrap().end > index;
        if !ready {
            thread::sleep(Duration::from_millis(2));
            continue;
        }

        let (seqno, payload) = {
            let mut guard = inner.lock().unwrap();
            guard.table.entries[index].is_sent = true;
            (guard.table.entries[index].seqno, guard.table.entries[index].payload.clone())
        };

        if let Err(err) = send_data(&shared, &inner, seqno, payload) {
            shared.fail(err);
            return;
        }
        index += 1;
    }
}

enum AckOutcome {
    Advance { finished: bool },
    Retransmit(u16, Vec<u8>),
    NoOp,
}

fn consumer_loop(shared: &Arc<Shared>, inner: &Arc<Mutex<EstInner>>, n: usize) -> Result<u16, StpError> {
    loop {
        if let Some(err) = shared.take_failure() {
            return Err(err);
        }

        let bytes = match shared.transport.recv_timeout(POLL_INTERVAL)? {
            None => continue,
            Some(bytes) => bytes,
        };

        let seg = match Segment::decode(&bytes) {
            Ok(seg) => seg,
            Err(_) => continue,
        };
        if seg.segtype != SegmentType::Ack {
            continue;
        }

        if shared.loss.maybe_drop(shared.config.rlp) {
            shared.log.log(shared.clock.as_ref(), LogAction::Dropped, seg.segtype, seg.seqno, 0);
            continue;
        }
        shared.log.log(shared.clock.as_ref(), LogAction::Receive, seg.segtype, seg.seqno, 0);

        let outcome = {
            let mut guard = inner.lock().unwrap();
            let acked_index = guard.table.index_for_ack(seg.seqno);

            if acked_index > guard.send_base {
                shared.timer.cancel();
                guard.timer_armed = false;

                let last_in_window = std::cmp::min(guard.end, n.saturating_sub(1));
                if acked_index <= last_in_window && guard.table.entries[acked_index].is_sent {
                    let rearm_seqno = guard.table.entries[acked_index].seqno;
                    shared.timer.arm(shared.config.rto, rearm_seqno, make_timeout_callback(shared, inner));
                    guard.timer_armed = true;
                }

                let free_slots = acked_index - guard.send_base;
                guard.send_base = acked_index;
                guard.end += free_slots;
                guard.dup_ack = 0;

                AckOutcome::Advance { finished: acked_index == n }
            } else if acked_index == guard.send_base {
                guard.dup_ack += 1;
                if guard.dup_ack == 3 {
                    guard.dup_ack = 0;
                    let entry = &guard.table.entries[guard.send_base];
                    AckOutcome::Retransmit(entry.seqno, entry.payload.clone())
                } else {
                    AckOutcome::NoOp
                }
            } else {
                // Stale ACK for an already-acknowledged segment: ignore.
                AckOutcome::NoOp
            }
        };

        match outcome {
            AckOutcome::Advance { finished: true } => return Ok(seg.seqno),
            AckOutcome::Advance { finished: false } => {}
            AckOutcome::Retransmit(seqno, payload) => send_data(shared, inner, seqno, payload)?,
            AckOutcome::NoOp => {}
        }
    }
}

fn make_timeout_callback(
    shared: &Arc<Shared>,
    inner: &Arc<Mutex<EstInner>>,
) -> Arc<dyn Fn(u16) + Send + Sync> {
    let shared = Arc::clone(shared);
    let inner = Arc::clone(inner);
    Arc::new(move |seqno| timeout_retransmit(Arc::clone(&shared), Arc::clone(&inner), seqno))
}

fn timeout_retransmit(shared: Arc<Shared>, inner: Arc<Mutex<EstInner>>, seqno: u16) {
    let (seqno, payload) = {
        let mut guard = inner.lock().unwrap();
        guard.dup_ack = 0;
        guard.timer_armed = false;
        let idx = guard.table.seqno_map[&seqno];
        (guard.table.entries[idx].seqno, guard.table.entries[idx].payload.clone())
    };
    if let Err(err) = send_data(&shared, &inner, seqno, payload) {
        shared.fail(err);
    }
}

fn send_data(shared: &Arc<Shared>, inner: &Arc<Mutex<EstInner>>, seqno: u16, payload: Vec<u8>) -> Result<(), StpError> {
    {
        let mut guard = inner.lock().unwrap();
        if !guard.timer_armed {
            guard.timer_armed = true;
            shared.timer.arm(shared.config.rto, seqno, make_timeout_callback(shared, inner));
        }
    }

    if shared.loss.maybe_drop(shared.config.flp) {
        shared.log.log(shared.clock.as_ref(), LogAction::Dropped, SegmentType::Data, seqno, payload.len());
        return Ok(());
    }
    shared.log.log(shared.clock.as_ref(), LogAction::Send, SegmentType::Data, seqno, payload.len());
    let segment = Segment::data(seqno, payload);
    shared.transport.send(&segment.encode())
}

// ----------------------------------------------------------------- CLOSING

fn run_closing(shared: &Arc<Shared>, fin_seqno: u16) -> Result<(), StpError> {
    send_control_segment(shared, SegmentType::Fin, fin_seqno)?;

    let done = Arc::new(AtomicBool::new(false));
    let cb_shared = Arc::clone(shared);
    let cb_done = Arc::clone(&done);
    shared.timer.arm(shared.config.rto, fin_seqno, Arc::new(move |seqno| retransmit_fin(&cb_shared, &cb_done, seqno)));

    let expected_ack = seq::add(fin_seqno, 1);

    loop {
        if let Some(err) = shared.take_failure() {
            return Err(err);
        }

        let bytes = match shared.transport.recv_timeout(POLL_INTERVAL)? {
            None => continue,
            Some(bytes) => bytes,
        };

        let seg = match Segment::decode(&bytes) {
            Ok(seg) => seg,
            Err(_) => continue,
        };

        if shared.loss.maybe_drop(shared.config.rlp) {
            shared.log.log(shared.clock.as_ref(), LogAction::Dropped, seg.segtype, seg.seqno, 0);
            continue;
        }
        shared.log.log(shared.clock.as_ref(), LogAction::Receive, seg.segtype, seg.seqno, 0);

        // Late ACKs for data sent before CLOSING are logged above and
        // otherwise discarded; only the FIN-ACK ends the loop.
        if seg.segtype == SegmentType::Ack && seg.seqno == expected_ack {
            done.store(true, Ordering::Release);
            shared.timer.cancel();
            return Ok(());
        }
    }
}

/// Fires when the FIN retransmission timer expires. `done` catches the
/// race against `run_closing`'s own `cancel()`, the same way `retransmit_syn`
/// guards SYN_SENT.
fn retransmit_fin(shared: &Arc<Shared>, done: &Arc<AtomicBool>, seqno: u16) {
    if done.load(Ordering::Acquire) {
        return;
    }
    if let Err(err) = send_control_segment(shared, SegmentType::Fin, seqno) {
        shared.fail(err);
        return;
    }
    let cb_shared = Arc::clone(shared);
    let cb_done = Arc::clone(done);
    shared.timer.arm(shared.config.rto, seqno, Arc::new(move |seqno| retransmit_fin(&cb_shared, &cb_done, seqno)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelTransport, SystemClock};
    use std::time::Duration;

    fn default_config() -> SenderConfig {
        SenderConfig { max_win: 2000, rto: Duration::from_millis(100), flp: 0.0, rlp: 0.0 }
    }

    #[test]
    fn syn_sent_completes_on_matching_ack() {
        let (sender_side, peer) = ChannelTransport::pair();
        let log = Arc::new(ProtocolLog::create(&tmp_log_path("syn_sent")).unwrap());
        let loss = Arc::new(LossSimulator::new(1));
        let clock = Arc::new(SystemClock::new());

        let shared = Arc::new(Shared {
            transport: sender_side,
            clock: clock as Arc<dyn Clock>,
            log,
            loss,
            config: default_config(),
            timer: SingleTimer::new(),
            failure: Mutex::new(None),
        });

        let handle = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || run_syn_sent(&shared, 10))
        };

        let syn = peer.recv_timeout(Duration::from_secs(1)).unwrap().unwrap();
        let decoded = Segment::decode(&syn).unwrap();
        assert_eq!(decoded.segtype, SegmentType::Syn);
        assert_eq!(decoded.seqno, 10);

        peer.send(&Segment::ack(11).encode()).unwrap();

        let result = handle.join().unwrap().unwrap();
        assert_eq!(result, 11);
    }

    fn tmp_log_path(label: &str) -> String {
        std::env::temp_dir()
            .join(format!("stp_sender_test_{}_{}.txt", label, std::process::id()))
            .to_str()
            .unwrap()
            .to_string()
    }
}
