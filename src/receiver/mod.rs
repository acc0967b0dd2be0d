//! The receiver side of the protocol: await the handshake, reorder and
//! deliver DATA, then a graceful FIN-triggered teardown.
//!
//! Unlike the sender, the receiver's CLI carries no `flp`/`rlp`; loss is
//! simulated entirely on the sender side, in both directions (see
//! DESIGN.md). The receiver here always sends and receives truthfully.

mod buffer;

pub use buffer::{ReceiverBuffer, RecentAckCache};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use crate::codec::{Segment, SegmentType, MSS};
use crate::error::StpError;
use crate::logging::{LogAction, ProtocolLog};
use crate::seq;
use crate::timer::SingleTimer;
use crate::transport::{Clock, FileSink, Transport};

/// Maximum Segment Lifetime.
const MSL: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct ReceiverConfig {
    pub max_win: u32,
}

struct Shared {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    log: Arc<ProtocolLog>,
    sink: Arc<dyn FileSink>,
    config: ReceiverConfig,
}

/// Runs a full receiver lifecycle to completion: the handshake, the
/// ESTABLISHED reorder-and-deliver loop, and the final TIME_WAIT quiet
/// period after FIN. Blocks the calling thread until the transfer is done.
pub fn run(
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    log: Arc<ProtocolLog>,
    sink: Arc<dyn FileSink>,
    config: ReceiverConfig,
) -> Result<(), StpError> {
    let shared = Arc::new(Shared { transport, clock, log, sink, config });

    let syn_seqno = await_syn(&shared)?;
    run_established(&shared, syn_seqno)
}

fn send_ack(shared: &Shared, seqno: u16) -> Result<(), StpError> {
    shared.log.log(shared.clock.as_ref(), LogAction::Send, SegmentType::Ack, seqno, 0);
    let segment = Segment::ack(seqno);
    shared.transport.send(&segment.encode())
}

fn await_syn(shared: &Arc<Shared>) -> Result<u16, StpError> {
    loop {
        let bytes = match shared.transport.recv_timeout(POLL_INTERVAL)? {
            None => continue,
            Some(bytes) => bytes,
        };

        let seg = match Segment::decode(&bytes) {
            Ok(seg) => seg,
            Err(_) => continue, // MalformedSegment: drop silently
        };

        shared.log.log(shared.clock.as_ref(), LogAction::Receive, seg.segtype, seg.seqno, 0);

        if seg.segtype == SegmentType::Syn {
            send_ack(shared, seq::add(seg.seqno, 1))?;
            return Ok(seg.seqno);
        }
        // Anything else before the handshake completes is not a segment
        // this endpoint can act on yet; ignore and keep waiting.
    }
}

fn run_established(shared: &Arc<Shared>, syn_seqno: u16) -> Result<(), StpError> {
    let expct_seqno = seq::add(syn_seqno, 1);
    let ring_size = (shared.config.max_win as usize) / MSS;

    let mut buffer = ReceiverBuffer::new(ring_size, expct_seqno);
    let mut recent = RecentAckCache::new(2 * ring_size);

    loop {
        let bytes = match shared.transport.recv_timeout(POLL_INTERVAL)? {
            None => continue,
            Some(bytes) => bytes,
        };

        let seg = match Segment::decode(&bytes) {
            Ok(seg) => seg,
            Err(_) => continue,
        };

        shared.log.log(shared.clock.as_ref(), LogAction::Receive, seg.segtype, seg.seqno, 0);

        match seg.segtype {
            SegmentType::Data => handle_data(shared, &mut buffer, &mut recent, seg)?,
            SegmentType::Fin => return handle_fin(shared, seg.seqno),
            SegmentType::Syn => send_ack(shared, buffer.expct_seqno())?, // idempotent: lost initial ACK
            SegmentType::Ack => {} // unexpected on this side; ignore
        }
    }
}

fn handle_data(
    shared: &Arc<Shared>,
    buffer: &mut ReceiverBuffer,
    recent: &mut RecentAckCache,
    seg: Segment,
) -> Result<(), StpError> {
    if seg.seqno == buffer.expct_seqno() {
        buffer.accept_in_order(seg.payload)?;
        for (seqno, payload) in buffer.drain() {
            shared.sink.append(&payload)?;
            recent.insert(seqno);
        }
    } else if !recent.contains(seg.seqno) {
        buffer.accept_out_of_order(seg.seqno, seg.payload)?;
    }
    // else: a duplicate of an already-delivered segment; don't re-deliver
    // it, just acknowledge cumulatively below.

    send_ack(shared, buffer.expct_seqno())?;
    Ok(())
}

fn handle_fin(shared: &Arc<Shared>, fin_seqno: u16) -> Result<(), StpError> {
    send_ack(shared, seq::add(fin_seqno, 1))?;

    let discard_done = Arc::new(AtomicBool::new(false));
    let discard_done_worker = Arc::clone(&discard_done);
    let discard_transport = Arc::clone(&shared.transport);
    let discarder = thread::spawn(move || {
        while !discard_done_worker.load(Ordering::Acquire) {
            // Any segment arriving during the quiet period is ignored,
            // per the protocol's TIME_WAIT semantics.
            let _ = discard_transport.recv_timeout(Duration::from_millis(50));
        }
    });

    let (tx, rx) = mpsc::channel();
    let timer = SingleTimer::new();
    timer.arm(2 * MSL, fin_seqno, Arc::new(move |_seqno| {
        let _ = tx.send(());
    }));
    let _ = rx.recv();

    discard_done.store(true, Ordering::Release);
    discarder.join().expect("receiver discard thread panicked");

    Ok(())
}
