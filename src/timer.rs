//! A single one-shot retransmission timer, supporting arm/cancel/rearm,
//! backed by one long-lived worker thread per endpoint.
//!
//! Only the oldest unacknowledged segment is ever timed; the owner rearms
//! the timer on whatever seqno is now oldest rather than keeping one timer
//! per in-flight segment. Each arm is tagged with a generation counter so
//! that a fire racing a `cancel()`/`rearm()` can recognize it is stale and
//! become a no-op, per the cancellation-safety requirement on this timer.
//!
//! Grounded in the teacher's `Condvar::wait_while` pattern used for its
//! own blocking consumers.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

type Callback = dyn Fn(u16) + Send + Sync;

struct Armed {
    generation: u64,
    deadline: Instant,
    seqno: u16,
    callback: Arc<Callback>,
}

struct State {
    generation: u64,
    armed: Option<Armed>,
    shutdown: bool,
}

/// A handle to the background timer thread. Dropping the last handle
/// signals the worker to exit.
pub struct SingleTimer {
    state: Arc<Mutex<State>>,
    cvar: Arc<Condvar>,
    worker: Option<thread::JoinHandle<()>>,
}

impl SingleTimer {
    pub fn new() -> SingleTimer {
        let state = Arc::new(Mutex::new(State { generation: 0, armed: None, shutdown: false }));
        let cvar = Arc::new(Condvar::new());

        let worker_state = Arc::clone(&state);
        let worker_cvar = Arc::clone(&cvar);
        let worker = thread::spawn(move || Self::run(worker_state, worker_cvar));

        SingleTimer { state, cvar, worker: Some(worker) }
    }

    fn run(state: Arc<Mutex<State>>, cvar: Arc<Condvar>) {
        let mut guard = state.lock().unwrap();
        loop {
            if guard.shutdown {
                return;
            }

            match &guard.armed {
                None => {
                    guard = cvar.wait(guard).unwrap();
                }
                Some(armed) => {
                    let deadline = armed.deadline;
                    let generation = armed.generation;
                    let now = Instant::now();

                    if now >= deadline {
                        let seqno = armed.seqno;
                        let callback = Arc::clone(&armed.callback);

                        // Stale fires (generation changed underneath us
                        // while the callback runs without the lock held)
                        // are simply dropped: clearing the slot here only
                        // if it's still ours.
                        if guard.armed.as_ref().map(|a| a.generation) == Some(generation) {
                            guard.armed = None;
                        }

                        drop(guard);
                        callback(seqno);
                        guard = state.lock().unwrap();
                    } else {
                        let (g, timeout_result) =
                            cvar.wait_timeout(guard, deadline - now).unwrap();
                        guard = g;
                        let _ = timeout_result;
                    }
                }
            }
        }
    }

    /// Arms the timer for `seqno`, firing `callback(seqno)` after `rto` if
    /// not cancelled or rearmed first. Any previously armed timer is
    /// implicitly replaced (its generation becomes stale).
    pub fn arm(&self, rto: Duration, seqno: u16, callback: Arc<Callback>) {
        let mut state = self.state.lock().unwrap();
        state.generation += 1;
        state.armed = Some(Armed {
            generation: state.generation,
            deadline: Instant::now() + rto,
            seqno,
            callback,
        });
        self.cvar.notify_all();
    }

    /// Equivalent to `arm`, named separately to match the protocol's own
    /// vocabulary for re-arming on window advance / timeout.
    pub fn rearm(&self, rto: Duration, seqno: u16, callback: Arc<Callback>) {
        self.arm(rto, seqno, callback);
    }

    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap();
        state.generation += 1;
        state.armed = None;
        self.cvar.notify_all();
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().unwrap().armed.is_some()
    }
}

impl Drop for SingleTimer {
    fn drop(&mut self) {
        {
            let mut state = self.state.lock().unwrap();
            state.shutdown = true;
            state.armed = None;
        }
        self.cvar.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::mpsc;

    #[test]
    fn fires_after_rto() {
        let timer = SingleTimer::new();
        let (tx, rx) = mpsc::channel();
        timer.arm(Duration::from_millis(20), 7, Arc::new(move |seqno| {
            tx.send(seqno).unwrap();
        }));
        let seqno = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(seqno, 7);
    }

    #[test]
    fn cancel_prevents_fire() {
        let timer = SingleTimer::new();
        let fired = Arc::new(AtomicU32::new(0));
        let fired2 = Arc::clone(&fired);
        timer.arm(Duration::from_millis(30), 1, Arc::new(move |_| {
            fired2.fetch_add(1, Ordering::SeqCst);
        }));
        timer.cancel();
        thread::sleep(Duration::from_millis(80));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rearm_replaces_pending_fire() {
        let timer = SingleTimer::new();
        let (tx, rx) = mpsc::channel();

        let tx1 = tx.clone();
        timer.arm(Duration::from_millis(200), 1, Arc::new(move |seqno| {
            tx1.send(seqno).unwrap();
        }));

        let tx2 = tx.clone();
        timer.rearm(Duration::from_millis(10), 2, Arc::new(move |seqno| {
            tx2.send(seqno).unwrap();
        }));

        let seqno = rx.recv_timeout(Duration::from_millis(300)).unwrap();
        assert_eq!(seqno, 2);
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }
}
