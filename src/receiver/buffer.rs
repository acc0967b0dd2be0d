//! The receiver's reordering buffer: a fixed-size ring plus a small FIFO
//! of recently-delivered sequence numbers for duplicate suppression.

use std::collections::{HashSet, VecDeque};

use crate::codec::MSS;
use crate::error::StpError;
use crate::seq;

/// Ring of `max_win/MSS` slots. `index` always points at the slot holding
/// (or awaiting) `expct_seqno`.
pub struct ReceiverBuffer {
    slots: Vec<Option<Vec<u8>>>,
    index: usize,
    expct_seqno: u16,
}

impl ReceiverBuffer {
    pub fn new(size: usize, start_seqno: u16) -> ReceiverBuffer {
        ReceiverBuffer { slots: vec![None; size], index: 0, expct_seqno: start_seqno }
    }

    pub fn expct_seqno(&self) -> u16 {
        self.expct_seqno
    }

    /// Places an in-order arrival at the current drain position. Fails if
    /// that slot is already occupied, which would mean the peer sent more
    /// than `max_win` bytes in flight.
    pub fn accept_in_order(&mut self, payload: Vec<u8>) -> Result<(), StpError> {
        if self.slots[self.index].is_some() {
            return Err(StpError::ProtocolViolation(
                "in-order ring slot already occupied".to_string(),
            ));
        }
        self.slots[self.index] = Some(payload);
        Ok(())
    }

    /// Places an out-of-order arrival at its ring position, derived from
    /// its distance ahead of `expct_seqno` in whole `MSS` strides. STP
    /// guarantees every payload is exactly `MSS` bytes except the final
    /// one, which this placement assumes is always last (§9).
    pub fn accept_out_of_order(&mut self, seqno: u16, payload: Vec<u8>) -> Result<(), StpError> {
        let d = seq::diff(seqno, self.expct_seqno) as usize;
        let slot = (self.index + d / MSS) % self.slots.len();
        if self.slots[slot].is_some() {
            return Err(StpError::ProtocolViolation(
                "out-of-order ring slot already occupied".to_string(),
            ));
        }
        self.slots[slot] = Some(payload);
        Ok(())
    }

    /// Drains every consecutive in-order slot starting at the current
    /// drain position, advancing `expct_seqno` past each one. Returns the
    /// delivered `(starting_seqno, payload)` pairs in delivery order.
    pub fn drain(&mut self) -> Vec<(u16, Vec<u8>)> {
        let mut delivered = Vec::new();
        while let Some(payload) = self.slots[self.index].take() {
            let seqno = self.expct_seqno;
            let len = payload.len();
            self.expct_seqno = seq::add(self.expct_seqno, len as u32);
            self.index = (self.index + 1) % self.slots.len();
            delivered.push((seqno, payload));
        }
        delivered
    }
}

/// FIFO of the last `cap` seqnos the receiver has already cumulatively
/// acknowledged, used only to recognize and silently drop retransmissions
/// of segments already delivered.
pub struct RecentAckCache {
    queue: VecDeque<u16>,
    set: HashSet<u16>,
    cap: usize,
}

impl RecentAckCache {
    pub fn new(cap: usize) -> RecentAckCache {
        RecentAckCache { queue: VecDeque::with_capacity(cap), set: HashSet::new(), cap }
    }

    pub fn contains(&self, seqno: u16) -> bool {
        self.set.contains(&seqno)
    }

    pub fn insert(&mut self, seqno: u16) {
        if self.cap == 0 {
            return;
        }
        if self.queue.len() == self.cap {
            if let Some(evicted) = self.queue.pop_front() {
                self.set.remove(&evicted);
            }
        }
        self.queue.push_back(seqno);
        self.set.insert(seqno);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_arrival_drains_immediately() {
        let mut buf = ReceiverBuffer::new(2, 0);
        buf.accept_in_order(b"hello".to_vec()).unwrap();
        let drained = buf.drain();
        assert_eq!(drained, vec![(0, b"hello".to_vec())]);
        assert_eq!(buf.expct_seqno(), 5);
    }

    #[test]
    fn out_of_order_then_in_order_drains_both_in_order() {
        let mut buf = ReceiverBuffer::new(2, 0);
        buf.accept_out_of_order(1000, vec![b'B'; 1000]).unwrap();
        assert!(buf.drain().is_empty());

        buf.accept_in_order(vec![b'A'; 1000]).unwrap();
        let drained = buf.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].0, 0);
        assert_eq!(drained[1].0, 1000);
        assert_eq!(buf.expct_seqno(), 2000);
    }

    #[test]
    fn duplicate_in_order_slot_is_a_protocol_violation() {
        let mut buf = ReceiverBuffer::new(2, 0);
        buf.accept_out_of_order(1000, vec![b'B'; 1000]).unwrap();
        // Placing another segment at the same out-of-order slot without
        // draining must fail: the peer would be exceeding the window.
        let err = buf.accept_out_of_order(1000, vec![b'C'; 1000]).unwrap_err();
        assert!(matches!(err, StpError::ProtocolViolation(_)));
    }

    #[test]
    fn recent_ack_cache_evicts_oldest_past_capacity() {
        let mut cache = RecentAckCache::new(2);
        cache.insert(1);
        cache.insert(2);
        assert!(cache.contains(1));
        cache.insert(3);
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert!(cache.contains(3));
    }
}
