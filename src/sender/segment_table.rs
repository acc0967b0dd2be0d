//! The sender's view of the file being transferred: a fixed partition into
//! `<= MSS`-byte chunks plus a `seqno -> index` map for O(1) lookup on ACK.

use std::collections::HashMap;

use crate::codec::MSS;
use crate::seq;

pub struct SegmentEntry {
    pub seqno: u16,
    pub payload: Vec<u8>,
    pub is_sent: bool,
}

pub struct SegmentTable {
    pub entries: Vec<SegmentEntry>,
    /// Maps a segment's starting seqno to its index in `entries`.
    pub seqno_map: HashMap<u16, usize>,
}

impl SegmentTable {
    /// Splits `data` into `MSS`-sized chunks starting at `start_seqno`
    /// (the byte right after the handshake ISN).
    pub fn from_bytes(data: &[u8], start_seqno: u16) -> SegmentTable {
        let mut entries = Vec::new();
        let mut seqno_map = HashMap::new();
        let mut cursor = start_seqno;

        for chunk in data.chunks(MSS) {
            seqno_map.insert(cursor, entries.len());
            entries.push(SegmentEntry { seqno: cursor, payload: chunk.to_vec(), is_sent: false });
            cursor = seq::add(cursor, chunk.len() as u32);
        }

        SegmentTable { entries, seqno_map }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves an ACK's seqno to a segment index. An unmapped seqno is
    /// interpreted as acknowledging the final byte of the transfer (index
    /// == `len()`), per the protocol's convention.
    pub fn index_for_ack(&self, seqno: u16) -> usize {
        self.seqno_map.get(&seqno).copied().unwrap_or(self.entries.len())
    }
}
