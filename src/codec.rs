//! Wire format for STP segments: a 4-byte header followed by 0..MSS bytes
//! of payload.
//!
//! ```text
//! byte:  0 1 2 3 4 ... 1003
//!       +--+--+--+--+------...------+
//!       | type  | seqno | payload   |
//!       +--+--+--+--+------...------+
//! ```

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::error::StpError;

/// Maximum segment size: payload bytes per DATA segment.
pub const MSS: usize = 1000;

const HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentType {
    Data = 0,
    Ack = 1,
    Syn = 2,
    Fin = 3,
}

impl SegmentType {
    fn from_u16(v: u16) -> Option<SegmentType> {
        match v {
            0 => Some(SegmentType::Data),
            1 => Some(SegmentType::Ack),
            2 => Some(SegmentType::Syn),
            3 => Some(SegmentType::Fin),
            _ => None,
        }
    }

    /// Name as it appears in the fixed-format protocol log.
    pub fn log_name(&self) -> &'static str {
        match self {
            SegmentType::Data => "DATA",
            SegmentType::Ack => "ACK",
            SegmentType::Syn => "SYN",
            SegmentType::Fin => "FIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub segtype: SegmentType,
    pub seqno: u16,
    pub payload: Vec<u8>,
}

impl Segment {
    pub fn syn(seqno: u16) -> Segment {
        Segment { segtype: SegmentType::Syn, seqno, payload: Vec::new() }
    }

    pub fn ack(seqno: u16) -> Segment {
        Segment { segtype: SegmentType::Ack, seqno, payload: Vec::new() }
    }

    pub fn fin(seqno: u16) -> Segment {
        Segment { segtype: SegmentType::Fin, seqno, payload: Vec::new() }
    }

    pub fn data(seqno: u16, payload: Vec<u8>) -> Segment {
        Segment { segtype: SegmentType::Data, seqno, payload }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.write_u16::<BigEndian>(self.segtype as u16).unwrap();
        buf.write_u16::<BigEndian>(self.seqno).unwrap();
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Segment, StpError> {
        if bytes.len() < HEADER_LEN {
            return Err(StpError::MalformedSegment {
                len: bytes.len(),
                reason: "shorter than the 4-byte header",
            });
        }

        let mut cursor = Cursor::new(bytes);
        let raw_type = cursor.read_u16::<BigEndian>().unwrap();
        let seqno = cursor.read_u16::<BigEndian>().unwrap();

        let segtype = SegmentType::from_u16(raw_type).ok_or(StpError::MalformedSegment {
            len: bytes.len(),
            reason: "unrecognized segment type",
        })?;

        let payload = bytes[HEADER_LEN..].to_vec();

        Ok(Segment { segtype, seqno, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_data_segment() {
        let seg = Segment::data(42, b"hello".to_vec());
        let encoded = seg.encode();
        assert_eq!(encoded.len(), HEADER_LEN + 5);
        let decoded = Segment::decode(&encoded).unwrap();
        assert_eq!(decoded, seg);
    }

    #[test]
    fn round_trips_control_segments() {
        for seg in [Segment::syn(1), Segment::ack(2), Segment::fin(3)] {
            let decoded = Segment::decode(&seg.encode()).unwrap();
            assert_eq!(decoded, seg);
            assert!(decoded.payload.is_empty());
        }
    }

    #[test]
    fn rejects_short_segment() {
        let err = Segment::decode(&[0, 1, 0]).unwrap_err();
        assert!(matches!(err, StpError::MalformedSegment { .. }));
    }

    #[test]
    fn rejects_unknown_type() {
        let bytes = [0u8, 9, 0, 0];
        let err = Segment::decode(&bytes).unwrap_err();
        assert!(matches!(err, StpError::MalformedSegment { .. }));
    }

    #[test]
    fn big_endian_header() {
        let seg = Segment::ack(0x0102);
        let encoded = seg.encode();
        assert_eq!(&encoded[0..4], &[0x00, 0x01, 0x01, 0x02]);
    }
}
