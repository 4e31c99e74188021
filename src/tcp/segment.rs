//! Wire format of an STCP segment.
//!
//! The header keeps the 20-byte TCP layout so captures read naturally in
//! packet tools, but the port, checksum and urgent fields are always zero.
//! Integrity is the job of the channel underneath.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          Source Port (0)      |       Destination Port (0)    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Data |       |     Flags     |            Window             |
//! | Offset|       |               |                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          Checksum (0)         |         Urgent Pointer (0)    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                            Payload ...                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use crate::tcp::errors::SegmentError;
use crate::tcp::flags::StcpFlags;
use crate::tcp::wrap32::Wrap32;

/// Length of an encoded header. Options are never written.
pub const HEADER_LEN: usize = 20;

/// Data offset written into every outgoing header, in 32-bit words.
pub const DATA_OFFSET: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StcpHeader {
    pub seq_no: Wrap32,
    pub ack_no: Wrap32,
    pub data_offset: u8, // Upper 4 bits
    pub flags: StcpFlags,
    pub window: u16,
}

impl Default for StcpHeader {
    fn default() -> Self {
        StcpHeader {
            seq_no: Wrap32::new(0),
            ack_no: Wrap32::new(0),
            data_offset: DATA_OFFSET,
            flags: StcpFlags::empty(),
            window: 0,
        }
    }
}

impl StcpHeader {
    /// Header length in bytes, as announced by the data offset.
    pub fn header_len(&self) -> usize {
        self.data_offset as usize * 4
    }

    /// Write the header into `buf` in network byte order.
    pub fn serialize(&self, buf: &mut [u8]) -> Result<usize, SegmentError> {
        if buf.len() < HEADER_LEN {
            return Err(SegmentError::BufferTooSmall { expected: HEADER_LEN, found: buf.len() });
        }

        buf[0..4].fill(0); // Ports are unused
        buf[4..8].copy_from_slice(&self.seq_no.value().to_be_bytes());
        buf[8..12].copy_from_slice(&self.ack_no.value().to_be_bytes());
        buf[12] = DATA_OFFSET << 4;
        buf[13] = self.flags.bits();
        buf[14..16].copy_from_slice(&self.window.to_be_bytes());
        buf[16..20].fill(0); // Checksum and urgent pointer

        Ok(HEADER_LEN)
    }

    /// Read a header from the front of `buf`. Options, if any, are skipped.
    pub fn parse(buf: &[u8]) -> Result<Self, SegmentError> {
        if buf.len() < HEADER_LEN {
            return Err(SegmentError::BufferTooSmall { expected: HEADER_LEN, found: buf.len() });
        }

        let seq_no = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ack_no = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let data_offset = buf[12] >> 4;
        let flags = StcpFlags::from_bits_truncate(buf[13]);
        let window = u16::from_be_bytes([buf[14], buf[15]]);

        if data_offset < DATA_OFFSET {
            return Err(SegmentError::BadDataOffset(data_offset));
        }

        let header_len = data_offset as usize * 4;
        if buf.len() < header_len {
            return Err(SegmentError::BufferTooSmall { expected: header_len, found: buf.len() });
        }

        Ok(StcpHeader {
            seq_no: Wrap32::new(seq_no),
            ack_no: Wrap32::new(ack_no),
            data_offset,
            flags,
            window,
        })
    }
}

/// A header plus a borrowed payload. Built right before a send, parsed right after a receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    pub header: StcpHeader,
    pub payload: &'a [u8],
}

impl<'a> Segment<'a> {
    pub fn new(flags: StcpFlags) -> Self {
        Segment {
            header: StcpHeader { flags, ..Default::default() },
            payload: &[],
        }
    }

    pub fn seq_no(mut self, seq_no: Wrap32) -> Self {
        self.header.seq_no = seq_no;
        self
    }

    pub fn ack_no(mut self, ack_no: Wrap32) -> Self {
        self.header.ack_no = ack_no;
        self
    }

    pub fn window(mut self, window: u16) -> Self {
        self.header.window = window;
        self
    }

    pub fn payload(mut self, payload: &'a [u8]) -> Self {
        self.payload = payload;
        self
    }

    pub fn flags(&self) -> StcpFlags {
        self.header.flags
    }

    /// Encode just the header; the payload travels as a separate slice.
    pub fn encode_header(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        // A fixed-size buffer of HEADER_LEN always fits
        let _ = self.header.serialize(&mut buf);
        buf
    }

    /// Encode header and payload into one contiguous datagram.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len());
        bytes.extend_from_slice(&self.encode_header());
        bytes.extend_from_slice(self.payload);
        bytes
    }

    /// Parse a received datagram. The payload is everything after the announced header length.
    pub fn parse(buf: &'a [u8]) -> Result<Self, SegmentError> {
        let header = StcpHeader::parse(buf)?;
        let payload = &buf[header.header_len()..];
        Ok(Segment { header, payload })
    }
}

// -- Unit tests --

#[cfg(test)]
mod tests {
    use super::*;

    const SYN_HEX: &str = "00000000000000010000000050020c0000000000";
    const SYN_ACK_HEX: &str = "00000000000000010000000250120c0000000000";

    #[test]
    fn test_syn_to_bytes() {
        let segment = Segment::new(StcpFlags::SYN)
            .seq_no(Wrap32::new(1))
            .window(3072);

        let expected = hex::decode(SYN_HEX).unwrap();
        assert_eq!(segment.to_bytes(), expected);
    }

    #[test]
    fn test_syn_ack_from_bytes() {
        let bytes = hex::decode(SYN_ACK_HEX).unwrap();
        let segment = Segment::parse(&bytes).unwrap();

        assert_eq!(segment.header.seq_no, Wrap32::new(1));
        assert_eq!(segment.header.ack_no, Wrap32::new(2));
        assert_eq!(segment.header.data_offset, 5);
        assert_eq!(segment.flags(), StcpFlags::SYN | StcpFlags::ACK);
        assert_eq!(segment.header.window, 3072);
        assert!(segment.payload.is_empty());
    }

    #[test]
    fn test_payload_follows_header() {
        let payload = b"hello, world";
        let segment = Segment::new(StcpFlags::ACK)
            .seq_no(Wrap32::new(2))
            .ack_no(Wrap32::new(2))
            .window(3072)
            .payload(payload);

        let bytes = segment.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN + payload.len());
        assert_eq!(&bytes[HEADER_LEN..], payload);

        let parsed = Segment::parse(&bytes).unwrap();
        assert_eq!(parsed, segment);
    }

    #[test]
    fn test_seq_ack_big_endian_on_wire() {
        let bytes = Segment::new(StcpFlags::ACK)
            .seq_no(Wrap32::new(0x0102_0304))
            .ack_no(Wrap32::new(0x0506_0708))
            .encode_header();
        assert_eq!(bytes[4..8], [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(bytes[8..12], [0x05, 0x06, 0x07, 0x08]);
    }

    #[test]
    fn test_options_are_skipped() {
        // Data offset 6: one word of options before the payload
        let bytes = hex::decode("00000000000000070000000960100c00000000000101010168 69".replace(' ', "")).unwrap();
        let segment = Segment::parse(&bytes).unwrap();

        assert_eq!(segment.header.header_len(), 24);
        assert_eq!(segment.header.seq_no, Wrap32::new(7));
        assert_eq!(segment.payload, b"hi");
    }

    #[test]
    fn test_always_encodes_offset_five() {
        let mut header = StcpHeader::default();
        header.data_offset = 6;
        let mut buf = [0u8; HEADER_LEN];
        header.serialize(&mut buf).unwrap();
        assert_eq!(buf[12] >> 4, DATA_OFFSET);
    }

    #[test]
    fn test_parse_short_buffer() {
        let result = Segment::parse(&[0u8; HEADER_LEN - 1]);
        assert_eq!(result, Err(SegmentError::BufferTooSmall { expected: HEADER_LEN, found: HEADER_LEN - 1 }));
    }

    #[test]
    fn test_parse_bad_data_offset() {
        let mut bytes = hex::decode(SYN_HEX).unwrap();
        bytes[12] = 4 << 4;
        assert_eq!(Segment::parse(&bytes), Err(SegmentError::BadDataOffset(4)));
    }

    #[test]
    fn test_parse_truncated_options() {
        let mut bytes = hex::decode(SYN_HEX).unwrap();
        bytes[12] = 8 << 4;
        assert_eq!(
            Segment::parse(&bytes),
            Err(SegmentError::BufferTooSmall { expected: 32, found: 20 })
        );
    }

    #[test]
    fn test_serialize_small_buffer() {
        let mut buf = [0u8; 8];
        let result = StcpHeader::default().serialize(&mut buf);
        assert_eq!(result, Err(SegmentError::BufferTooSmall { expected: HEADER_LEN, found: 8 }));
    }
}
