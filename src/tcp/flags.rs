use bitflags::bitflags;

bitflags! {
    // Same bit positions as TCP: [ -, -, -, ACK, -, -, SYN, FIN ]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StcpFlags: u8 {
        const ACK = 1 << 4;
        const SYN = 1 << 1;
        const FIN = 1 << 0;
    }
}

impl StcpFlags {
    /// Number of sequence numbers a segment with these flags consumes on top of its payload
    pub fn seq_len(&self) -> u32 {
        self.intersection(StcpFlags::SYN | StcpFlags::FIN).bits().count_ones()
    }
}

// -- Unit tests --
