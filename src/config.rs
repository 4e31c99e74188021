use rand::Rng;
use crate::tcp::errors::StcpError;
use crate::tcp::segment::HEADER_LEN;
use crate::tcp::wrap32::Wrap32;

/// Maximum payload bytes per segment.
pub const DEFAULT_MSS: usize = 536;

/// Largest MSS whose segments still fit in one UDP datagram
pub const MAX_MSS: usize = 65_507 - HEADER_LEN;

/// Receive window advertised in every header. Not enforced by either side.
pub const DEFAULT_WINDOW: u16 = 3072;

/// Where the local initial sequence number comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialSeqNo {
    Fixed(u32),
    Random,
}

impl InitialSeqNo {
    pub fn generate(&self) -> Wrap32 {
        match self {
            InitialSeqNo::Fixed(n) => Wrap32::new(*n),
            InitialSeqNo::Random => Wrap32::new(rand::thread_rng().gen()),
        }
    }
}

/// How strictly an ACK is checked before it completes a handshake or a FIN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckValidation {
    /// Any segment with the ACK flag set will do; the ack number is not looked at
    Permissive,
    /// The ack number must cover the SYN or FIN being acknowledged
    Strict,
}

/// When the active closer is finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownMode {
    /// Finish as soon as our FIN is acknowledged
    AwaitAck,
    /// Stay in FIN_WAIT_2 until the peer's FIN arrives and has been acknowledged
    FourWay,
}

#[derive(Debug, Clone)]
pub struct StcpConfig {
    pub mss: usize,
    pub window_size: u16,
    pub initial_seq_no: InitialSeqNo,
    pub ack_validation: AckValidation,
    pub teardown: TeardownMode,
}

impl Default for StcpConfig {
    fn default() -> Self {
        StcpConfig {
            mss: DEFAULT_MSS,
            window_size: DEFAULT_WINDOW,
            initial_seq_no: InitialSeqNo::Fixed(1),
            ack_validation: AckValidation::Permissive,
            teardown: TeardownMode::AwaitAck,
        }
    }
}

impl StcpConfig {
    pub fn validate(&self) -> Result<(), StcpError> {
        if self.mss == 0 || self.mss > MAX_MSS {
            return Err(StcpError::InvalidConfig(format!(
                "mss must be between 1 and {}, got {}",
                MAX_MSS, self.mss
            )));
        }
        Ok(())
    }
}

// -- Unit tests --

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StcpConfig::default();
        assert_eq!(config.mss, 536);
        assert_eq!(config.window_size, 3072);
        assert_eq!(config.initial_seq_no.generate(), Wrap32::new(1));
        assert_eq!(config.ack_validation, AckValidation::Permissive);
        assert_eq!(config.teardown, TeardownMode::AwaitAck);
    }

    #[test]
    fn test_validate_mss() {
        assert!(StcpConfig::default().validate().is_ok());

        let zero = StcpConfig { mss: 0, ..Default::default() };
        assert!(matches!(zero.validate(), Err(StcpError::InvalidConfig(_))));

        let huge = StcpConfig { mss: MAX_MSS + 1, ..Default::default() };
        assert!(huge.validate().is_err());

        let largest = StcpConfig { mss: MAX_MSS, ..Default::default() };
        assert!(largest.validate().is_ok());
    }

    #[test]
    fn test_random_isn_varies() {
        // 64 draws of a u32 colliding every time is not a realistic outcome
        let first = InitialSeqNo::Random.generate();
        let varied = (0..64).any(|_| InitialSeqNo::Random.generate() != first);
        assert!(varied);
    }
}
