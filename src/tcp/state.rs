use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    // -- Before open / after a completed close --
    #[default]
    Closed,

    // -- Opening states --
    Listen,      // Waiting for SYN
    SynSent,     // SYN sent, waiting for SYN-ACK
    SynReceived, // SYN received, SYN-ACK sent, expecting ACK

    // -- Steady state; opened --
    Established, // Connection established, exchanging data

    // -- Active close states --
    FinWait1, // FIN sent, waiting for ACK of FIN or FIN from peer
    FinWait2, // FIN acknowledged, waiting for FIN from peer
    Closing,  // Both FINs sent, waiting for final ACK
    TimeWait, // Both FINs sent and acknowledged

    // -- Passive close states --
    CloseWait, // FIN received, waiting for application to close
    LastAck,   // FIN sent after peer's FIN, waiting for ACK
}

/// Inputs that move a connection between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    Listen,
    SendSyn,
    RecvSyn,
    RecvSynAck,
    RecvAck,
    SendFin,
    RecvFin,
}

impl ConnectionState {
    /// The transition table. `None` means the event is not legal in this state.
    pub fn next(self, event: StateEvent) -> Option<ConnectionState> {
        use ConnectionState::*;
        use StateEvent as E;

        let next = match (self, event) {
            (Closed, E::Listen) => Listen,
            (Closed, E::SendSyn) => SynSent,
            (Listen, E::RecvSyn) => SynReceived,
            (SynSent, E::RecvSynAck) => Established,
            (SynReceived, E::RecvAck) => Established,

            (Established, E::SendFin) => FinWait1,
            (Established, E::RecvFin) => CloseWait,

            (FinWait1, E::RecvAck) => FinWait2,
            (FinWait1, E::RecvFin) => Closing,
            (FinWait2, E::RecvFin) => TimeWait,
            (Closing, E::RecvAck) => TimeWait,

            (CloseWait, E::SendFin) => LastAck,
            (LastAck, E::RecvAck) => Closed,

            _ => return None,
        };
        Some(next)
    }

    /// The handshake has completed at some point
    pub fn is_synchronized(&self) -> bool {
        !matches!(
            self,
            ConnectionState::Closed
                | ConnectionState::Listen
                | ConnectionState::SynSent
                | ConnectionState::SynReceived
        )
    }

    /// Local application data may still go out
    pub fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Established | ConnectionState::CloseWait)
    }

    /// Peer data may still be delivered to the application
    pub fn can_receive(&self) -> bool {
        matches!(
            self,
            ConnectionState::Established | ConnectionState::FinWait1 | ConnectionState::FinWait2
        )
    }

    /// Our FIN is outstanding and an ACK would complete it
    pub fn awaiting_fin_ack(&self) -> bool {
        matches!(
            self,
            ConnectionState::FinWait1 | ConnectionState::Closing | ConnectionState::LastAck
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Closed => "CLOSED",
            ConnectionState::Listen => "LISTEN",
            ConnectionState::SynSent => "SYN_SENT",
            ConnectionState::SynReceived => "SYN_RECEIVED",
            ConnectionState::Established => "ESTABLISHED",
            ConnectionState::FinWait1 => "FIN_WAIT_1",
            ConnectionState::FinWait2 => "FIN_WAIT_2",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::TimeWait => "TIME_WAIT",
            ConnectionState::CloseWait => "CLOSE_WAIT",
            ConnectionState::LastAck => "LAST_ACK",
        };
        f.write_str(name)
    }
}

// -- Unit tests --

#[cfg(test)]
mod tests {
    use super::*;
    use super::ConnectionState::*;

    #[test]
    fn test_active_open() {
        let state = Closed.next(StateEvent::SendSyn).unwrap();
        assert_eq!(state, SynSent);
        assert_eq!(state.next(StateEvent::RecvSynAck), Some(Established));
    }

    #[test]
    fn test_passive_open() {
        let state = Closed.next(StateEvent::Listen).unwrap();
        let state = state.next(StateEvent::RecvSyn).unwrap();
        assert_eq!(state, SynReceived);
        assert_eq!(state.next(StateEvent::RecvAck), Some(Established));
    }

    #[test]
    fn test_active_close() {
        let state = Established.next(StateEvent::SendFin).unwrap();
        assert_eq!(state, FinWait1);
        let state = state.next(StateEvent::RecvAck).unwrap();
        assert_eq!(state, FinWait2);
        assert_eq!(state.next(StateEvent::RecvFin), Some(TimeWait));
    }

    #[test]
    fn test_simultaneous_close() {
        let state = FinWait1.next(StateEvent::RecvFin).unwrap();
        assert_eq!(state, Closing);
        assert_eq!(state.next(StateEvent::RecvAck), Some(TimeWait));
    }

    #[test]
    fn test_passive_close() {
        let state = Established.next(StateEvent::RecvFin).unwrap();
        assert_eq!(state, CloseWait);
        let state = state.next(StateEvent::SendFin).unwrap();
        assert_eq!(state, LastAck);
        assert_eq!(state.next(StateEvent::RecvAck), Some(Closed));
    }

    #[test]
    fn test_illegal_transitions() {
        assert_eq!(Listen.next(StateEvent::RecvAck), None);
        assert_eq!(SynSent.next(StateEvent::RecvSyn), None);
        assert_eq!(Established.next(StateEvent::RecvSynAck), None);
        assert_eq!(CloseWait.next(StateEvent::RecvFin), None);
        assert_eq!(TimeWait.next(StateEvent::SendFin), None);
    }

    #[test]
    fn test_direction_predicates() {
        assert!(Established.can_send() && Established.can_receive());
        assert!(CloseWait.can_send() && !CloseWait.can_receive());
        assert!(!FinWait1.can_send() && FinWait1.can_receive());
        assert!(!SynReceived.can_send() && !SynReceived.can_receive());
        assert!(!SynSent.is_synchronized());
        assert!(LastAck.is_synchronized());
    }

    #[test]
    fn test_display() {
        assert_eq!(FinWait1.to_string(), "FIN_WAIT_1");
        assert_eq!(SynReceived.to_string(), "SYN_RECEIVED");
    }
}
