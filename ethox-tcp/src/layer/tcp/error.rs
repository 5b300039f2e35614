use core::fmt;

/// A failure of the segment sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransmitError {
    /// No buffer was available for the segment.
    ///
    /// The engine backs out the transmission and shrinks the congestion window to a single
    /// segment, the data is sent again on the next output opportunity.
    NoBuffer,
    /// The remote host is not reachable.
    Unreachable,
    /// The local network is down.
    NetworkDown,
    /// The segment was larger than the path allows.
    MessageTooLarge,
    /// A filter rejected the segment.
    PermissionDenied,
}

/// The reason a connection was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Retransmissions, probes or the handshake exceeded their time budget.
    TimedOut,
    /// The peer answered our SYN, or a listening socket, with a reset.
    ConnectionRefused,
    /// The peer reset a synchronized connection.
    ConnectionReset,
    /// The user aborted the connection.
    Aborted,
    /// A timeout happened after transmission had failed, the failure is the more precise reason.
    Transmit(TransmitError),
}

/// Misuse of the user interface of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UserError {
    /// The operation requires a closed connection.
    NotClosed,
    /// The connection is closed or was never opened.
    Closed,
    /// No more data can be sent since the sending direction was shut down.
    WriteClosed,
}

impl fmt::Display for TransmitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransmitError::NoBuffer => write!(f, "no buffer space available"),
            TransmitError::Unreachable => write!(f, "host unreachable"),
            TransmitError::NetworkDown => write!(f, "network is down"),
            TransmitError::MessageTooLarge => write!(f, "message too large"),
            TransmitError::PermissionDenied => write!(f, "permission denied"),
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DropReason::TimedOut => write!(f, "connection timed out"),
            DropReason::ConnectionRefused => write!(f, "connection refused"),
            DropReason::ConnectionReset => write!(f, "connection reset by peer"),
            DropReason::Aborted => write!(f, "connection aborted"),
            DropReason::Transmit(err) => write!(f, "{}", err),
        }
    }
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UserError::NotClosed => write!(f, "connection is not closed"),
            UserError::Closed => write!(f, "connection is closed"),
            UserError::WriteClosed => write!(f, "sending direction was shut down"),
        }
    }
}

impl From<TransmitError> for DropReason {
    fn from(err: TransmitError) -> Self {
        DropReason::Transmit(err)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TransmitError {}

#[cfg(feature = "std")]
impl std::error::Error for DropReason {}

#[cfg(feature = "std")]
impl std::error::Error for UserError {}
