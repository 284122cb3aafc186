use bytes::TryGetError;
use thiserror::Error;

use crate::packet_id::PacketId;

/// A datagram's bytes could not be parsed into a packet. This is always recoverable locally:
///  the socket layer logs and drops the datagram.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum DecodeError {
    #[error("packet truncated: needed {requested} bytes, {available} available")]
    Truncated { requested: usize, available: usize },
    #[error("unknown packet kind {0:#04x}")]
    UnknownKind(u8),
}

impl From<TryGetError> for DecodeError {
    fn from(e: TryGetError) -> Self {
        DecodeError::Truncated {
            requested: e.requested,
            available: e.available,
        }
    }
}

#[derive(Debug, Error)]
pub enum RmcastError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A hard-reliability receiver exhausted its buffer with an unresolved gap. This is fatal
    ///  to the association: whoever owns it must tear it down and notify the application.
    #[error("reliability violated: receive buffer exhausted with an unresolved gap after packet {last_delivered:?}")]
    ReliabilityViolated { last_delivered: Option<PacketId> },
}
