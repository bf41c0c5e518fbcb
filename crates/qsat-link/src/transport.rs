use bytes::Bytes;

use crate::addr::MacAddr;

/// ESP-NOW caps a frame at 250 bytes; we hold every transport to the same limit.
pub const MAX_PAYLOAD: usize = 250;

/// An inbound frame waiting to be consumed by the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sender: MacAddr,
    pub payload: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("address {0} already bound")]
    AddrInUse(MacAddr),
    #[error("transport not bound to a local address")]
    NotBound,
    #[error("no route to peer {0}")]
    UnknownPeer(MacAddr),
    #[error("payload of {0} bytes exceeds {max}", max = MAX_PAYLOAD)]
    Oversize(usize),
    #[error("transport state poisoned")]
    Poisoned,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Connectionless link-layer transport.
///
/// Inbound frames are queued by the transport and pulled with
/// [`Transport::try_recv`]; the link drains that queue at the start of every
/// tick, so a frame that arrived before a tick is always processed before that
/// tick's timeout check.
pub trait Transport {
    fn bind(&mut self, local: MacAddr) -> Result<(), TransportError>;

    /// Peers must be registered before [`Transport::send`] accepts them.
    fn register_peer(&mut self, peer: MacAddr) -> Result<(), TransportError>;

    /// Fire-and-forget. `Ok` only means the frame was handed to the medium.
    fn send(&mut self, peer: MacAddr, payload: &[u8]) -> Result<(), TransportError>;

    fn try_recv(&mut self) -> Option<Frame>;
}
