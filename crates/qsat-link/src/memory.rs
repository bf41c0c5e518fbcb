use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::addr::MacAddr;
use crate::transport::{Frame, Transport, TransportError, MAX_PAYLOAD};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub delivered: u64,
    pub dropped: u64,
}

#[derive(Debug)]
struct BusInner {
    queues: HashMap<MacAddr, VecDeque<Frame>>,
    link_up: bool,
    stats: BusStats,
}

/// In-process radio medium shared by any number of [`MemoryTransport`]s.
#[derive(Debug, Clone)]
pub struct MemoryBus {
    inner: Arc<Mutex<BusInner>>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                queues: HashMap::new(),
                link_up: true,
                stats: BusStats::default(),
            })),
        }
    }

    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport { bus: self.clone(), local: None, peers: Vec::new() }
    }

    /// While down, every frame put on the bus is lost.
    pub fn set_link_up(&self, up: bool) -> Result<(), TransportError> {
        self.lock()?.link_up = up;
        Ok(())
    }

    /// Put a raw frame on the bus as if `from` had sent it. Ignores the
    /// link-up flag and peer registration (noise, foreign nodes).
    pub fn inject(&self, from: MacAddr, to: MacAddr, payload: &[u8]) -> Result<(), TransportError> {
        let mut g = self.lock()?;
        let frame = Frame { sender: from, payload: Bytes::copy_from_slice(payload) };
        match g.queues.get_mut(&to) {
            Some(q) => {
                q.push_back(frame);
                g.stats.delivered += 1;
            }
            None => g.stats.dropped += 1,
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<BusStats, TransportError> {
        Ok(self.lock()?.stats)
    }

    /// Frames waiting for `addr`. Zero when nothing is bound there.
    pub fn pending(&self, addr: MacAddr) -> Result<usize, TransportError> {
        Ok(self.lock()?.queues.get(&addr).map_or(0, VecDeque::len))
    }

    fn lock(&self) -> Result<MutexGuard<'_, BusInner>, TransportError> {
        self.inner.lock().map_err(|_| TransportError::Poisoned)
    }
}

/// One node's endpoint on a [`MemoryBus`].
#[derive(Debug)]
pub struct MemoryTransport {
    bus: MemoryBus,
    local: Option<MacAddr>,
    peers: Vec<MacAddr>,
}

impl Transport for MemoryTransport {
    fn bind(&mut self, local: MacAddr) -> Result<(), TransportError> {
        let mut g = self.bus.lock()?;
        if g.queues.contains_key(&local) {
            return Err(TransportError::AddrInUse(local));
        }
        g.queues.insert(local, VecDeque::new());
        self.local = Some(local);
        Ok(())
    }

    fn register_peer(&mut self, peer: MacAddr) -> Result<(), TransportError> {
        if !self.peers.contains(&peer) {
            self.peers.push(peer);
        }
        Ok(())
    }

    fn send(&mut self, peer: MacAddr, payload: &[u8]) -> Result<(), TransportError> {
        let local = self.local.ok_or(TransportError::NotBound)?;
        if !self.peers.contains(&peer) {
            return Err(TransportError::UnknownPeer(peer));
        }
        if payload.len() > MAX_PAYLOAD {
            return Err(TransportError::Oversize(payload.len()));
        }

        let mut g = self.bus.lock()?;
        if !g.link_up {
            g.stats.dropped += 1;
            debug!("memory bus: link down, dropped frame {} -> {}", local, peer);
            return Ok(());
        }
        let frame = Frame { sender: local, payload: Bytes::copy_from_slice(payload) };
        match g.queues.get_mut(&peer) {
            Some(q) => {
                q.push_back(frame);
                g.stats.delivered += 1;
            }
            // nobody listening on that address
            None => g.stats.dropped += 1,
        }
        Ok(())
    }

    fn try_recv(&mut self) -> Option<Frame> {
        let local = self.local?;
        match self.bus.lock() {
            Ok(mut g) => g.queues.get_mut(&local)?.pop_front(),
            Err(e) => {
                warn!("memory bus: receive on {} failed: {}", local, e);
                None
            }
        }
    }
}

impl Drop for MemoryTransport {
    // Frees the address so a restarted node can bind it again.
    fn drop(&mut self) {
        if let Some(local) = self.local.take() {
            let mut g = self.bus.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(q) = g.queues.remove(&local) {
                debug!("memory bus: {} released, {} frames discarded", local, q.len());
            }
        }
    }
}
