use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::addr::MacAddr;
use crate::transport::{Frame, Transport, TransportError, MAX_PAYLOAD};

const HEADER_LEN: usize = 6;

/// Host stand-in for ESP-NOW: one UDP datagram per frame, prefixed with the
/// sender's 6-byte address. Peers are reached through a static route table.
pub struct UdpTransport {
    socket: UdpSocket,
    routes: HashMap<MacAddr, SocketAddr>,
    local: Option<MacAddr>,
    peers: HashMap<MacAddr, SocketAddr>,
    rx_buf: Vec<u8>,
}

impl UdpTransport {
    pub async fn open(listen: SocketAddr, routes: HashMap<MacAddr, SocketAddr>) -> io::Result<Self> {
        let socket = UdpSocket::bind(listen).await?;
        info!("udp transport: listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            routes,
            local: None,
            peers: HashMap::new(),
            rx_buf: vec![0u8; HEADER_LEN + MAX_PAYLOAD],
        })
    }

    pub fn local_socket_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Add or replace a MAC -> socket route. Takes effect on the next `register_peer`.
    pub fn add_route(&mut self, mac: MacAddr, addr: SocketAddr) {
        self.routes.insert(mac, addr);
    }
}

impl Transport for UdpTransport {
    fn bind(&mut self, local: MacAddr) -> Result<(), TransportError> {
        match self.local {
            Some(cur) if cur != local => Err(TransportError::AddrInUse(cur)),
            _ => {
                self.local = Some(local);
                Ok(())
            }
        }
    }

    fn register_peer(&mut self, peer: MacAddr) -> Result<(), TransportError> {
        let addr = *self.routes.get(&peer).ok_or(TransportError::UnknownPeer(peer))?;
        self.peers.insert(peer, addr);
        Ok(())
    }

    fn send(&mut self, peer: MacAddr, payload: &[u8]) -> Result<(), TransportError> {
        let local = self.local.ok_or(TransportError::NotBound)?;
        let addr = *self.peers.get(&peer).ok_or(TransportError::UnknownPeer(peer))?;
        if payload.len() > MAX_PAYLOAD {
            return Err(TransportError::Oversize(payload.len()));
        }

        let mut dgram = BytesMut::with_capacity(HEADER_LEN + payload.len());
        dgram.put_slice(&local.octets());
        dgram.put_slice(payload);
        self.socket.try_send_to(&dgram, addr)?;
        Ok(())
    }

    fn try_recv(&mut self) -> Option<Frame> {
        loop {
            match self.socket.try_recv_from(&mut self.rx_buf) {
                Ok((n, from)) if n < HEADER_LEN => {
                    warn!("udp transport: runt datagram ({} bytes) from {}", n, from);
                }
                Ok((n, from)) => {
                    let mut mac = [0u8; HEADER_LEN];
                    mac.copy_from_slice(&self.rx_buf[..HEADER_LEN]);
                    let sender = MacAddr(mac);
                    debug!("udp transport: {} bytes from {} ({})", n - HEADER_LEN, sender, from);
                    return Some(Frame {
                        sender,
                        payload: Bytes::copy_from_slice(&self.rx_buf[HEADER_LEN..n]),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return None,
                Err(e) => {
                    // e.g. ICMP port unreachable surfacing on Linux
                    debug!("udp transport: recv error: {}", e);
                    return None;
                }
            }
        }
    }
}
