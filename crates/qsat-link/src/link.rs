use qsat_proto::{decode, encode, ArmIntent, Message};
use tracing::{debug, info, warn};

use crate::addr::MacAddr;
use crate::state::{LinkSnapshot, LinkState, LinkStatus, LocalIntent};
use crate::transport::{Transport, TransportError};
use crate::{LinkConfig, StalePolicy};

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("bind {addr}: {source}")]
    Bind { addr: MacAddr, source: TransportError },
    #[error("register peer {addr}: {source}")]
    RegisterPeer { addr: MacAddr, source: TransportError },
}

/// What one call to [`HeartbeatLink::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Frames drained from the transport (accepted or not).
    pub received: usize,
    pub sent: bool,
    pub stale: bool,
    /// Local intent was forced to Armed by this tick.
    pub failsafe_armed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Intent(ArmIntent),
    Liveness,
    Malformed,
    ForeignSender,
}

/// Arm/disarm heartbeat between this node and one fixed peer.
pub struct HeartbeatLink<T: Transport> {
    transport: T,
    local: MacAddr,
    state: LinkState,
    send_interval_ms: u64,
    disconnect_timeout_ms: u64,
    policy: StalePolicy,
    // set while an outage has been reported, cleared on the next accepted frame
    stale_reported: bool,
}

impl<T: Transport> HeartbeatLink<T> {
    /// Binds the local address and registers the peer. Any failure here is fatal
    /// for the node; nothing is retried.
    pub fn initialize(cfg: &LinkConfig, mut transport: T) -> Result<Self, LinkError> {
        transport
            .bind(cfg.local_addr)
            .map_err(|source| LinkError::Bind { addr: cfg.local_addr, source })?;
        transport
            .register_peer(cfg.peer_addr)
            .map_err(|source| LinkError::RegisterPeer { addr: cfg.peer_addr, source })?;

        let policy = cfg.stale_policy();
        info!(
            "link: {:?} {} <-> {} (send every {}ms, stale after {}ms, policy {:?})",
            cfg.role,
            cfg.local_addr,
            cfg.peer_addr,
            cfg.send_interval_ms,
            cfg.disconnect_timeout_ms(),
            policy
        );

        Ok(Self {
            transport,
            local: cfg.local_addr,
            state: LinkState::new(cfg.peer_addr, cfg.initial_intent()),
            send_interval_ms: cfg.send_interval_ms,
            disconnect_timeout_ms: cfg.disconnect_timeout_ms(),
            policy,
            stale_reported: false,
        })
    }

    pub fn tick(&mut self, now: u64) -> TickReport {
        let mut report = TickReport::default();

        while let Some(frame) = self.transport.try_recv() {
            report.received += 1;
            self.on_message_received(frame.sender, &frame.payload, now);
        }

        if now.saturating_sub(self.state.last_send_ms) >= self.send_interval_ms {
            self.send_heartbeat();
            self.state.last_send_ms = now;
            report.sent = true;
        }

        if self.state.status(now, self.disconnect_timeout_ms) == LinkStatus::Stale {
            report.stale = true;
            if !self.stale_reported {
                self.stale_reported = true;
                warn!(
                    "link: no frame from {} for {}ms",
                    self.state.peer,
                    self.state.since_last_receive(now).unwrap_or_default()
                );
            }
            if self.policy == StalePolicy::FailSafeArm && self.state.local_intent != LocalIntent::Armed {
                warn!("link: peer lost, fail-safe arming");
                self.state.local_intent = LocalIntent::Armed;
                report.failsafe_armed = true;
            }
        }

        report
    }

    fn send_heartbeat(&mut self) {
        let msg = self.state.local_intent.message();
        let payload = encode(&msg);
        match self.transport.send(self.state.peer, &payload) {
            Ok(()) => debug!("link: sent {:?} to {}", msg, self.state.peer),
            Err(e) => warn!("link: send to {} failed: {}", self.state.peer, e),
        }
    }

    /// Feed one inbound frame. Normally called from [`HeartbeatLink::tick`];
    /// exposed for transports that deliver frames themselves.
    pub fn on_message_received(&mut self, sender: MacAddr, payload: &[u8], now: u64) -> ReceiveOutcome {
        if sender != self.state.peer {
            warn!("link: ignoring frame from {} (peer is {})", sender, self.state.peer);
            return ReceiveOutcome::ForeignSender;
        }

        let msg = match decode(payload) {
            Ok(m) => m,
            Err(e) => {
                warn!("link: dropping malformed frame from {}: {} ({} bytes: {})", sender, e, payload.len(), hex_preview(payload));
                return ReceiveOutcome::Malformed;
            }
        };

        let outcome = match msg {
            Message::Intent(i) => {
                if i != self.state.remote_intent {
                    info!("link: peer intent {:?} -> {:?}", self.state.remote_intent, i);
                }
                self.state.remote_intent = i;
                ReceiveOutcome::Intent(i)
            }
            Message::Ping | Message::Keepalive => ReceiveOutcome::Liveness,
        };
        debug!("link: received {:?} from {}", msg, sender);

        if self.stale_reported {
            self.stale_reported = false;
            info!("link: peer {} back after {}ms", sender, self.state.since_last_receive(now).unwrap_or_default());
        }
        self.state.last_receive_ms = Some(now);
        outcome
    }

    pub fn set_local_intent(&mut self, intent: LocalIntent) {
        if intent != self.state.local_intent {
            info!("link: local intent {:?} -> {:?}", self.state.local_intent, intent);
        }
        self.state.local_intent = intent;
    }

    pub fn local_intent(&self) -> LocalIntent {
        self.state.local_intent
    }

    pub fn remote_intent(&self) -> ArmIntent {
        self.state.remote_intent
    }

    /// `None` until the first frame is accepted.
    pub fn time_since_last_receive(&self, now: u64) -> Option<u64> {
        self.state.since_last_receive(now)
    }

    pub fn status(&self, now: u64) -> LinkStatus {
        self.state.status(now, self.disconnect_timeout_ms)
    }

    pub fn snapshot(&self, now: u64) -> LinkSnapshot {
        LinkSnapshot {
            local_intent: self.state.local_intent,
            remote_intent: self.state.remote_intent,
            status: self.status(now),
            since_last_receive_ms: self.time_since_last_receive(now),
        }
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    pub fn local_addr(&self) -> MacAddr {
        self.local
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

fn hex_preview(payload: &[u8]) -> String {
    hex::encode(&payload[..payload.len().min(16)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBus, MemoryTransport};
    use crate::Role;

    const ROCKET: MacAddr = MacAddr([0x36, 0x33, 0x33, 0x33, 0x33, 0x33]);
    const REMOTE: MacAddr = MacAddr([0x36, 0x33, 0x33, 0x33, 0x33, 0x32]);

    fn rocket(bus: &MemoryBus) -> HeartbeatLink<MemoryTransport> {
        HeartbeatLink::initialize(&LinkConfig::for_role(Role::Rocket, ROCKET, REMOTE), bus.transport()).unwrap()
    }

    fn remote(bus: &MemoryBus) -> HeartbeatLink<MemoryTransport> {
        HeartbeatLink::initialize(&LinkConfig::for_role(Role::Remote, REMOTE, ROCKET), bus.transport()).unwrap()
    }

    #[test]
    fn intent_payload_sets_remote_intent_and_receive_time() {
        let bus = MemoryBus::new();
        let mut l = remote(&bus);
        assert_eq!(l.on_message_received(ROCKET, br#"{"isArmed":1}"#, 120), ReceiveOutcome::Intent(ArmIntent::Armed));
        assert_eq!(l.remote_intent(), ArmIntent::Armed);
        assert_eq!(l.state().last_receive_ms(), Some(120));

        l.on_message_received(ROCKET, br#"{"isArmed":0}"#, 300);
        assert_eq!(l.remote_intent(), ArmIntent::Disarmed);
        assert_eq!(l.state().last_receive_ms(), Some(300));
    }

    #[test]
    fn malformed_payload_changes_nothing() {
        let bus = MemoryBus::new();
        let mut l = remote(&bus);
        l.on_message_received(ROCKET, br#"{"isArmed":1}"#, 100);

        let bad: [&[u8]; 5] = [br#"{"isArm"#, b"", b"\x01", br#"{"isArmed":7}"#, b"null"];
        for bad in bad {
            assert_eq!(l.on_message_received(ROCKET, bad, 900), ReceiveOutcome::Malformed);
        }
        assert_eq!(l.remote_intent(), ArmIntent::Armed);
        assert_eq!(l.state().last_receive_ms(), Some(100));
    }

    #[test]
    fn ping_only_refreshes_liveness() {
        let bus = MemoryBus::new();
        let mut l = remote(&bus);
        l.on_message_received(ROCKET, br#"{"isArmed":1}"#, 100);
        assert_eq!(l.on_message_received(ROCKET, br#"{"ping":true}"#, 400), ReceiveOutcome::Liveness);
        assert_eq!(l.remote_intent(), ArmIntent::Armed);
        assert_eq!(l.state().last_receive_ms(), Some(400));

        assert_eq!(l.on_message_received(ROCKET, br#"{"rssi":-70}"#, 500), ReceiveOutcome::Liveness);
        assert_eq!(l.state().last_receive_ms(), Some(500));
    }

    #[test]
    fn frames_from_other_nodes_are_ignored() {
        let bus = MemoryBus::new();
        let mut l = remote(&bus);
        let stranger = MacAddr([0xcc, 0x8d, 0xa2, 0x8d, 0x07, 0xa8]);
        assert_eq!(l.on_message_received(stranger, br#"{"isArmed":1}"#, 100), ReceiveOutcome::ForeignSender);
        assert_eq!(l.remote_intent(), ArmIntent::Disarmed);
        assert_eq!(l.time_since_last_receive(100), None);
    }

    #[test]
    fn sends_once_per_interval() {
        let bus = MemoryBus::new();
        let mut l = remote(&bus);
        let mut peer = bus.transport();
        peer.bind(ROCKET).unwrap();

        assert!(!l.tick(999).sent);
        assert!(l.tick(1_000).sent);
        assert_eq!(l.state().last_send_ms(), 1_000);
        assert!(!l.tick(1_000).sent);
        assert!(!l.tick(1_999).sent);
        assert!(l.tick(2_500).sent);
        assert_eq!(l.state().last_send_ms(), 2_500);
        assert_eq!(bus.pending(ROCKET).unwrap(), 2);
    }

    #[test]
    fn clock_going_backwards_never_rewinds_last_send() {
        let bus = MemoryBus::new();
        let mut l = remote(&bus);
        l.tick(5_000);
        assert!(!l.tick(10).sent);
        assert_eq!(l.state().last_send_ms(), 5_000);
    }

    #[test]
    fn no_change_is_sent_as_ping() {
        let bus = MemoryBus::new();
        let mut l = remote(&bus);
        let mut peer = bus.transport();
        // stand-in for the rocket endpoint
        peer.bind(ROCKET).unwrap();

        l.tick(1_000);
        assert_eq!(&peer.try_recv().unwrap().payload[..], br#"{"ping":true}"#);

        l.set_local_intent(LocalIntent::Armed);
        l.tick(2_000);
        assert_eq!(&peer.try_recv().unwrap().payload[..], br#"{"isArmed":1}"#);
    }

    #[test]
    fn lost_frames_still_advance_the_send_clock() {
        let bus = MemoryBus::new();
        let mut l = rocket(&bus);
        bus.set_link_up(false).unwrap();
        let r = l.tick(1_000);
        assert!(r.sent);
        assert_eq!(l.state().last_send_ms(), 1_000);
        assert_eq!(bus.stats().unwrap().dropped, 1);
    }

    #[test]
    fn fail_safe_arms_after_contact_is_lost() {
        let bus = MemoryBus::new();
        let mut l = rocket(&bus);
        assert_eq!(l.local_intent(), LocalIntent::Disarmed);

        l.on_message_received(REMOTE, br#"{"isArmed":0}"#, 1_000);
        let r = l.tick(10_999);
        assert!(!r.stale);
        assert_eq!(l.local_intent(), LocalIntent::Disarmed);

        let r = l.tick(11_000);
        assert!(r.stale && r.failsafe_armed);
        assert_eq!(l.local_intent(), LocalIntent::Armed);
        assert_eq!(l.status(11_000), LinkStatus::Stale);

        // stays armed even once the peer is back
        l.on_message_received(REMOTE, br#"{"isArmed":0}"#, 12_000);
        assert!(!l.tick(12_001).failsafe_armed);
        assert_eq!(l.local_intent(), LocalIntent::Armed);
        assert_eq!(l.status(12_001), LinkStatus::Connected);

        l.set_local_intent(LocalIntent::Disarmed);
        assert_eq!(l.local_intent(), LocalIntent::Disarmed);
    }

    #[test]
    fn passive_policy_only_reports() {
        let bus = MemoryBus::new();
        let mut l = remote(&bus);
        l.set_local_intent(LocalIntent::Disarmed);
        l.on_message_received(ROCKET, br#"{"ping":true}"#, 1_000);

        let r = l.tick(31_000);
        assert!(r.stale);
        assert!(!r.failsafe_armed);
        assert_eq!(l.local_intent(), LocalIntent::Disarmed);
    }

    #[test]
    fn silence_from_boot_never_trips_the_timeout() {
        let bus = MemoryBus::new();
        let mut l = rocket(&bus);
        let r = l.tick(10 * 60 * 1_000);
        assert!(!r.stale);
        assert_eq!(l.local_intent(), LocalIntent::Disarmed);
        assert_eq!(l.status(10 * 60 * 1_000), LinkStatus::Unknown);
    }

    #[test]
    fn stale_is_not_sticky() {
        let bus = MemoryBus::new();
        let mut l = remote(&bus);
        l.on_message_received(ROCKET, br#"{"ping":true}"#, 0);
        assert!(l.tick(30_000).stale);
        l.on_message_received(ROCKET, br#"{"ping":true}"#, 30_500);
        assert!(!l.tick(30_600).stale);
        assert_eq!(l.snapshot(30_600).since_last_receive_ms, Some(100));
    }

    #[test]
    fn initialize_fails_when_address_is_taken() {
        let bus = MemoryBus::new();
        let _first = rocket(&bus);
        let err = HeartbeatLink::initialize(&LinkConfig::for_role(Role::Rocket, ROCKET, REMOTE), bus.transport())
            .err()
            .unwrap();
        assert!(matches!(err, LinkError::Bind { addr, .. } if addr == ROCKET));
    }

    #[test]
    fn restarted_node_rebinds_its_address() {
        let bus = MemoryBus::new();
        let mut rm = remote(&bus);
        drop(rocket(&bus));

        for t in 0..100 {
            rm.tick(t * 1_000);
        }
        assert_eq!(bus.pending(ROCKET).unwrap(), 0);

        let mut rk = rocket(&bus);
        rm.set_local_intent(LocalIntent::Armed);
        rm.tick(100_000);
        rk.tick(100_010);
        assert_eq!(rk.remote_intent(), ArmIntent::Armed);
    }
}
