pub mod addr;
pub mod clock;
pub mod doctor;
pub mod link;
pub mod memory;
pub mod state;
pub mod transport;
pub mod udp;

pub use addr::MacAddr;
pub use link::{HeartbeatLink, LinkError, ReceiveOutcome, TickReport};
pub use state::{LinkSnapshot, LinkState, LinkStatus, LocalIntent};
pub use transport::{Frame, Transport, TransportError};

use serde::Deserialize;

/// Which side of the link this node is. Picks the stale policy and timeout
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Payload side: arms itself when the controller goes quiet.
    Rocket,
    /// Handheld controller: reports silence, never acts on it.
    Remote,
}

impl Role {
    /// Addresses flashed into the flight hardware, as `(local, peer)`.
    pub fn factory_addrs(self) -> (MacAddr, MacAddr) {
        let rocket = MacAddr([0x36, 0x33, 0x33, 0x33, 0x33, 0x33]);
        let remote = MacAddr([0x36, 0x33, 0x33, 0x33, 0x33, 0x32]);
        match self {
            Role::Rocket => (rocket, remote),
            Role::Remote => (remote, rocket),
        }
    }

    pub fn default_disconnect_timeout_ms(self) -> u64 {
        match self {
            Role::Rocket => 10_000,
            Role::Remote => 30_000,
        }
    }

    pub fn default_stale_policy(self) -> StalePolicy {
        match self {
            Role::Rocket => StalePolicy::FailSafeArm,
            Role::Remote => StalePolicy::Report,
        }
    }

    pub fn default_initial_intent(self) -> LocalIntent {
        match self {
            Role::Rocket => LocalIntent::Disarmed,
            Role::Remote => LocalIntent::NoChange,
        }
    }
}

/// Reaction to a peer that has been silent past the disconnect timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StalePolicy {
    /// Force the local intent to Armed.
    FailSafeArm,
    /// Log the outage, leave state alone.
    Report,
}

pub const DEFAULT_SEND_INTERVAL_MS: u64 = 1_000;

fn default_send_interval_ms() -> u64 {
    DEFAULT_SEND_INTERVAL_MS
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    pub role: Role,
    pub local_addr: MacAddr,
    pub peer_addr: MacAddr,

    /// Heartbeat period. Default 1000ms.
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,

    /// Peer silence before the link counts as stale. Role default when unset
    /// (rocket 10s, remote 30s).
    #[serde(default)]
    pub disconnect_timeout_ms: Option<u64>,

    #[serde(default)]
    pub stale_policy: Option<StalePolicy>,

    /// Intent at boot. Role default when unset.
    #[serde(default)]
    pub initial_intent: Option<LocalIntent>,
}

impl LinkConfig {
    pub fn for_role(role: Role, local_addr: MacAddr, peer_addr: MacAddr) -> Self {
        Self {
            role,
            local_addr,
            peer_addr,
            send_interval_ms: DEFAULT_SEND_INTERVAL_MS,
            disconnect_timeout_ms: None,
            stale_policy: None,
            initial_intent: None,
        }
    }

    pub fn disconnect_timeout_ms(&self) -> u64 {
        self.disconnect_timeout_ms.unwrap_or_else(|| self.role.default_disconnect_timeout_ms())
    }

    pub fn stale_policy(&self) -> StalePolicy {
        self.stale_policy.unwrap_or_else(|| self.role.default_stale_policy())
    }

    pub fn initial_intent(&self) -> LocalIntent {
        self.initial_intent.unwrap_or_else(|| self.role.default_initial_intent())
    }
}
