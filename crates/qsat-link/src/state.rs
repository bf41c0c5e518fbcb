use qsat_proto::{ArmIntent, Message};
use serde::Deserialize;

use crate::addr::MacAddr;

/// What this node wants to broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocalIntent {
    Armed,
    Disarmed,
    /// Nothing to report; heartbeats go out as pings.
    NoChange,
}

impl LocalIntent {
    pub fn message(self) -> Message {
        match self {
            LocalIntent::Armed => Message::Intent(ArmIntent::Armed),
            LocalIntent::Disarmed => Message::Intent(ArmIntent::Disarmed),
            LocalIntent::NoChange => Message::Ping,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// No frame accepted since boot.
    Unknown,
    Connected,
    /// Peer silent for at least the disconnect timeout.
    Stale,
}

/// Per-node link state. Timestamps are milliseconds since boot.
#[derive(Debug, Clone)]
pub struct LinkState {
    pub(crate) local_intent: LocalIntent,
    pub(crate) remote_intent: ArmIntent,
    pub(crate) last_send_ms: u64,
    pub(crate) last_receive_ms: Option<u64>,
    pub(crate) peer: MacAddr,
}

impl LinkState {
    pub fn new(peer: MacAddr, local_intent: LocalIntent) -> Self {
        Self {
            local_intent,
            remote_intent: ArmIntent::Disarmed,
            last_send_ms: 0,
            last_receive_ms: None,
            peer,
        }
    }

    pub fn local_intent(&self) -> LocalIntent {
        self.local_intent
    }

    pub fn remote_intent(&self) -> ArmIntent {
        self.remote_intent
    }

    pub fn last_send_ms(&self) -> u64 {
        self.last_send_ms
    }

    pub fn last_receive_ms(&self) -> Option<u64> {
        self.last_receive_ms
    }

    pub fn peer(&self) -> MacAddr {
        self.peer
    }

    pub fn since_last_receive(&self, now: u64) -> Option<u64> {
        self.last_receive_ms.map(|t| now.saturating_sub(t))
    }

    pub fn status(&self, now: u64, disconnect_timeout_ms: u64) -> LinkStatus {
        match self.since_last_receive(now) {
            None => LinkStatus::Unknown,
            Some(age) if age >= disconnect_timeout_ms => LinkStatus::Stale,
            Some(_) => LinkStatus::Connected,
        }
    }
}

/// Read-only view handed to display/control code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub local_intent: LocalIntent,
    pub remote_intent: ArmIntent,
    pub status: LinkStatus,
    pub since_last_receive_ms: Option<u64>,
}
