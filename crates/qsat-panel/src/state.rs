use qsat_link::{LinkSnapshot, LinkStatus, LocalIntent};
use qsat_proto::ArmIntent;

/// 16-bit 5/6/5 colour as the TFT controller takes it.
pub type Rgb565 = u16;

pub const WHITE: Rgb565 = 0xFFFF;

/// Pack already-scaled channels (r: 0..31, g: 0..63, b: 0..31).
pub fn rgb565(r: u8, g: u8, b: u8) -> Rgb565 {
    ((r as u16 & 0x1F) << 11) | ((g as u16 & 0x3F) << 5) | (b as u16 & 0x1F)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Armed,
    Disarmed,
    Neutral,
    Disconnected,
}

impl PanelState {
    pub fn label(self) -> &'static str {
        match self {
            PanelState::Armed => "ARMED",
            PanelState::Disarmed => "DISARMED",
            PanelState::Neutral => "NEUTRAL",
            PanelState::Disconnected => "DISCONNECTED",
        }
    }

    pub fn color(self) -> Rgb565 {
        match self {
            PanelState::Armed => rgb565(25, 10, 1),
            PanelState::Disarmed => rgb565(7, 45, 5),
            PanelState::Neutral => rgb565(11, 11, 11),
            PanelState::Disconnected => WHITE,
        }
    }
}

impl From<LocalIntent> for PanelState {
    fn from(i: LocalIntent) -> Self {
        match i {
            LocalIntent::Armed => PanelState::Armed,
            LocalIntent::Disarmed => PanelState::Disarmed,
            LocalIntent::NoChange => PanelState::Neutral,
        }
    }
}

impl From<ArmIntent> for PanelState {
    fn from(i: ArmIntent) -> Self {
        match i {
            ArmIntent::Armed => PanelState::Armed,
            ArmIntent::Disarmed => PanelState::Disarmed,
        }
    }
}

/// Everything the controller screen shows about the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayUpdate {
    pub local: PanelState,
    pub remote: PanelState,
    /// Whole seconds since the last accepted frame; `None` before first contact.
    pub last_ping_age_s: Option<u64>,
}

impl From<&LinkSnapshot> for DisplayUpdate {
    fn from(s: &LinkSnapshot) -> Self {
        let remote = match s.status {
            LinkStatus::Connected => s.remote_intent.into(),
            LinkStatus::Unknown | LinkStatus::Stale => PanelState::Disconnected,
        };
        Self {
            local: s.local_intent.into(),
            remote,
            last_ping_age_s: s.since_last_receive_ms.map(|ms| ms / 1_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(status: LinkStatus, age: Option<u64>) -> LinkSnapshot {
        LinkSnapshot {
            local_intent: LocalIntent::NoChange,
            remote_intent: ArmIntent::Armed,
            status,
            since_last_receive_ms: age,
        }
    }

    #[test]
    fn packs_565() {
        assert_eq!(rgb565(31, 0, 0), 0xF800);
        assert_eq!(rgb565(0, 63, 0), 0x07E0);
        assert_eq!(rgb565(0, 0, 31), 0x001F);
        // channels are masked, not saturated
        assert_eq!(rgb565(32, 64, 32), 0);
    }

    #[test]
    fn remote_shows_disconnected_unless_connected() {
        let u = DisplayUpdate::from(&snap(LinkStatus::Connected, Some(2_500)));
        assert_eq!(u.remote, PanelState::Armed);
        assert_eq!(u.local, PanelState::Neutral);
        assert_eq!(u.last_ping_age_s, Some(2));

        let u = DisplayUpdate::from(&snap(LinkStatus::Stale, Some(31_000)));
        assert_eq!(u.remote, PanelState::Disconnected);

        let u = DisplayUpdate::from(&snap(LinkStatus::Unknown, None));
        assert_eq!(u.remote, PanelState::Disconnected);
        assert_eq!(u.last_ping_age_s, None);
    }

    #[test]
    fn labels_and_colors() {
        assert_eq!(PanelState::Disconnected.label(), "DISCONNECTED");
        assert_eq!(PanelState::Disconnected.color(), WHITE);
        assert_ne!(PanelState::Armed.color(), PanelState::Disarmed.color());
    }
}
