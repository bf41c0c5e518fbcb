pub mod refresh;
pub mod state;

pub use refresh::{render_text, PanelRefresh};
pub use state::{rgb565, DisplayUpdate, PanelState, Rgb565};

use qsat_link::{HeartbeatLink, LocalIntent, Transport};
use tracing::info;

/// The two touch buttons under the status lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Disarm,
    Arm,
}

impl Button {
    pub fn intent(self) -> LocalIntent {
        match self {
            Button::Disarm => LocalIntent::Disarmed,
            Button::Arm => LocalIntent::Armed,
        }
    }
}

pub fn press<T: Transport>(button: Button, link: &mut HeartbeatLink<T>) {
    info!("panel: {:?} pressed", button);
    link.set_local_intent(button.intent());
}
