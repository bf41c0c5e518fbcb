use std::fmt::Write;

use crate::state::DisplayUpdate;

/// Redraw gate: the screen is repainted only when something visible changed,
/// which for the ping age means a new whole second.
#[derive(Debug, Default)]
pub struct PanelRefresh {
    last: Option<DisplayUpdate>,
}

impl PanelRefresh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll(&mut self, update: DisplayUpdate) -> Option<DisplayUpdate> {
        if self.last == Some(update) {
            return None;
        }
        self.last = Some(update);
        Some(update)
    }

    pub fn last(&self) -> Option<&DisplayUpdate> {
        self.last.as_ref()
    }
}

/// One-line terminal rendering of the panel.
pub fn render_text(u: &DisplayUpdate) -> String {
    let mut s = String::new();
    let _ = write!(s, "REMOTE {:<12} | LOCAL {:<8} | LAST PING ", u.remote.label(), u.local.label());
    match u.last_ping_age_s {
        Some(age) => {
            let _ = write!(s, "{}s", age);
        }
        None => s.push_str("N/A"),
    }
    s
}
