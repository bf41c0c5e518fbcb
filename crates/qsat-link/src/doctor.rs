use anyhow::Result;

use crate::LinkConfig;

pub fn check_link(cfg: &LinkConfig) -> Result<()> {
    anyhow::ensure!(cfg.send_interval_ms >= 50, "link.send_interval_ms too small; set >= 50");
    anyhow::ensure!(
        cfg.disconnect_timeout_ms() > cfg.send_interval_ms,
        "link.disconnect_timeout_ms ({}) must exceed send_interval_ms ({})",
        cfg.disconnect_timeout_ms(),
        cfg.send_interval_ms
    );
    anyhow::ensure!(cfg.local_addr != cfg.peer_addr, "link.local_addr and link.peer_addr are the same");
    anyhow::ensure!(!cfg.peer_addr.is_broadcast(), "link.peer_addr must be a unicast address");
    anyhow::ensure!(!cfg.local_addr.is_broadcast(), "link.local_addr must be a unicast address");
    Ok(())
}
