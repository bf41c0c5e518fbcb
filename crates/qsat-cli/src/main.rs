use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use qsat_link::clock::{Clock, ManualClock, MonotonicClock};
use qsat_link::memory::{MemoryBus, MemoryTransport};
use qsat_link::udp::UdpTransport;
use qsat_link::{doctor as link_doctor, HeartbeatLink, LinkConfig, LinkSnapshot, LocalIntent, Role, Transport};
use qsat_panel::{press, render_text, Button, DisplayUpdate, PanelRefresh};

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

#[derive(Debug, Parser)]
#[command(name = "qsat", version, about = "QSat arm/disarm heartbeat link")]
struct Cli {
    /// Node config (TOML). Required by `run` and `doctor`.
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Doctor,
    /// Run one node over UDP. Type `arm`, `disarm`, `hold` or `status` on stdin.
    Run,
    /// Rocket and remote in one process on a simulated radio, with a dropout.
    Simulate {
        #[arg(long, default_value_t = 20_000)]
        duration_ms: u64,
        /// Cut the radio at this time.
        #[arg(long, default_value_t = 5_000)]
        silence_after_ms: u64,
        #[arg(long, default_value_t = 100)]
        step_ms: u64,
    },
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    link: LinkConfig,
    udp: UdpCfg,
    run: Option<RunCfg>,
}

#[derive(Debug, serde::Deserialize)]
struct UdpCfg {
    listen: String,
    /// Socket address of the peer node.
    peer: String,
}

#[derive(Debug, serde::Deserialize)]
struct RunCfg {
    poll_interval_ms: u64,
}

impl UdpCfg {
    fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().with_context(|| format!("udp.listen invalid: {}", self.listen))
    }

    fn peer_addr(&self) -> Result<SocketAddr> {
        self.peer.parse().with_context(|| format!("udp.peer invalid: {}", self.peer))
    }
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    Ok(toml::from_str(&s).context("parse config toml")?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Doctor => doctor(&load_config(cli.config.as_deref().context("--config required")?)?)?,
        Command::Run => run(&load_config(cli.config.as_deref().context("--config required")?)?).await?,
        Command::Simulate { duration_ms, silence_after_ms, step_ms } => simulate(duration_ms, silence_after_ms, step_ms)?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    link_doctor::check_link(&cfg.link)?;
    let listen = cfg.udp.listen_addr()?;
    let peer = cfg.udp.peer_addr()?;
    anyhow::ensure!(listen != peer, "udp.listen and udp.peer are the same socket");
    if let Some(r) = &cfg.run {
        anyhow::ensure!(r.poll_interval_ms > 0, "run.poll_interval_ms must be > 0");
        anyhow::ensure!(
            r.poll_interval_ms < cfg.link.send_interval_ms,
            "run.poll_interval_ms should be well below link.send_interval_ms"
        );
    }
    info!("doctor: OK");
    Ok(())
}

async fn run(cfg: &Config) -> Result<()> {
    info!("run: starting as {:?}", cfg.link.role);

    let routes = HashMap::from([(cfg.link.peer_addr, cfg.udp.peer_addr()?)]);
    let transport = UdpTransport::open(cfg.udp.listen_addr()?, routes)
        .await
        .context("open udp transport")?;
    // no retry: a node that cannot bind does not start
    let mut link = HeartbeatLink::initialize(&cfg.link, transport).context("link init")?;

    let poll_ms = cfg.run.as_ref().map(|r| r.poll_interval_ms).unwrap_or(10).max(1);
    let stdin = BufReader::new(tokio::io::stdin());
    serve(&mut link, poll_ms, stdin, tokio::signal::ctrl_c()).await
}

/// Tick the link and redraw the panel every `poll_ms` while applying operator
/// lines from `input`, until `shutdown` completes.
async fn serve<T, R, F>(link: &mut HeartbeatLink<T>, poll_ms: u64, input: R, shutdown: F) -> Result<()>
where
    T: Transport,
    R: AsyncBufRead + Unpin,
    F: Future,
{
    let clock = MonotonicClock::new();
    let mut panel = PanelRefresh::new();
    let mut poll = tokio::time::interval(Duration::from_millis(poll_ms));
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut lines = input.lines();
    let mut input_open = true;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("run: interrupted");
                return Ok(());
            }
            _ = poll.tick() => {
                let now = clock.now_millis();
                link.tick(now);
                if let Some(u) = panel.poll(DisplayUpdate::from(&link.snapshot(now))) {
                    info!("{}", render_text(&u));
                }
            }
            line = lines.next_line(), if input_open => {
                match line.context("read stdin")? {
                    Some(l) => operator_command(link, l.trim(), clock.now_millis()),
                    None => input_open = false,
                }
            }
        }
    }
}

fn operator_command<T: Transport>(link: &mut HeartbeatLink<T>, cmd: &str, now: u64) {
    match cmd {
        "" => {}
        "arm" => press(Button::Arm, link),
        "disarm" => press(Button::Disarm, link),
        "hold" => link.set_local_intent(LocalIntent::NoChange),
        "status" => print_snapshot(now, "node", &link.snapshot(now)),
        other => warn!("unknown command {:?} (arm|disarm|hold|status)", other),
    }
}

fn print_snapshot(now: u64, name: &str, s: &LinkSnapshot) {
    println!(
        "t={:>6}ms {:<6} status={:?} local={:?} remote={:?} last_rx_age={:?}",
        now, name, s.status, s.local_intent, s.remote_intent, s.since_last_receive_ms
    );
}

fn sim_node(bus: &MemoryBus, role: Role) -> Result<HeartbeatLink<MemoryTransport>> {
    let (local, peer) = role.factory_addrs();
    Ok(HeartbeatLink::initialize(&LinkConfig::for_role(role, local, peer), bus.transport())?)
}

fn simulate(duration_ms: u64, silence_after_ms: u64, step_ms: u64) -> Result<()> {
    anyhow::ensure!(step_ms > 0, "--step-ms must be > 0");
    info!("simulate: {}ms, radio cut at {}ms", duration_ms, silence_after_ms);

    let bus = MemoryBus::new();
    let clock = ManualClock::new(0);
    let mut rocket = sim_node(&bus, Role::Rocket)?;
    let mut remote = sim_node(&bus, Role::Remote)?;
    press(Button::Disarm, &mut remote);

    let mut last: [Option<LinkSnapshot>; 2] = [None, None];
    let mut radio_up = true;

    while clock.now_millis() < duration_ms {
        let now = clock.advance(step_ms);
        if radio_up && now >= silence_after_ms {
            radio_up = false;
            bus.set_link_up(false)?;
            println!("t={:>6}ms radio down", now);
        }

        remote.tick(now);
        rocket.tick(now);

        for (slot, (name, snap)) in last
            .iter_mut()
            .zip([("remote", remote.snapshot(now)), ("rocket", rocket.snapshot(now))])
        {
            // age changes every tick; report only the discrete fields
            let changed = slot.map_or(true, |p| {
                (p.status, p.local_intent, p.remote_intent) != (snap.status, snap.local_intent, snap.remote_intent)
            });
            if changed {
                print_snapshot(now, name, &snap);
            }
            *slot = Some(snap);
        }
    }

    let stats = bus.stats()?;
    println!("frames delivered={} dropped={}", stats.delivered, stats.dropped);
    Ok(())
}
