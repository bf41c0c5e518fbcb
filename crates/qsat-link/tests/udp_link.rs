use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use qsat_link::clock::{Clock, ManualClock};
use qsat_link::udp::UdpTransport;
use qsat_link::{HeartbeatLink, LinkConfig, LinkError, LinkStatus, LocalIntent, Role, TransportError};
use qsat_proto::ArmIntent;

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn config(role: Role) -> LinkConfig {
    let (local, peer) = role.factory_addrs();
    let mut cfg = LinkConfig::for_role(role, local, peer);
    cfg.send_interval_ms = 20;
    cfg
}

#[tokio::test]
async fn initialize_fails_without_a_route_to_the_peer() {
    let cfg = config(Role::Rocket);
    let transport = UdpTransport::open(loopback(), HashMap::new()).await.unwrap();
    let err = HeartbeatLink::initialize(&cfg, transport).err().unwrap();
    assert!(matches!(
        err,
        LinkError::RegisterPeer { addr, source: TransportError::UnknownPeer(_) } if addr == cfg.peer_addr
    ));
}

#[tokio::test]
async fn rocket_and_remote_exchange_intents_over_udp() {
    let rocket_cfg = config(Role::Rocket);
    let remote_cfg = config(Role::Remote);

    let mut rocket_t = UdpTransport::open(loopback(), HashMap::new()).await.unwrap();
    let mut remote_t = UdpTransport::open(loopback(), HashMap::new()).await.unwrap();
    rocket_t.add_route(rocket_cfg.peer_addr, remote_t.local_socket_addr().unwrap());
    remote_t.add_route(remote_cfg.peer_addr, rocket_t.local_socket_addr().unwrap());

    let mut rocket = HeartbeatLink::initialize(&rocket_cfg, rocket_t).unwrap();
    let mut remote = HeartbeatLink::initialize(&remote_cfg, remote_t).unwrap();
    remote.set_local_intent(LocalIntent::Armed);

    let clock = ManualClock::new(0);
    for _ in 0..200 {
        let now = clock.advance(20);
        rocket.tick(now);
        remote.tick(now);
        if rocket.remote_intent() == ArmIntent::Armed && remote.status(now) == LinkStatus::Connected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let now = clock.now_millis();
    assert_eq!(rocket.remote_intent(), ArmIntent::Armed);
    assert_eq!(rocket.status(now), LinkStatus::Connected);
    assert_eq!(remote.remote_intent(), ArmIntent::Disarmed);
    assert_eq!(remote.status(now), LinkStatus::Connected);
    // contact within the timeout keeps the fail-safe out of it
    assert_eq!(rocket.local_intent(), LocalIntent::Disarmed);
}
