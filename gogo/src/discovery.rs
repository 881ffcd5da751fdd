//! Discovery phase: the conductor listens for `Caps` beacons for a fixed
//! window and pings back each newly-seen player; a player beacons `Caps`
//! once a second until it receives any `Ping`.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rand::Rng;

use gogo_protocol::{Caps, Packet, PLAYER_NAME};

use crate::net::{Destination, Outbound, Transport};

/// Length of the conductor's discovery window.
pub const DISCOVERY_WINDOW: Duration = Duration::from_secs(5);

/// Interval between a player's `Caps` beacons.
pub const BEACON_INTERVAL: Duration = Duration::from_secs(1);

/// Runs the conductor side of discovery to completion and returns the
/// ordered, de-duplicated list of admitted player addresses.
pub fn run_conductor(transport: &Transport, window: Duration) -> Vec<SocketAddr> {
    let deadline = Instant::now() + window;
    let mut seen = HashSet::new();
    let mut admitted = Vec::new();

    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }

        let timeout = deadline - now;
        let inbound = match transport.inbound.recv_timeout(timeout) {
            Ok(inbound) => inbound,
            Err(_) => break,
        };

        let Packet::Caps(caps) = inbound.packet else {
            log::trace!("ignoring non-CAPS packet from {} during discovery", inbound.from);
            continue;
        };

        if caps.name != PLAYER_NAME {
            log::info!(
                "ignoring CAPS with unsupported name {:?} from {}",
                String::from_utf8_lossy(&caps.name),
                inbound.from,
            );
            continue;
        }

        if !seen.insert(inbound.from) {
            log::debug!("duplicate CAPS from already-admitted {}", inbound.from);
            continue;
        }

        log::info!("admitted player {} ({} voice(s))", inbound.from, caps.num_voices);
        admitted.push(inbound.from);

        let nonce: [u8; 32] = rand::thread_rng().gen();
        let _ = transport.outbound.send(Outbound {
            packet: Packet::Ping(nonce),
            to: Destination::Unicast(inbound.from),
        });
    }

    admitted
}

/// Generates the 24-byte identity a player keeps for its entire process
/// lifetime, across rediscovery cycles.
pub fn generate_identity() -> [u8; 24] {
    rand::thread_rng().gen()
}

/// Runs the player side of discovery to completion: beacons `Caps` every
/// [`BEACON_INTERVAL`] and returns as soon as any `Ping` is received.
pub fn run_player(transport: &Transport, identity: [u8; 24]) {
    let caps = Packet::Caps(Caps { name: PLAYER_NAME, num_voices: 1, identity });
    let ticker = crossbeam_channel::tick(BEACON_INTERVAL);

    // Fire the first beacon immediately rather than waiting a full
    // interval for the ticker's first tick.
    send_beacon(transport, &caps);

    loop {
        crossbeam_channel::select! {
            recv(ticker) -> _ => {
                send_beacon(transport, &caps);
            }
            recv(transport.inbound) -> inbound => {
                match inbound {
                    Ok(inbound) if matches!(inbound.packet, Packet::Ping(_)) => {
                        log::info!("received ping from {}, admitted", inbound.from);
                        return;
                    }
                    Ok(_) => {
                        // anything else before admission is ignored
                    }
                    Err(_) => {
                        log::error!("network receiver shut down during discovery");
                        return;
                    }
                }
            }
        }
    }
}

fn send_beacon(transport: &Transport, caps: &Packet) {
    log::debug!("broadcasting CAPS beacon");
    let _ = transport.outbound.send(Outbound {
        packet: caps.clone(),
        to: Destination::Broadcast,
    });
}
