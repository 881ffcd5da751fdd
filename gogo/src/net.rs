//! UDP transport: a receiver and a sender thread bridging a bound socket to
//! typed message channels, decoupling network I/O latency from caller
//! timing. Malformed datagrams and send errors are logged and dropped; a
//! socket read error terminates the receiver (and, by channel closure,
//! signals callers that no more datagrams will arrive).

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use socket2::{Domain, Socket as Socket2, Type};

use gogo_protocol::{Packet, CONDUCTOR_PORT};

use crate::thread as gogo_thread;

pub const BROADCAST_ADDR: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(255, 255, 255, 255), CONDUCTOR_PORT);

#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("creating socket: {0}")]
    Socket(io::Error),
    #[error("setting SO_REUSEADDR: {0}")]
    SetReuseAddr(io::Error),
    #[error("setting SO_BROADCAST: {0}")]
    SetBroadcast(io::Error),
    #[error("binding {0}: {1}")]
    Bind(SocketAddr, io::Error),
}

/// Where an outbound packet should go.
#[derive(Debug, Clone, Copy)]
pub enum Destination {
    Unicast(SocketAddr),
    Broadcast,
}

#[derive(Debug, Clone)]
pub struct Inbound {
    pub packet: Packet,
    pub from: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct Outbound {
    pub packet: Packet,
    pub to: Destination,
}

fn open(bind: SocketAddr) -> Result<UdpSocket, BindError> {
    let socket = Socket2::new(Domain::IPV4, Type::DGRAM, None).map_err(BindError::Socket)?;
    socket.set_reuse_address(true).map_err(BindError::SetReuseAddr)?;
    socket.set_broadcast(true).map_err(BindError::SetBroadcast)?;
    socket.bind(&bind.into()).map_err(|e| BindError::Bind(bind, e))?;
    Ok(socket.into())
}

/// Binds the conductor's well-known discovery/command port on all interfaces.
pub fn bind_conductor() -> Result<UdpSocket, BindError> {
    open(SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), CONDUCTOR_PORT))
}

/// Binds an ephemeral local port for a player.
pub fn bind_player() -> Result<UdpSocket, BindError> {
    open(SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0))
}

/// Receiver + sender worker pair over one bound socket.
pub struct Transport {
    pub inbound: Receiver<Inbound>,
    pub outbound: Sender<Outbound>,
    pub(crate) _receiver: JoinHandle<()>,
    pub(crate) _sender: JoinHandle<()>,
}

impl Transport {
    /// `inbound_capacity`/`outbound_capacity` of 0 makes the channel a
    /// rendezvous (unbuffered) channel, as the player uses.
    pub fn spawn(socket: UdpSocket, inbound_capacity: usize, outbound_capacity: usize) -> Transport {
        let socket = Arc::new(socket);

        let (inbound_tx, inbound_rx) = crossbeam_channel::bounded(inbound_capacity);
        let (outbound_tx, outbound_rx) = crossbeam_channel::bounded(outbound_capacity);

        let receiver = gogo_thread::spawn("gogo/net-recv", {
            let socket = socket.clone();
            move || receive_loop(&socket, inbound_tx)
        });

        let sender = gogo_thread::spawn("gogo/net-send", {
            move || send_loop(&socket, outbound_rx)
        });

        Transport {
            inbound: inbound_rx,
            outbound: outbound_tx,
            _receiver: receiver,
            _sender: sender,
        }
    }
}

fn receive_loop(socket: &UdpSocket, tx: Sender<Inbound>) {
    let mut buf = [0u8; 512];

    loop {
        let (nbytes, from) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(err) => {
                log::error!("socket read error, shutting down receiver: {err}");
                return;
            }
        };

        match Packet::deserialize(&buf[..nbytes]) {
            Ok(packet) => {
                if tx.send(Inbound { packet, from }).is_err() {
                    // no one is listening anymore
                    return;
                }
            }
            Err(err) => {
                log::warn!("malformed datagram from {from}: {err}");
            }
        }
    }
}

fn send_loop(socket: &UdpSocket, rx: Receiver<Outbound>) {
    for Outbound { packet, to } in rx {
        let addr: SocketAddr = match to {
            Destination::Unicast(addr) => addr,
            Destination::Broadcast => BROADCAST_ADDR.into(),
        };

        let buf = packet.serialize();
        if let Err(err) = socket.send_to(&buf, addr) {
            log::warn!("send to {addr} failed: {err}");
        }
    }
}
