//! Drives each merged stream against wall-clock time: one worker thread per
//! admitted client, each blocking until its next event's due instant and
//! then enqueuing a `Play` packet. When every worker has run its stream to
//! completion, the caller is expected to call [`quit_all`] to tear down
//! every client.

use std::net::SocketAddr;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use gogo_protocol::packet::Play;
use gogo_protocol::Packet;

use crate::merge::Stream;
use crate::net::{Destination, Outbound};
use crate::thread as gogo_thread;
use crate::waveform;

/// How long the conductor waits after broadcasting `Quit` for the send
/// queue to drain before exiting, so the final datagrams aren't dropped by
/// an immediate socket close.
pub const QUIT_DRAIN: Duration = Duration::from_secs(1);

/// Spawns one dispatcher worker per `(client, stream)` pair and returns
/// immediately with the shared performance-start instant and the workers'
/// join handles — callers that also want to run a progress reporter
/// against `start` can do so before joining.
pub fn start(outbound: Sender<Outbound>, clients: Vec<SocketAddr>, streams: Vec<Stream>) -> (Instant, Vec<JoinHandle<()>>) {
    let start = Instant::now();

    let handles = clients
        .into_iter()
        .zip(streams)
        .map(|(client, stream)| {
            let outbound = outbound.clone();
            gogo_thread::spawn("gogo/dispatch", move || dispatch_stream(outbound, client, stream, start))
        })
        .collect();

    (start, handles)
}

fn dispatch_stream(outbound: Sender<Outbound>, client: SocketAddr, stream: Stream, start: Instant) {
    for event in stream.events {
        let due = start + event.real_time;
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }

        let play = Play {
            duration: event.duration,
            frequency_hz: waveform::midi_note_to_freq(event.key),
            amplitude: waveform::velocity_to_amplitude(event.velocity),
            voice_id: 1,
        };

        if outbound.send(Outbound { packet: Packet::Play(play), to: Destination::Unicast(client) }).is_err() {
            log::error!("outbound channel closed, stopping dispatcher for {client}");
            return;
        }
    }
}

/// Broadcasts `Quit` to every admitted client and waits [`QUIT_DRAIN`] for
/// the send queue to drain, used both at normal end-of-performance and on
/// SIGINT.
pub fn quit_all(outbound: &Sender<Outbound>, clients: &[SocketAddr]) {
    for &client in clients {
        let _ = outbound.send(Outbound { packet: Packet::Quit, to: Destination::Unicast(client) });
    }

    std::thread::sleep(QUIT_DRAIN);
}
