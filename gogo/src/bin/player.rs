use std::process::ExitCode;

use gogo::{audio, discovery, net, waveform};
use gogo_protocol::Packet;

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error("binding player socket: {0}")]
    Bind(#[from] net::BindError),
    #[error("opening audio output: {0}")]
    Audio(#[from] audio::OpenError),
}

fn run() -> Result<(), RunError> {
    let socket = net::bind_player()?;
    let transport = net::Transport::spawn(socket, 0, 0);
    let speaker = audio::Speaker::open()?;
    let identity = discovery::generate_identity();

    loop {
        log::info!("entering discovery");
        discovery::run_player(&transport, identity);
        log::info!("admitted, awaiting playback commands");
        dispatch_loop(&transport, &speaker);
    }
}

/// Consumes inbound packets until a `Quit` sends the player back to
/// discovery; the network receiver shutting down ends the process instead
/// since there's nothing left to drive playback with.
fn dispatch_loop(transport: &net::Transport, speaker: &audio::Speaker) {
    loop {
        let inbound = match transport.inbound.recv() {
            Ok(inbound) => inbound,
            Err(_) => {
                log::error!("network receiver shut down, exiting");
                std::process::exit(1);
            }
        };

        match inbound.packet {
            Packet::Play(play) => handle_play(speaker, play),
            Packet::Quit => {
                log::info!("received QUIT, clearing playback and re-entering discovery");
                speaker.clear();
                return;
            }
            Packet::KeepAlive | Packet::Ping(_) | Packet::Caps(_) | Packet::Unknown { .. } => {
                log::trace!("ignoring {:?} packet outside of its phase", inbound.packet.kind());
            }
        }
    }
}

fn handle_play(speaker: &audio::Speaker, play: gogo_protocol::Play) {
    let sample_rate = speaker.sample_rate();

    let generator = match waveform::make_generator(play.voice_id, sample_rate, play.frequency_hz, play.amplitude) {
        Ok(generator) => generator,
        Err(err) => {
            log::warn!("skipping note: {err}");
            return;
        }
    };

    let wavelength = waveform::wavelength_in_samples(sample_rate, play.frequency_hz);
    let requested = audio::duration_to_samples(play.duration, sample_rate);
    let samples = if wavelength == 0 { 0 } else { (requested / wavelength) * wavelength };

    if samples == 0 {
        log::debug!("note shorter than one waveform period, skipping");
        return;
    }

    speaker.enqueue(generator, samples);
}
