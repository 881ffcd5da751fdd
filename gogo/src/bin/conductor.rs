use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use structopt::StructOpt;

use gogo::{discovery, dispatch, ingest, merge, net, progress};
use gogo::thread as gogo_thread;

#[derive(Debug, StructOpt)]
#[structopt(name = "conductor", about = "Broadcasts a Standard MIDI File across discovered gogo players")]
struct Opt {
    /// Path to the .mid file to perform.
    #[structopt(parse(from_os_str))]
    midifile: PathBuf,
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error("binding conductor socket: {0}")]
    Bind(#[from] net::BindError),
    #[error("no players responded during discovery")]
    NoPlayers,
    #[error("reading {0}: {1}")]
    ReadFile(PathBuf, std::io::Error),
    #[error("parsing MIDI file: {0}")]
    Ingest(#[from] ingest::IngestError),
    #[error("interrupted")]
    Interrupted,
}

fn main() -> Result<(), ExitCode> {
    env_logger::init();

    run(Opt::from_args()).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::FAILURE
    })
}

fn run(opt: Opt) -> Result<(), RunError> {
    let socket = net::bind_conductor()?;
    let transport = net::Transport::spawn(socket, 32, 32);

    log::info!("listening for players for {:?}", discovery::DISCOVERY_WINDOW);
    let clients = discovery::run_conductor(&transport, discovery::DISCOVERY_WINDOW);

    if clients.is_empty() {
        return Err(RunError::NoPlayers);
    }

    log::info!("{} player(s) admitted", clients.len());

    let bytes = fs::read(&opt.midifile).map_err(|err| RunError::ReadFile(opt.midifile.clone(), err))?;
    let voices = ingest::parse_smf(&bytes)?;
    let streams = merge::merge(&voices, clients.len());

    let quit_requested = Arc::new(AtomicBool::new(false));
    {
        let quit_requested = quit_requested.clone();
        let _ = ctrlc::set_handler(move || {
            quit_requested.store(true, Ordering::SeqCst);
        });
    }

    let total = streams.iter().map(|s| s.end_time()).max().unwrap_or_default();
    let (start, mut handles) = dispatch::start(transport.outbound.clone(), clients.clone(), streams);

    let progress_handle = gogo_thread::spawn("gogo/progress", move || progress::run(start, total));

    // Poll for completion rather than blocking on `join`, so a SIGINT can
    // short-circuit the wait even while a dispatcher thread is mid-sleep.
    while !handles.is_empty() {
        if quit_requested.load(Ordering::SeqCst) {
            break;
        }
        handles.retain(|h| !h.is_finished());
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    let interrupted = quit_requested.load(Ordering::SeqCst);

    dispatch::quit_all(&transport.outbound, &clients);
    let _ = progress_handle.join();

    if interrupted {
        log::warn!("interrupted, {} client(s) sent QUIT", clients.len());
        return Err(RunError::Interrupted);
    }

    Ok(())
}
