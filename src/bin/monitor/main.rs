//! Live view of the network. Reads the fence master's control lines from a
//! serial device (or a capture of one, or a simulated network) and redraws
//! the merged topology as it changes.
//!
//! Logs are appended to `monitor.log` (or `--log-file`) so they don't land
//! on top of the view: `RUST_LOG=debug monitor /dev/ttyUSB0`

use clap::Parser;
use env_logger::{Builder, Target};
use log::{error, info, warn, Level};
use rflab::{
    args::MonitorArgs,
    config::LabConfig,
    control::{ControlSession, StreamMode},
    gui::{device_selector, topology_view},
    link::{available_ports, open_device, spawn_reader, LinkError},
    simulate::Simulator,
};
use std::{
    error::Error,
    fs::OpenOptions,
    io,
    path::Path,
    process,
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

type Shared = Arc<Mutex<ControlSession>>;

// Feed lines into the session until it is poisoned.
fn session_sink(shared: Shared) -> impl FnMut(&str) -> bool + Send + 'static {
    move |line: &str| match shared.lock() {
        Ok(mut session) => {
            session.handle_line(line);
            true
        }
        Err(_) => false,
    }
}

// Put the reader's fate in the session's history once it stops, so the view
// can show it.
fn watch_reader(reader: JoinHandle<Result<(), LinkError>>, shared: Shared) -> JoinHandle<()> {
    thread::spawn(move || {
        let (level, text) = match reader.join() {
            Ok(Ok(())) => (Level::Info, "end of input".to_owned()),
            Ok(Err(e)) => (Level::Error, format!("reader stopped: {}", e)),
            Err(_) => (Level::Error, "reader panicked".to_owned()),
        };
        if let Ok(mut session) = shared.lock() {
            session.record(level, text);
        }
    })
}

fn init_logging(path: &Path) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Builder::from_default_env()
        .target(Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn run(args: MonitorArgs) -> Result<(), Box<dyn Error>> {
    let cfg = LabConfig::load(args.config.as_deref())?;
    let mode = if args.blocks {
        StreamMode::Blocks
    } else {
        StreamMode::Control
    };
    let shared = Arc::new(Mutex::new(ControlSession::new(
        mode,
        &cfg.ctrl_prefix,
        args.dedup,
    )));

    let (title, reader) = match args.simulate {
        Some(num_nodes) => {
            let mut builder = Simulator::builder()
                .num_nodes(num_nodes)
                .prefix(&cfg.ctrl_prefix);
            if let Some(seed) = args.seed {
                builder = builder.seed(seed);
            }
            info!("simulating {} nodes", num_nodes);
            let reader = spawn_reader(builder.build(), false, session_sink(shared.clone()));
            (format!("simulated network ({} nodes)", num_nodes), reader)
        }
        None => {
            let path = match args.dev {
                Some(path) => path,
                None => match device_selector(available_ports()?)? {
                    Some(path) => path,
                    None => {
                        info!("no device selected");
                        return Ok(());
                    }
                },
            };
            let device = open_device(&path, args.baud.unwrap_or(cfg.baud_rate))?;
            if args.follow && !device.is_replay() {
                warn!("--follow only applies to capture files");
            }
            let reader = spawn_reader(device, args.follow, session_sink(shared.clone()));
            (path.to_string_lossy().into_owned(), reader)
        }
    };
    watch_reader(reader, shared.clone());

    topology_view(shared, Duration::from_millis(cfg.tick_ms), &title)?;
    Ok(())
}

fn main() {
    let args = MonitorArgs::parse();
    if let Err(e) = init_logging(&args.log_file) {
        eprintln!("monitor: {}: {}; logging to stderr", args.log_file.display(), e);
        env_logger::init();
    }

    if let Err(e) = run(args) {
        error!("{}", e);
        eprintln!("monitor: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rflab::control::Event;
    use std::io::{self, Read};

    struct Unplugged;

    impl Read for Unplugged {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
        }
    }

    fn last_event(shared: &Shared) -> Option<Event> {
        shared.lock().unwrap().history().last().cloned()
    }

    fn shared() -> Shared {
        Arc::new(Mutex::new(ControlSession::new(
            StreamMode::Control,
            "CTRL: ",
            false,
        )))
    }

    #[test]
    fn reader_failure_is_shown() {
        let s = shared();
        let reader = spawn_reader(Unplugged, false, session_sink(s.clone()));
        watch_reader(reader, s.clone()).join().unwrap();

        let event = last_event(&s).unwrap();
        assert_eq!(event.level, Level::Error);
        assert!(event.text.starts_with("reader stopped: device disconnected"));
    }

    #[test]
    fn end_of_input_is_shown() {
        let s = shared();
        let input = io::Cursor::new(b"CTRL: digraph RF { 0 -> 1; }\n".to_vec());
        let reader = spawn_reader(input, false, session_sink(s.clone()));
        watch_reader(reader, s.clone()).join().unwrap();

        assert!(s.lock().unwrap().topology().is_some());
        let event = last_event(&s).unwrap();
        assert_eq!(event.level, Level::Info);
        assert_eq!(event.text, "end of input");
    }
}
