//! Reading lines from the node: a UART device, or a file with a capture of
//! one for replay.

use log::{debug, info, warn};
use serial2::SerialPort;
use std::{
    fmt,
    fs::{self, File},
    io::{self, Read},
    path::{Path, PathBuf},
    str,
    thread::{self, JoinHandle},
    time::Duration,
};

/// Serial reads give up after this long so the reader can notice a closed
/// sink.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause before reading again after running out of input.
pub const EOF_BACKOFF: Duration = Duration::from_millis(10);

/// Errors opening or reading a device.
#[derive(Debug)]
pub enum LinkError {
    /// Returned when the device can't be opened or configured.
    Open { path: PathBuf, error: io::Error },

    /// Returned when a read fails for a reason other than a timeout, which
    /// usually means the device was unplugged.
    Disconnected(io::Error),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LinkError::Open { path, error } => {
                write!(f, "failed to open {}: {}", path.display(), error)
            }
            LinkError::Disconnected(error) => write!(f, "device disconnected: {}", error),
        }
    }
}

impl std::error::Error for LinkError {}

/// Where lines come from.
pub enum Device {
    /// A UART
    Serial(SerialPort),
    /// A capture file
    Replay(File),
}

impl Device {
    /// Whether running out of input means there is no more to come.
    pub fn is_replay(&self) -> bool {
        matches!(self, Device::Replay(_))
    }
}

impl Read for Device {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Device::Serial(port) => port.read(buf),
            Device::Replay(file) => file.read(buf),
        }
    }
}

/// Open `path`. Regular files are opened for replay; anything else is
/// treated as a serial device and configured for `baud_rate`.
pub fn open_device(path: &Path, baud_rate: u32) -> Result<Device, LinkError> {
    let open_err = |error| LinkError::Open {
        path: path.to_owned(),
        error,
    };

    if fs::metadata(path).map(|m| m.is_file()).unwrap_or(false) {
        info!("replaying {}", path.display());
        return File::open(path).map(Device::Replay).map_err(open_err);
    }

    let mut port = SerialPort::open(path, baud_rate).map_err(open_err)?;
    port.set_read_timeout(READ_TIMEOUT).map_err(open_err)?;
    info!("opened {} at {} baud", path.display(), baud_rate);
    Ok(Device::Serial(port))
}

/// Serial devices present on this machine.
pub fn available_ports() -> io::Result<Vec<PathBuf>> {
    SerialPort::available_ports()
}

/// Cuts a byte stream into lines. Line endings (`\n` or `\r\n`) are
/// stripped; lines that aren't valid UTF-8 are dropped.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode(raw: &[u8]) -> Option<String> {
        let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        match str::from_utf8(raw) {
            Ok(s) => Some(s.to_owned()),
            // Often happens at the beginning of transmission when there is
            // still garbage in the hardware buffer
            Err(e) => {
                warn!("Failed to decode utf-8: {:?}", e);
                None
            }
        }
    }

    /// Add `bytes`, returning every line they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &c in bytes {
            self.buf.push(c);
            if c == b'\n' {
                lines.extend(Self::decode(&self.buf));
                self.buf.clear();
            }
        }
        lines
    }

    /// Whatever is left over after the input ends, as a final line.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = Self::decode(&self.buf);
        self.buf.clear();
        line
    }
}

/// Read `source` on a background thread, handing each line to `sink`.
///
/// When the source runs dry the thread stops, unless `follow` is set, in
/// which case it waits for more like `tail -f`. Timeouts are retried. The
/// thread also stops as soon as `sink` returns false.
pub fn spawn_reader<R, F>(mut source: R, follow: bool, mut sink: F) -> JoinHandle<Result<(), LinkError>>
where
    R: Read + Send + 'static,
    F: FnMut(&str) -> bool + Send + 'static,
{
    thread::spawn(move || {
        info!("reader started");
        let mut buffer = [0; 256];
        let mut splitter = LineSplitter::new();

        loop {
            let read_len = match source.read(&mut buffer) {
                Ok(0) if follow => {
                    spin_sleep::sleep(EOF_BACKOFF);
                    continue;
                }
                Ok(0) => break,
                Ok(n) => n,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(e) => return Err(LinkError::Disconnected(e)),
            };

            for line in splitter.push(&buffer[..read_len]) {
                if !sink(&line) {
                    debug!("sink closed, reader stopping");
                    return Ok(());
                }
            }
        }

        if let Some(line) = splitter.finish() {
            sink(&line);
        }
        info!("reader reached end of input");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::VecDeque,
        io::{Cursor, Write},
        sync::{Arc, Mutex},
    };

    // Hands out one scripted chunk or error per read, then end of input.
    struct Scripted(VecDeque<Result<&'static [u8], io::ErrorKind>>);

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
                Some(Err(kind)) => Err(io::Error::new(kind, "unplugged")),
                None => Ok(0),
            }
        }
    }

    fn collect_lines(source: Scripted) -> (Result<(), LinkError>, Vec<String>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let res = spawn_reader(source, false, move |line| {
            sink_seen.lock().unwrap().push(line.to_owned());
            true
        })
        .join()
        .unwrap();
        let lines = seen.lock().unwrap().clone();
        (res, lines)
    }

    #[test]
    fn splits_lines() {
        let mut s = LineSplitter::new();
        assert!(s.push(b"CTRL: digr").is_empty());
        assert_eq!(
            s.push(b"aph RF { }\r\nfence: \r\npartial"),
            vec!["CTRL: digraph RF { }".to_owned(), "fence: ".to_owned()]
        );
        assert_eq!(s.finish(), Some("partial".to_owned()));
        assert_eq!(s.finish(), None);
    }

    #[test]
    fn drops_garbage() {
        let mut s = LineSplitter::new();
        assert_eq!(
            s.push(b"\xff\xfe\x00junk\nok\n"),
            vec!["ok".to_owned()]
        );
    }

    #[test]
    fn reader_feeds_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let input = Cursor::new(b"one\r\ntwo\nthree".to_vec());

        let handle = spawn_reader(input, false, move |line| {
            sink_seen.lock().unwrap().push(line.to_owned());
            true
        });
        handle.join().unwrap().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["one", "two", "three"]);
    }

    #[test]
    fn reader_stops_when_sink_closes() {
        let input = Cursor::new(b"a\nb\nc\n".to_vec());
        let mut count = 0;
        let handle = spawn_reader(input, true, move |_| {
            count += 1;
            count < 2
        });
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn timeouts_are_retried() {
        let source = Scripted(VecDeque::from([
            Err(io::ErrorKind::TimedOut),
            Ok(&b"a\n"[..]),
            Err(io::ErrorKind::WouldBlock),
            Err(io::ErrorKind::TimedOut),
            Ok(&b"b\n"[..]),
        ]));
        let (res, lines) = collect_lines(source);
        assert!(res.is_ok());
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn unplugged_device_ends_reader() {
        let source = Scripted(VecDeque::from([
            Ok(&b"a\npart"[..]),
            Err(io::ErrorKind::BrokenPipe),
            Ok(&b"ial\n"[..]),
        ]));
        let (res, lines) = collect_lines(source);
        match res {
            Err(LinkError::Disconnected(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(lines, vec!["a"]);
    }

    #[test]
    fn regular_files_replay() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        writeln!(tempfile, "CTRL: digraph RF {{ 0 -> 1; }}").unwrap();
        let device = open_device(tempfile.path(), 115200).unwrap();
        assert!(device.is_replay());
    }

    #[test]
    fn missing_device() {
        let res = open_device(Path::new("/nonexistent/ttyUSB9"), 115200);
        assert!(matches!(res, Err(LinkError::Open { .. })));
    }
}
