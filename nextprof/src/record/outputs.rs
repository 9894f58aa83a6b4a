//! Record destinations
//!
//! A run writes to at most one file and one socket. Each destination fails
//! independently: the first write error closes that destination for the rest
//! of the run and the others keep receiving data.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{error, info, warn};

use crate::config::{NetworkConfig, RecordConfig};

/// Largest single write issued to a record file.
pub const FILE_CHUNK_SIZE: usize = 0x4000;

/// Largest single send issued to the record socket.
pub const SOCKET_CHUNK_SIZE: usize = 0x1000;

/// Longest wait for each resolved address of the record host.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// One open destination.
pub struct Output {
    name: String,
    writer: Box<dyn Write + Send>,
    chunk_size: usize,
}

impl Output {
    #[must_use]
    pub fn new(name: impl Into<String>, writer: Box<dyn Write + Send>, chunk_size: usize) -> Self {
        Self {
            name: name.into(),
            writer,
            chunk_size: chunk_size.max(1),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn write_chunked(&mut self, data: &[u8]) -> io::Result<()> {
        for chunk in data.chunks(self.chunk_size) {
            self.writer.write_all(chunk)?;
        }
        self.writer.flush()
    }
}

/// The set of destinations still open.
#[derive(Default)]
pub struct Outputs {
    open: Vec<Output>,
}

impl Outputs {
    #[must_use]
    pub fn new(open: Vec<Output>) -> Self {
        Self { open }
    }

    /// Open the destinations enabled in `record`.
    ///
    /// A destination that cannot be opened is logged and left out.
    #[must_use]
    pub fn open(record: &RecordConfig, network: &NetworkConfig) -> Self {
        let mut open = Vec::new();

        if record.file {
            let path = record_file_path(&record.directory);
            match create_record_file(&path) {
                Ok(file) => {
                    info!("Recording to file: {}", path.display());
                    open.push(Output::new(
                        path.display().to_string(),
                        Box::new(BufWriter::with_capacity(FILE_CHUNK_SIZE, file)),
                        FILE_CHUNK_SIZE,
                    ));
                }
                Err(e) => error!("Failed to open record file {}: {e}", path.display()),
            }
        }

        if record.tcp {
            if network.host.is_empty() {
                warn!("Socket recording enabled but no host configured");
            } else {
                let addr = format!("{}:{}", network.host, network.port_tcp);
                match connect(&addr) {
                    Ok(stream) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("Failed to disable Nagle on {addr}: {e}");
                        }
                        info!("Recording to socket: {addr}");
                        open.push(Output::new(addr, Box::new(stream), SOCKET_CHUNK_SIZE));
                    }
                    Err(e) => error!("Failed to connect to {addr}: {e}"),
                }
            }
        }

        Self { open }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Names of the destinations still open.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.open.iter().map(Output::name)
    }

    /// Write `data` to every open destination, closing the ones that fail.
    pub fn write(&mut self, data: &[u8]) {
        self.open.retain_mut(|output| match output.write_chunked(data) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to write to {}, closing it: {e}", output.name);
                false
            }
        });
    }
}

/// `<directory>/YYYY-MM-DD_HH-MM-SS.bin` in local time, with a `_N` suffix
/// if a run in the same second already took that name.
#[must_use]
pub fn record_file_path(directory: &Path) -> PathBuf {
    let stamp = chrono::Local::now()
        .format("%Y-%m-%d_%H-%M-%S")
        .to_string();
    let mut path = directory.join(format!("{stamp}.bin"));
    let mut n = 1;
    while path.exists() {
        path = directory.join(format!("{stamp}_{n}.bin"));
        n += 1;
    }
    path
}

/// Connect to the first address `addr` resolves to that answers within
/// [`CONNECT_TIMEOUT`].
fn connect(addr: &str) -> io::Result<TcpStream> {
    let mut last = io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
    for resolved in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&resolved, CONNECT_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(e) => last = e,
        }
    }
    Err(last)
}

fn create_record_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    File::create(path)
}


#[cfg(test)]
mod tests {
    use super::test_support::{FailingWriter, SharedWriter};
    use super::*;

    #[test]
    fn test_writes_are_chunked() {
        let shared = SharedWriter::default();
        let output = Output::new("mem", Box::new(shared.clone()), SOCKET_CHUNK_SIZE);
        let mut outputs = Outputs::new(vec![output]);
        let data = vec![7u8; SOCKET_CHUNK_SIZE * 2 + 10];
        outputs.write(&data);

        let sizes: Vec<_> = shared
            .chunks
            .lock()
            .unwrap()
            .iter()
            .map(Vec::len)
            .collect();
        assert_eq!(sizes, vec![SOCKET_CHUNK_SIZE, SOCKET_CHUNK_SIZE, 10]);
        assert_eq!(shared.bytes(), data);
    }

    #[test]
    fn test_failed_output_is_closed_others_continue() {
        let socket = SharedWriter::default();
        let file = FailingWriter { budget: 8 };
        let mut outputs = Outputs::new(vec![
            Output::new("file", Box::new(file), FILE_CHUNK_SIZE),
            Output::new("socket", Box::new(socket.clone()), SOCKET_CHUNK_SIZE),
        ]);

        outputs.write(b"first");
        outputs.write(b"second");
        assert_eq!(outputs.names().collect::<Vec<_>>(), vec!["socket"]);

        outputs.write(b"third");
        assert_eq!(socket.bytes(), b"firstsecondthird");
    }

    #[test]
    fn test_file_name_is_timestamped() {
        let path = record_file_path(Path::new("nextprof"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(name.len(), "2026-01-01_00-00-00.bin".len());
        assert!(name.ends_with(".bin"));
        assert_eq!(&name[4..5], "-");
        assert_eq!(&name[10..11], "_");
        assert!(path.starts_with("nextprof"));
    }

    #[test]
    fn test_file_name_never_reused() {
        let dir = tempfile::tempdir().unwrap();
        let first = record_file_path(dir.path());
        std::fs::write(&first, b"").unwrap();
        let second = record_file_path(dir.path());
        assert_ne!(first, second);
        assert!(second.to_str().unwrap().ends_with(".bin"));
    }

    #[test]
    fn test_open_with_nothing_enabled() {
        let record = RecordConfig {
            file: false,
            tcp: false,
            ..RecordConfig::default()
        };
        assert!(Outputs::open(&record, &NetworkConfig::default()).is_empty());
    }

    #[test]
    fn test_open_skips_socket_without_host() {
        let dir = tempfile::tempdir().unwrap();
        let record = RecordConfig {
            tcp: true,
            directory: dir.path().join("records"),
            ..RecordConfig::default()
        };
        let outputs = Outputs::open(&record, &NetworkConfig::default());
        assert_eq!(outputs.names().count(), 1);
        let files = std::fs::read_dir(dir.path().join("records")).unwrap();
        assert_eq!(files.count(), 1);
    }

    #[test]
    fn test_connect_reaches_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        assert!(connect(&addr).is_ok());
    }

    #[test]
    fn test_connect_gives_up_within_timeout() {
        // TEST-NET-1 is never routed; the attempt is refused or times out
        let started = std::time::Instant::now();
        assert!(connect("192.0.2.1:7623").is_err());
        assert!(started.elapsed() < CONNECT_TIMEOUT + Duration::from_secs(1));
    }
}
