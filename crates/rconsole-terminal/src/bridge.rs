//! Duplex relay between the pty master and the active network connection.
//!
//! Two detached threads do the copying:
//! - outbound reads the pty and writes to whatever connection is installed,
//!   holding the chunk until a connection shows up;
//! - inbound reads the installed connection and writes to the pty.
//!
//! Connection failures evict only the failing connection and the loops keep
//! going, so a new client can attach at any time.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::error::{Result, TerminalError};
use super::log_sink::LogSink;
use super::pty::PtyIo;
use super::slot::{Connection, ConnectionSlot};
use super::stream::SessionStream;
use super::{
    DEFAULT_CHUNK_SIZE, DEFAULT_IDLE_BACKOFF_MS, DEFAULT_PTY_ERROR_BACKOFF_MS,
    DEFAULT_PTY_WRITE_ATTEMPTS, MAX_PTY_ERROR_BACKOFF_MS,
};

/// Tuning knobs for the relay loops
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Max bytes moved per read
    pub chunk_size: usize,
    /// Sleep between checks while no connection is installed
    pub idle_backoff: Duration,
    /// First sleep after a pty I/O error; doubles on repeated failures
    pub pty_error_backoff: Duration,
    /// Ceiling for the pty error backoff
    pub max_pty_error_backoff: Duration,
    /// Attempts per chunk before inbound bytes are dropped on pty write errors
    pub pty_write_attempts: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            idle_backoff: Duration::from_millis(DEFAULT_IDLE_BACKOFF_MS),
            pty_error_backoff: Duration::from_millis(DEFAULT_PTY_ERROR_BACKOFF_MS),
            max_pty_error_backoff: Duration::from_millis(MAX_PTY_ERROR_BACKOFF_MS),
            pty_write_attempts: DEFAULT_PTY_WRITE_ATTEMPTS,
        }
    }
}

/// Running totals for the session
#[derive(Debug, Default)]
pub struct BridgeStats {
    to_network: AtomicU64,
    to_pty: AtomicU64,
    installed: AtomicU64,
    evicted: AtomicU64,
    dropped: AtomicU64,
}

impl BridgeStats {
    /// Bytes delivered from the pty to a client
    pub fn bytes_to_network(&self) -> u64 {
        self.to_network.load(Ordering::Relaxed)
    }

    /// Bytes delivered from a client to the pty
    pub fn bytes_to_pty(&self) -> u64 {
        self.to_pty.load(Ordering::Relaxed)
    }

    pub fn connections_installed(&self) -> u64 {
        self.installed.load(Ordering::Relaxed)
    }

    /// Connections removed because their own I/O failed
    pub fn connections_evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Bytes lost to failed network writes or exhausted pty write attempts
    pub fn bytes_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Exponential backoff for pty errors, reset on the next success
#[derive(Debug)]
struct Backoff {
    base: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            current: None,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => self.base,
            Some(prev) => prev.saturating_mul(2).min(self.max),
        };
        self.current = Some(delay);
        delay
    }

    fn reset(&mut self) {
        self.current = None;
    }
}

struct Shared {
    slot: ConnectionSlot,
    sink: Option<Arc<dyn LogSink>>,
    config: BridgeConfig,
    stats: BridgeStats,
}

impl Shared {
    /// Copy bytes to the session log before they are forwarded
    fn mirror(&self, direction: &'static str, bytes: &[u8]) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.append(bytes) {
                warn!(direction, bytes = bytes.len(), error = %e, "session log write failed");
            }
        }
    }

    /// Drop a connection whose I/O failed, unless it was already replaced
    fn evict(&self, conn: &Arc<Connection>, reason: &str) {
        if self.slot.clear_if_current(conn) {
            conn.stream().close();
            self.stats.evicted.fetch_add(1, Ordering::Relaxed);
            info!(
                conn = conn.id(),
                peer = conn.peer(),
                reason,
                sent = self.stats.bytes_to_network(),
                received = self.stats.bytes_to_pty(),
                evicted = self.stats.connections_evicted(),
                "connection evicted"
            );
        } else {
            debug!(conn = conn.id(), peer = conn.peer(), reason, "stale connection already replaced");
        }
    }

    /// Block until some connection is installed
    fn wait_for_connection(&self) -> Arc<Connection> {
        loop {
            if let Some(conn) = self.slot.current() {
                return conn;
            }
            thread::sleep(self.config.idle_backoff);
        }
    }
}

/// Handle to a running bridge; cheap to clone
#[derive(Clone)]
pub struct Bridge {
    shared: Arc<Shared>,
}

impl Bridge {
    /// Spawn both relay threads and return immediately
    pub fn start(
        io: PtyIo,
        sink: Option<Arc<dyn LogSink>>,
        config: BridgeConfig,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            slot: ConnectionSlot::new(),
            sink,
            config,
            stats: BridgeStats::default(),
        });

        let PtyIo { reader, writer } = io;

        let outbound = Arc::clone(&shared);
        thread::Builder::new()
            .name("rconsole-pty-out".to_string())
            .spawn(move || relay_outbound(&outbound, reader))
            .map_err(TerminalError::Spawn)?;

        let inbound = Arc::clone(&shared);
        thread::Builder::new()
            .name("rconsole-pty-in".to_string())
            .spawn(move || relay_inbound(&inbound, writer))
            .map_err(TerminalError::Spawn)?;

        debug!(chunk_size = shared.config.chunk_size, "bridge started");
        Ok(Self { shared })
    }

    /// Make `stream` the active connection, closing any previous one
    pub fn install(
        &self,
        stream: Box<dyn SessionStream>,
        peer: impl Into<String>,
    ) -> Arc<Connection> {
        let (conn, displaced) = self.shared.slot.install(stream, peer);
        self.shared.stats.installed.fetch_add(1, Ordering::Relaxed);

        match displaced {
            Some(old) => info!(
                conn = conn.id(),
                peer = conn.peer(),
                displaced = old.id(),
                displaced_peer = old.peer(),
                "connection took over session"
            ),
            None => info!(conn = conn.id(), peer = conn.peer(), "connection attached"),
        }

        conn
    }

    pub fn slot(&self) -> &ConnectionSlot {
        &self.shared.slot
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.shared.stats
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.shared.config)
            .field("stats", &self.shared.stats)
            .field("logging", &self.shared.sink.is_some())
            .finish()
    }
}

/// pty -> network
fn relay_outbound(shared: &Shared, mut reader: Box<dyn Read + Send>) {
    let mut buf = vec![0u8; shared.config.chunk_size.max(1)];
    let mut backoff = Backoff::new(
        shared.config.pty_error_backoff,
        shared.config.max_pty_error_backoff,
    );

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => {
                info!("pseudo-terminal closed, outbound relay stopping");
                return;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(error = %e, retry_in = ?delay, "pseudo-terminal read failed");
                thread::sleep(delay);
                continue;
            }
        };
        backoff.reset();

        let chunk = &buf[..n];
        shared.mirror("out", chunk);
        deliver_to_network(shared, chunk);
    }
}

/// Write one chunk to the active connection, waiting for one if needed.
///
/// The chunk is kept while no connection exists; it is dropped only when the
/// write itself fails, since the failed peer may already hold part of it.
fn deliver_to_network(shared: &Shared, chunk: &[u8]) {
    let conn = shared.wait_for_connection();
    match conn.stream().write_chunk(chunk) {
        Ok(()) => BridgeStats::add(&shared.stats.to_network, chunk.len()),
        Err(e) => {
            warn!(conn = conn.id(), peer = conn.peer(), bytes = chunk.len(), error = %e, "connection write failed");
            BridgeStats::add(&shared.stats.dropped, chunk.len());
            shared.evict(&conn, "write failed");
        }
    }
}

/// network -> pty
fn relay_inbound(shared: &Shared, mut writer: Box<dyn Write + Send>) {
    let mut buf = vec![0u8; shared.config.chunk_size.max(1)];
    let mut backoff = Backoff::new(
        shared.config.pty_error_backoff,
        shared.config.max_pty_error_backoff,
    );

    loop {
        let conn = shared.wait_for_connection();

        let n = match conn.stream().read_chunk(&mut buf) {
            Ok(0) => {
                shared.evict(&conn, "peer closed");
                continue;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(conn = conn.id(), error = %e, "connection read failed");
                shared.evict(&conn, "read failed");
                continue;
            }
        };

        let chunk = &buf[..n];
        shared.mirror("in", chunk);
        deliver_to_pty(shared, writer.as_mut(), &mut backoff, chunk);
    }
}

/// Write one chunk to the pty, retrying only the bytes not yet accepted.
///
/// `pty_write_attempts` bounds consecutive failures; any progress resets it.
fn deliver_to_pty(
    shared: &Shared,
    writer: &mut dyn Write,
    backoff: &mut Backoff,
    chunk: &[u8],
) {
    let attempts = shared.config.pty_write_attempts.max(1);
    let mut failures = 0;
    let mut done = 0;

    while done < chunk.len() {
        let err = match writer.write(&chunk[done..]) {
            Ok(0) => io::Error::new(io::ErrorKind::WriteZero, "pseudo-terminal accepted no bytes"),
            Ok(n) => {
                done += n;
                failures = 0;
                BridgeStats::add(&shared.stats.to_pty, n);
                continue;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => e,
        };

        failures += 1;
        if failures >= attempts {
            let lost = chunk.len() - done;
            error!(attempt = failures, bytes = lost, error = %err, "pseudo-terminal write failed, dropping input");
            BridgeStats::add(&shared.stats.dropped, lost);
            return;
        }
        let delay = backoff.next_delay();
        warn!(attempt = failures, written = done, error = %err, retry_in = ?delay, "pseudo-terminal write failed");
        thread::sleep(delay);
    }

    // The bytes are already with the pty, so a flush error is not retried
    if let Err(e) = writer.flush() {
        warn!(error = %e, "pseudo-terminal flush failed");
    }
    backoff.reset();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_ceiling() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(35));
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
        assert_eq!(backoff.next_delay(), Duration::from_millis(20));
        assert_eq!(backoff.next_delay(), Duration::from_millis(35));
        assert_eq!(backoff.next_delay(), Duration::from_millis(35));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_backoff_ceiling_never_below_base() {
        let mut backoff = Backoff::new(Duration::from_millis(50), Duration::from_millis(5));
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
    }

    #[test]
    fn test_default_config_values() {
        let config = BridgeConfig::default();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.idle_backoff, Duration::from_secs(1));
        assert!(config.pty_error_backoff < config.max_pty_error_backoff);
    }

    struct FailingWriter {
        failures_left: u32,
        written: Vec<u8>,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(io::Error::new(io::ErrorKind::Other, "transient"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Accepts at most two bytes per call and fails every other call
    struct ChoppyWriter {
        calls: u32,
        written: Vec<u8>,
    }

    impl Write for ChoppyWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.calls += 1;
            if self.calls % 2 == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "short write then error"));
            }
            let n = buf.len().min(2);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn shared_with_attempts(attempts: u32) -> Shared {
        Shared {
            slot: ConnectionSlot::new(),
            sink: None,
            config: BridgeConfig {
                pty_error_backoff: Duration::from_millis(1),
                max_pty_error_backoff: Duration::from_millis(2),
                pty_write_attempts: attempts,
                ..BridgeConfig::default()
            },
            stats: BridgeStats::default(),
        }
    }

    #[test]
    fn test_pty_write_retries_transient_failures() {
        let shared = shared_with_attempts(3);
        let mut writer = FailingWriter {
            failures_left: 2,
            written: Vec::new(),
        };
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(2));

        deliver_to_pty(&shared, &mut writer, &mut backoff, b"ls\n");

        assert_eq!(writer.written, b"ls\n");
        assert_eq!(shared.stats.bytes_to_pty(), 3);
        assert_eq!(shared.stats.bytes_dropped(), 0);
    }

    #[test]
    fn test_pty_write_gives_up_after_attempts() {
        let shared = shared_with_attempts(2);
        let mut writer = FailingWriter {
            failures_left: 5,
            written: Vec::new(),
        };
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(2));

        deliver_to_pty(&shared, &mut writer, &mut backoff, b"abc");

        assert!(writer.written.is_empty());
        assert_eq!(shared.stats.bytes_dropped(), 3);
    }

    #[test]
    fn test_pty_write_resumes_after_partial_write() {
        let shared = shared_with_attempts(2);
        let mut writer = ChoppyWriter {
            calls: 0,
            written: Vec::new(),
        };
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(2));

        deliver_to_pty(&shared, &mut writer, &mut backoff, b"print(1)\n");

        assert_eq!(writer.written, b"print(1)\n");
        assert_eq!(shared.stats.bytes_to_pty(), 9);
        assert_eq!(shared.stats.bytes_dropped(), 0);
    }

    #[test]
    fn test_pty_write_drops_only_the_unwritten_tail() {
        let shared = shared_with_attempts(1);
        let mut writer = ChoppyWriter {
            calls: 0,
            written: Vec::new(),
        };
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(2));

        deliver_to_pty(&shared, &mut writer, &mut backoff, b"abcde");

        assert_eq!(writer.written, b"ab");
        assert_eq!(shared.stats.bytes_to_pty(), 2);
        assert_eq!(shared.stats.bytes_dropped(), 3);
    }
}
