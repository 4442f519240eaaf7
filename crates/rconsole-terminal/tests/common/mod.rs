use std::io::{self, ErrorKind, Read};
use std::net::{TcpListener, TcpStream};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rconsole_terminal::{Bridge, BridgeConfig, LogSink, PtyIo, SessionStream};

/// Short backoffs so tests do not sit out the one-second idle sleep
pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        idle_backoff: Duration::from_millis(10),
        pty_error_backoff: Duration::from_millis(1),
        max_pty_error_backoff: Duration::from_millis(10),
        ..BridgeConfig::default()
    }
}

/// Start a bridge on a socket pair standing in for the pty master.
///
/// Returns the bridge and the "program" end: bytes written there are what
/// the console prints, bytes read there are what the console receives.
pub fn start_bridge(sink: Option<Arc<dyn LogSink>>) -> (Bridge, UnixStream) {
    let (bridge_end, program_end) = UnixStream::pair().expect("socket pair");
    let reader = bridge_end.try_clone().expect("clone pty end");
    let io = PtyIo::new(Box::new(reader), Box::new(bridge_end));
    let bridge = Bridge::start(io, sink, test_config()).expect("start bridge");
    (bridge, program_end)
}

/// A connected (client, server) TCP pair on loopback
pub fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let client = TcpStream::connect(addr).expect("connect");
    let (server, _) = listener.accept().expect("accept");
    (client, server)
}

/// Read until `needle` shows up or the deadline passes; returns everything read
pub fn read_until<R: Read>(reader: &mut R, needle: &[u8], timeout: Duration) -> Vec<u8> {
    let deadline = Instant::now() + timeout;
    let mut observed = Vec::new();
    let mut buf = [0u8; 256];

    while Instant::now() < deadline {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                observed.extend_from_slice(&buf[..n]);
                if contains(&observed, needle) {
                    break;
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(_) => break,
        }
    }

    observed
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Poll `check` until it holds or the timeout expires
pub fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    check()
}

/// Observable state of a [`BrokenStream`]
#[derive(Default)]
pub struct BrokenState {
    pub write_started: AtomicBool,
    pub closed: AtomicBool,
}

/// A client whose writes always fail.
///
/// Reads block until the stream is closed and then report a hangup, so only
/// the outbound relay can notice the failure. With `fail_after_close` set a
/// write also blocks until something closes the stream.
pub struct BrokenStream {
    state: Arc<BrokenState>,
    fail_after_close: bool,
}

impl BrokenStream {
    pub fn new(fail_after_close: bool) -> (Self, Arc<BrokenState>) {
        let state = Arc::new(BrokenState::default());
        let stream = Self {
            state: Arc::clone(&state),
            fail_after_close,
        };
        (stream, state)
    }

    fn wait_closed(&self) {
        while !self.state.closed.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

impl SessionStream for BrokenStream {
    fn read_chunk(&self, _buf: &mut [u8]) -> io::Result<usize> {
        self.wait_closed();
        Ok(0)
    }

    fn write_chunk(&self, _buf: &[u8]) -> io::Result<()> {
        self.state.write_started.store(true, Ordering::SeqCst);
        if self.fail_after_close {
            self.wait_closed();
        }
        Err(io::Error::new(ErrorKind::BrokenPipe, "client went away"))
    }

    fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}
