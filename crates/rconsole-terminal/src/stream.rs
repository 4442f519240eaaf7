use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::unix::net::UnixStream;

/// A duplex byte stream that can be shared between the two relay threads.
///
/// Reads and writes take `&self` so one thread can block in `read_chunk`
/// while another writes, and `close` from a third thread unblocks both.
pub trait SessionStream: Send + Sync {
    /// Read up to `buf.len()` bytes; `Ok(0)` means the peer hung up
    fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write the whole buffer or fail
    fn write_chunk(&self, buf: &[u8]) -> io::Result<()>;

    /// Shut the stream down in both directions
    fn close(&self);
}

impl SessionStream for TcpStream {
    fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut stream: &TcpStream = self;
        stream.read(buf)
    }

    fn write_chunk(&self, buf: &[u8]) -> io::Result<()> {
        let mut stream: &TcpStream = self;
        stream.write_all(buf)?;
        stream.flush()
    }

    fn close(&self) {
        // NotConnected just means the peer beat us to it
        let _ = self.shutdown(Shutdown::Both);
    }
}

impl SessionStream for UnixStream {
    fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut stream: &UnixStream = self;
        stream.read(buf)
    }

    fn write_chunk(&self, buf: &[u8]) -> io::Result<()> {
        let mut stream: &UnixStream = self;
        stream.write_all(buf)?;
        stream.flush()
    }

    fn close(&self) {
        let _ = self.shutdown(Shutdown::Both);
    }
}
