use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use super::bridge::Bridge;
use super::error::{Result, TerminalError};

/// Pause after a transient accept error so a persistent fault cannot spin
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts TCP clients and hands each one to the bridge with takeover
/// semantics: the newest client always wins.
pub struct Acceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Acceptor {
    /// Bind the listening socket
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TerminalError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| TerminalError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        info!(addr = %local_addr, "console listening");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept forever, installing every client into `bridge`.
    ///
    /// Only resource exhaustion ends the loop; the caller decides whether
    /// that is fatal.
    pub async fn run(self, bridge: Bridge) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    if let Err(e) = install(&bridge, stream, peer) {
                        warn!(peer = %peer, error = %e, "failed to hand connection to bridge");
                    }
                }
                Err(e) if is_resource_exhaustion(&e) => {
                    return Err(TerminalError::AcceptExhausted(e));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    }
}

/// The relays do blocking I/O, so the socket goes back to blocking mode
fn install(bridge: &Bridge, stream: TcpStream, peer: SocketAddr) -> io::Result<()> {
    let stream = stream.into_std()?;
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    bridge.install(Box::new(stream), peer.to_string());
    Ok(())
}

fn is_resource_exhaustion(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
    )
}
