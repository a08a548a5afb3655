//! Byte-stream transport the TLS engine drives.
//!
//! The engine never blocks inside the transport. `recv` returns 0 when no
//! data is available yet and the engine keeps calling [`Transport::poll`]
//! between attempts, up to [`Config::recv_poll_limit`] times.
//!
//! [`Config::recv_poll_limit`]: crate::Config::recv_poll_limit

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use thiserror::Error;

/// Handle to one connection inside a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u32);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors reported by a [`Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("Connect to {0} failed: {1}")]
    ConnectFailed(SocketAddr, io::Error),

    #[error("Unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("Short write: {0} of {1} bytes accepted")]
    ShortWrite(usize, usize),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A reliable, ordered byte stream with non-blocking receive.
pub trait Transport {
    /// Open a connection to `ip:port`.
    fn connect(&mut self, ip: IpAddr, port: u16) -> Result<ConnectionId, TransportError>;

    /// Send all of `data`, returning how many bytes were accepted.
    fn send(&mut self, id: ConnectionId, data: &[u8]) -> Result<usize, TransportError>;

    /// Copy available bytes into `buf`. 0 means nothing has arrived yet.
    fn recv(&mut self, id: ConnectionId, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// True once the peer has closed its side.
    fn is_closed(&self, id: ConnectionId) -> bool;

    fn close(&mut self, id: ConnectionId) -> Result<(), TransportError>;

    /// Drive the underlying network stack once. Called between receive
    /// attempts.
    fn poll(&mut self) {}
}

#[derive(Debug)]
struct TcpConnection {
    stream: TcpStream,
    closed: bool,
}

/// [`Transport`] over `std::net::TcpStream`s in non-blocking mode.
#[derive(Debug)]
pub struct TcpTransport {
    connections: HashMap<ConnectionId, TcpConnection>,
    next_id: u32,
    poll_interval: Duration,
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new() -> Self {
        TcpTransport {
            connections: HashMap::new(),
            next_id: 1,
            poll_interval: Duration::from_millis(1),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Sleep between receive attempts.
    ///
    /// Together with the poll limit this bounds how long a receive waits.
    /// Defaults to 1ms.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Defaults to 10 seconds.
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    fn connection(&mut self, id: ConnectionId) -> Result<&mut TcpConnection, TransportError> {
        self.connections
            .get_mut(&id)
            .ok_or(TransportError::UnknownConnection(id))
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, ip: IpAddr, port: u16) -> Result<ConnectionId, TransportError> {
        let addr = SocketAddr::new(ip, port);
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(|e| TransportError::ConnectFailed(addr, e))?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;

        let id = ConnectionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.connections.insert(
            id,
            TcpConnection {
                stream,
                closed: false,
            },
        );

        debug!("TCP connection {} to {}", id, addr);
        Ok(id)
    }

    fn send(&mut self, id: ConnectionId, data: &[u8]) -> Result<usize, TransportError> {
        let conn = self.connection(id)?;
        if conn.closed {
            return Err(TransportError::Closed);
        }

        let mut written = 0;
        while written < data.len() {
            match conn.stream.write(&data[written..]) {
                Ok(0) => {
                    conn.closed = true;
                    return Err(TransportError::Closed);
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::yield_now(),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(written)
    }

    fn recv(&mut self, id: ConnectionId, buf: &mut [u8]) -> Result<usize, TransportError> {
        let conn = self.connection(id)?;
        if conn.closed {
            return Ok(0);
        }

        match conn.stream.read(buf) {
            Ok(0) if !buf.is_empty() => {
                trace!("TCP connection {} closed by peer", id);
                conn.closed = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn is_closed(&self, id: ConnectionId) -> bool {
        self.connections.get(&id).map(|c| c.closed).unwrap_or(true)
    }

    fn close(&mut self, id: ConnectionId) -> Result<(), TransportError> {
        let conn = self
            .connections
            .remove(&id)
            .ok_or(TransportError::UnknownConnection(id))?;

        // The peer may already be gone.
        if let Err(e) = conn.stream.shutdown(Shutdown::Both) {
            trace!("TCP shutdown of {}: {}", id, e);
        }
        Ok(())
    }

    fn poll(&mut self) {
        std::thread::sleep(self.poll_interval);
    }
}
