#![no_main]

//! Fuzz target for the client handshake.
//!
//! The fuzz input is replayed as everything the server sends. The client
//! must fail cleanly, never panic.

use libfuzzer_sys::fuzz_target;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use minitls::{Config, ConnectionId, TlsConnection, Transport, TransportError};

struct Replay<'a> {
    data: &'a [u8],
}

impl<'a> Transport for Replay<'a> {
    fn connect(&mut self, _: IpAddr, _: u16) -> Result<ConnectionId, TransportError> {
        Ok(ConnectionId(1))
    }

    fn send(&mut self, _: ConnectionId, data: &[u8]) -> Result<usize, TransportError> {
        Ok(data.len())
    }

    fn recv(&mut self, _: ConnectionId, buf: &mut [u8]) -> Result<usize, TransportError> {
        let n = buf.len().min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }

    fn is_closed(&self, _: ConnectionId) -> bool {
        self.data.is_empty()
    }

    fn close(&mut self, _: ConnectionId) -> Result<(), TransportError> {
        Ok(())
    }
}

fuzz_target!(|data: &[u8]| {
    let config = match Config::builder().rng_seed(1).recv_poll_limit(64).build() {
        Ok(c) => Arc::new(c),
        Err(_) => return,
    };

    let mut conn = TlsConnection::new(Replay { data }, config);
    let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
    if conn.handshake("fuzz.test", ip, 443).is_ok() {
        let mut buf = [0u8; 256];
        let _ = conn.recv(&mut buf);
    }
    let _ = conn.close();
});
