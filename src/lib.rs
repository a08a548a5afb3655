//! minitls
//!
//! A small TLS 1.2 client with every primitive it needs built in: bignum
//! arithmetic, RSA PKCS#1 v1.5, AES-128 in CBC and GCM modes, SHA-256,
//! HMAC, the TLS 1.2 PRF and a DER reader.
//!
//! The client negotiates one of two RSA key transport suites:
//!
//! * `TLS_RSA_WITH_AES_128_GCM_SHA256` (0x009C)
//! * `TLS_RSA_WITH_AES_128_CBC_SHA256` (0x003C)
//!
//! It does not validate certificate chains. The server key is taken from
//! the first certificate as-is.
//!
//! ```no_run
//! use std::net::Ipv4Addr;
//! use std::sync::Arc;
//!
//! use minitls::{connect, Config, TcpTransport};
//!
//! let config = Arc::new(Config::default());
//! let ip = Ipv4Addr::new(192, 0, 2, 1).into();
//!
//! let mut conn = connect(TcpTransport::new(), config, "example.com", ip, 443)?;
//! conn.send(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n")?;
//!
//! let mut buf = [0u8; 4096];
//! let n = conn.recv(&mut buf)?;
//! println!("{}", String::from_utf8_lossy(&buf[..n]));
//!
//! conn.close()?;
//! # Ok::<(), minitls::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

#[macro_use]
extern crate log;

mod asn1;
pub mod bignum;
mod certificate;
mod config;
mod connection;
pub mod crypto;
mod error;
mod incoming;
pub mod message;
mod rng;
pub mod state;
mod transport;
mod util;

pub use bignum::BigUint;
pub use config::{Config, ConfigBuilder};
pub use connection::{connect, TlsConnection};
pub use error::{Error, ErrorKind};
pub use message::{Alert, CipherSuite};
pub use rng::SeededRng;
pub use state::{Event, State};
pub use transport::{ConnectionId, TcpTransport, Transport, TransportError};
