use thiserror::Error;

use crate::bignum::BignumError;
use crate::message::{Alert, ContentType, MessageType, ProtocolVersion};
use crate::state::{Event, State};
use crate::transport::TransportError;

/// Errors produced by the TLS engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Too short")]
    TooShort,

    #[error("Parse error: {0:?}")]
    ParseError(nom::error::ErrorKind),

    #[error("Parse incomplete")]
    ParseIncomplete,

    #[error("Invalid content type {0}")]
    InvalidContentType(u8),

    #[error("Unexpected content type {0:?}")]
    UnexpectedContentType(ContentType),

    #[error("Unexpected handshake message {0:?} in state {1:?}")]
    UnexpectedHandshake(MessageType, State),

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Unsupported TLS version {0:?}")]
    UnsupportedTlsVersion(ProtocolVersion),

    #[error("Server selected cipher suite not offered: {0:#06x}")]
    UnsupportedCipherSuite(u16),

    #[error("Invalid transition {1:?} in state {0:?}")]
    InvalidTransition(State, Event),

    #[error("Operation not allowed in state {0:?}")]
    InvalidState(State),

    #[error("Certificate error: {0}")]
    CertificateError(String),

    #[error("Alert received: {0:?}")]
    AlertReceived(Alert),

    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("Authentication tag mismatch")]
    BadRecordMac,

    #[error("Finished verify_data mismatch")]
    FinishedMismatch,

    #[error("Bignum error: {0}")]
    Bignum(#[from] BignumError),

    #[error("Too big length field (> {1}) {0}")]
    TooBigLength(usize, usize),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Peer closed the connection")]
    ConnectionClosed,

    #[error("Timeout waiting for peer")]
    Timeout,
}

/// Coarse classification of [`Error`].
///
/// Lets callers decide whether to retry the transport, give up on the
/// peer, or treat the failure as a local misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unexpected data from the peer.
    Protocol,
    /// A cryptographic check failed.
    Crypto,
    /// The bounded receive loop ran out of iterations.
    Timeout,
    /// The transport collaborator reported a failure.
    Transport,
    /// A fixed internal limit would have been exceeded.
    Capacity,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TooShort
            | Error::ParseError(_)
            | Error::ParseIncomplete
            | Error::InvalidContentType(_)
            | Error::UnexpectedContentType(_)
            | Error::UnexpectedHandshake(_, _)
            | Error::UnexpectedMessage(_)
            | Error::UnsupportedTlsVersion(_)
            | Error::UnsupportedCipherSuite(_)
            | Error::InvalidTransition(_, _)
            | Error::InvalidState(_)
            | Error::CertificateError(_)
            | Error::AlertReceived(_)
            | Error::ConnectionClosed => ErrorKind::Protocol,

            Error::CryptoError(_) | Error::BadRecordMac | Error::FinishedMismatch => {
                ErrorKind::Crypto
            }

            Error::Bignum(BignumError::CapacityExceeded { .. })
            | Error::Bignum(BignumError::BufferTooSmall { .. })
            | Error::TooBigLength(_, _) => ErrorKind::Capacity,
            Error::Bignum(_) => ErrorKind::Crypto,

            Error::Transport(_) => ErrorKind::Transport,
            Error::Timeout => ErrorKind::Timeout,
        }
    }
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(value: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        match value {
            nom::Err::Incomplete(_) => Error::ParseIncomplete,
            nom::Err::Error(x) => match x.code {
                nom::error::ErrorKind::Eof => Error::TooShort,
                _ => Error::ParseError(x.code),
            },
            nom::Err::Failure(x) => Error::ParseError(x.code),
        }
    }
}
