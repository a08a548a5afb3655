//! Client handshake state machine.
//!
//! The connection moves forward one step per [`Event`]. Skipping a step is
//! an error. [`Event::Fail`] is accepted everywhere and parks the
//! connection in [`State::Error`]; [`Event::Close`] returns it to
//! [`State::Init`].

use crate::Error;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Fresh or closed. No keys.
    #[default]
    Init,
    ClientHelloSent,
    ServerHelloReceived,
    CertificateReceived,
    ServerHelloDoneReceived,
    ClientKeyExchangeSent,
    ChangeCipherSpecSent,
    FinishedSent,
    /// Handshake complete. Application data may flow.
    Established,
    /// Terminal until [`Event::Close`].
    Error,
}

/// Something that happened to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    SendClientHello,
    ServerHello,
    Certificate,
    ServerHelloDone,
    SendClientKeyExchange,
    SendChangeCipherSpec,
    SendFinished,
    ServerFinished,
    /// Any handshake or record failure.
    Fail,
    /// Local close.
    Close,
}

impl State {
    /// Apply `event`, returning the next state.
    pub fn transition(self, event: Event) -> Result<State, Error> {
        use Event as E;
        use State as S;

        let next = match (self, event) {
            (_, E::Fail) => S::Error,
            (_, E::Close) => S::Init,

            (S::Init, E::SendClientHello) => S::ClientHelloSent,
            (S::ClientHelloSent, E::ServerHello) => S::ServerHelloReceived,
            (S::ServerHelloReceived, E::Certificate) => S::CertificateReceived,
            (S::CertificateReceived, E::ServerHelloDone) => S::ServerHelloDoneReceived,
            (S::ServerHelloDoneReceived, E::SendClientKeyExchange) => S::ClientKeyExchangeSent,
            (S::ClientKeyExchangeSent, E::SendChangeCipherSpec) => S::ChangeCipherSpecSent,
            (S::ChangeCipherSpecSent, E::SendFinished) => S::FinishedSent,
            (S::FinishedSent, E::ServerFinished) => S::Established,

            (state, event) => return Err(Error::InvalidTransition(state, event)),
        };

        trace!("{:?} --{:?}--> {:?}", self, event, next);
        Ok(next)
    }

    /// True between sending ClientHello and reaching `Established`.
    pub fn is_handshaking(&self) -> bool {
        !matches!(self, State::Init | State::Established | State::Error)
    }

    pub fn is_established(&self) -> bool {
        *self == State::Established
    }
}
