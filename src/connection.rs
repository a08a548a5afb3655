// TLS 1.2 Client Handshake Flow (RFC 5246, RSA key transport):
//
// 1. Client sends ClientHello (plaintext)
// 2. Server sends ServerHello, Certificate, ServerHelloDone (plaintext)
//    - Client takes the RSA key from the first certificate
// 3. Client sends ClientKeyExchange with the RSA-encrypted pre-master secret
//    - Client derives master secret and key block
// 4. Client sends ChangeCipherSpec, then Finished under its write keys
// 5. Server sends ChangeCipherSpec, then Finished under its write keys
//    - Client checks the server's verify_data
// 6. Handshake complete, application data flows in both directions
//
// Every step blocks on the transport, bounded by Config::recv_poll_limit.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::SystemTime;

use rand::RngCore;
use tinyvec::ArrayVec;
use zeroize::Zeroize;

use crate::certificate;
use crate::crypto::prf::{self, MASTER_SECRET_LEN};
use crate::crypto::{Direction, KeyMaterial, RecordCipher, RsaPublicKey, Sha256};
use crate::incoming::{IncomingRecord, RecordReader};
use crate::message::{
    Alert, Body, CipherSuite, ClientHello, ClientKeyExchange, CompressionMethod, ContentType,
    Finished, Handshake, MessageType, ProtocolVersion, Random, Record, ServerHello, SessionId,
    HANDSHAKE_HEADER_LEN, MAX_PLAINTEXT,
};
use crate::rng::SeededRng;
use crate::state::{Event, State};
use crate::transport::{ConnectionId, Transport, TransportError};
use crate::{Config, Error};

/// Length of the RSA pre-master secret.
const PRE_MASTER_SECRET_LEN: usize = 48;

/// Largest handshake message we are willing to buffer.
const MAX_HANDSHAKE_LEN: usize = 65536;

/// RFC 6066 HostName limit for server_name.
const MAX_HOST_NAME_LEN: usize = 255;

/// Open a connection to `ip:port` and complete the handshake.
///
/// `hostname` goes into the server_name extension. An empty hostname omits
/// the extension.
pub fn connect<T: Transport>(
    transport: T,
    config: Arc<Config>,
    hostname: &str,
    ip: IpAddr,
    port: u16,
) -> Result<TlsConnection<T>, Error> {
    let mut conn = TlsConnection::new(transport, config);
    conn.handshake(hostname, ip, port)?;
    Ok(conn)
}

/// One client side TLS 1.2 session over a [`Transport`].
pub struct TlsConnection<T: Transport> {
    transport: T,

    config: Arc<Config>,

    /// Transport handle. Set by the handshake, cleared by close.
    id: Option<ConnectionId>,

    state: State,

    rng: SeededRng,

    /// Selected by the server in ServerHello.
    cipher_suite: Option<CipherSuite>,

    client_random: [u8; 32],
    server_random: [u8; 32],

    /// Echoed from ServerHello. Never used for resumption.
    session_id: SessionId,

    /// Taken from the first certificate the server sends.
    server_key: Option<RsaPublicKey>,

    master_secret: [u8; MASTER_SECRET_LEN],

    /// Running hash over every handshake message sent and received.
    transcript: Sha256,

    client_seq: u64,
    server_seq: u64,

    /// Active once we have sent ChangeCipherSpec.
    write_cipher: Option<RecordCipher>,

    /// Derived with the write cipher, active once the server sends
    /// ChangeCipherSpec.
    pending_read_cipher: Option<RecordCipher>,
    read_cipher: Option<RecordCipher>,

    reader: RecordReader,

    /// Handshake bytes not yet forming a complete message.
    handshake_buffer: Vec<u8>,

    /// Decrypted application data not yet handed to the caller.
    pending: Vec<u8>,

    last_alert: Option<Alert>,
}

impl<T: Transport> TlsConnection<T> {
    /// Create a connection in [`State::Init`]. Nothing is sent until
    /// [`TlsConnection::handshake`].
    pub fn new(transport: T, config: Arc<Config>) -> Self {
        let rng = SeededRng::new(config.rng_seed());

        TlsConnection {
            transport,
            config,
            id: None,
            state: State::Init,
            rng,
            cipher_suite: None,
            client_random: [0; 32],
            server_random: [0; 32],
            session_id: SessionId::empty(),
            server_key: None,
            master_secret: [0; MASTER_SECRET_LEN],
            transcript: Sha256::new(),
            client_seq: 0,
            server_seq: 0,
            write_cipher: None,
            pending_read_cipher: None,
            read_cipher: None,
            reader: RecordReader::new(),
            handshake_buffer: Vec::new(),
            pending: Vec::new(),
            last_alert: None,
        }
    }

    /// Connect the transport and run the full handshake.
    ///
    /// Any failure leaves the connection in [`State::Error`]. Call
    /// [`TlsConnection::close`] to reset it.
    pub fn handshake(&mut self, hostname: &str, ip: IpAddr, port: u16) -> Result<(), Error> {
        if self.state != State::Init {
            return Err(Error::InvalidState(self.state));
        }

        debug!("Handshake with {} ({}:{})", hostname, ip, port);

        let result = self.run_handshake(hostname, ip, port);

        if let Err(e) = &result {
            warn!("Handshake failed in {:?}: {}", self.state, e);
            self.state = self.state.transition(Event::Fail).unwrap_or(State::Error);
            self.wipe_secrets();
        }

        result
    }

    /// Send `data` as one protected ApplicationData record.
    pub fn send(&mut self, data: &[u8]) -> Result<usize, Error> {
        if !self.state.is_established() {
            return Err(Error::InvalidState(self.state));
        }
        if data.len() > MAX_PLAINTEXT {
            return Err(Error::TooBigLength(data.len(), MAX_PLAINTEXT));
        }

        self.send_record(ContentType::ApplicationData, data)?;
        trace!("Sent {} bytes of application data", data.len());

        Ok(data.len())
    }

    /// Receive application data into `buf`.
    ///
    /// Returns the number of bytes written. A record larger than `buf` is
    /// handed out over several calls.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if self.pending.is_empty() {
            if !self.state.is_established() {
                return Err(Error::InvalidState(self.state));
            }
            if let Err(e) = self.fill_pending() {
                self.fail_established(&e);
                return Err(e);
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);

        Ok(n)
    }

    /// Close the session.
    ///
    /// Sends a protected close_notify when established, closes the transport
    /// connection and returns to [`State::Init`]. Secrets are wiped even if
    /// sending the alert fails.
    pub fn close(&mut self) -> Result<(), Error> {
        let mut result = Ok(());

        if self.state.is_established() {
            let mut alert = Vec::with_capacity(2);
            Alert::close_notify().serialize(&mut alert);
            result = self.send_record(ContentType::Alert, &alert).map(|_| ());
        }

        if let Some(id) = self.id.take() {
            if let Err(e) = self.transport.close(id) {
                debug!("Transport close failed: {}", e);
                result = result.and(Err(e.into()));
            }
        }

        self.reset();
        self.state = self.state.transition(Event::Close)?;
        debug!("Connection closed");

        result
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.cipher_suite
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn server_public_key(&self) -> Option<&RsaPublicKey> {
        self.server_key.as_ref()
    }

    /// The most recent alert received from the server.
    pub fn last_alert(&self) -> Option<Alert> {
        self.last_alert
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.id
    }

    /// Records sent under the current write keys.
    pub fn client_sequence(&self) -> u64 {
        self.client_seq
    }

    /// Records received under the current read keys.
    pub fn server_sequence(&self) -> u64 {
        self.server_seq
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn run_handshake(&mut self, hostname: &str, ip: IpAddr, port: u16) -> Result<(), Error> {
        self.id = Some(self.transport.connect(ip, port)?);

        self.send_client_hello(hostname)?;
        self.receive_server_flight()?;

        let mut pre_master_secret = self.send_client_key_exchange()?;
        let derived = self.derive_keys(&pre_master_secret);
        pre_master_secret.zeroize();
        derived?;

        self.send_change_cipher_spec()?;
        self.send_finished()?;
        self.receive_server_finished()?;

        debug!(
            "Handshake complete: {:?}",
            self.cipher_suite.unwrap_or_default()
        );
        Ok(())
    }

    fn send_client_hello(&mut self, hostname: &str) -> Result<(), Error> {
        if hostname.len() > MAX_HOST_NAME_LEN {
            return Err(Error::TooBigLength(hostname.len(), MAX_HOST_NAME_LEN));
        }

        let random = Random::new(SystemTime::now(), &mut self.rng);
        self.client_random = random.to_bytes();

        let mut cipher_suites = ArrayVec::new();
        cipher_suites.extend_from_slice(self.config.cipher_suites());
        let mut compression_methods = ArrayVec::new();
        compression_methods.push(CompressionMethod::Null);

        let mut extension_data = Vec::new();
        let client_hello = ClientHello::new(
            ProtocolVersion::TLS1_2,
            random,
            SessionId::empty(),
            cipher_suites,
            compression_methods,
        )
        .with_extensions(hostname, &mut extension_data);

        self.send_handshake(Body::ClientHello(client_hello), MessageType::ClientHello)?;
        self.advance(Event::SendClientHello)?;

        debug!(
            "Sent ClientHello offering {:?}",
            self.config.cipher_suites()
        );
        Ok(())
    }

    /// ServerHello, Certificate, ServerHelloDone.
    fn receive_server_flight(&mut self) -> Result<(), Error> {
        loop {
            let message = self.next_handshake_message()?;
            let (_, handshake) = Handshake::parse(&message, self.cipher_suite)?;
            let msg_type = handshake.header.msg_type;

            if msg_type == MessageType::HelloRequest {
                debug!("Ignoring HelloRequest during handshake");
                continue;
            }
            self.transcript.update(&message);

            match handshake.body {
                Body::ServerHello(server_hello) => {
                    self.expect(msg_type, Event::ServerHello)?;
                    self.handle_server_hello(&server_hello)?;
                    self.advance(Event::ServerHello)?;
                }
                Body::Certificate(certificate) => {
                    self.expect(msg_type, Event::Certificate)?;
                    let leaf = certificate.leaf().ok_or_else(|| {
                        Error::CertificateError("server sent no certificate".into())
                    })?;
                    self.server_key = Some(certificate::rsa_public_key(leaf.0)?);
                    self.advance(Event::Certificate)?;
                }
                Body::ServerHelloDone => {
                    self.expect(msg_type, Event::ServerHelloDone)?;
                    self.advance(Event::ServerHelloDone)?;
                    debug!("Received ServerHelloDone");
                    return Ok(());
                }
                _ => return Err(Error::UnexpectedHandshake(msg_type, self.state)),
            }
        }
    }

    fn handle_server_hello(&mut self, server_hello: &ServerHello) -> Result<(), Error> {
        if server_hello.server_version != ProtocolVersion::TLS1_2 {
            return Err(Error::UnsupportedTlsVersion(server_hello.server_version));
        }

        let suite = server_hello.cipher_suite;
        if !self.config.cipher_suites().contains(&suite) {
            return Err(Error::UnsupportedCipherSuite(suite.as_u16()));
        }

        if server_hello.compression_method != CompressionMethod::Null {
            return Err(Error::UnexpectedMessage(format!(
                "compression method {:?}",
                server_hello.compression_method
            )));
        }

        self.server_random = server_hello.random.to_bytes();
        self.session_id = server_hello.session_id;
        self.cipher_suite = Some(suite);

        debug!("Received ServerHello selecting {:?}", suite);
        Ok(())
    }

    fn send_client_key_exchange(&mut self) -> Result<[u8; PRE_MASTER_SECRET_LEN], Error> {
        let server_key = self
            .server_key
            .as_ref()
            .ok_or_else(|| Error::CertificateError("no server key".into()))?;

        let mut pre_master_secret = [0u8; PRE_MASTER_SECRET_LEN];
        pre_master_secret[..2].copy_from_slice(&ProtocolVersion::TLS1_2.as_u16().to_be_bytes());
        self.rng.fill_bytes(&mut pre_master_secret[2..]);

        let encrypted = match server_key.encrypt(&pre_master_secret, &mut self.rng) {
            Ok(v) => v,
            Err(e) => {
                pre_master_secret.zeroize();
                return Err(e);
            }
        };

        let body = Body::ClientKeyExchange(ClientKeyExchange::new(&encrypted));
        if let Err(e) = self.send_handshake(body, MessageType::ClientKeyExchange) {
            pre_master_secret.zeroize();
            return Err(e);
        }
        self.advance(Event::SendClientKeyExchange)?;

        debug!("Sent ClientKeyExchange ({} bytes)", encrypted.len());
        Ok(pre_master_secret)
    }

    fn derive_keys(&mut self, pre_master_secret: &[u8]) -> Result<(), Error> {
        let suite = self.negotiated_suite()?;

        self.master_secret =
            prf::master_secret(pre_master_secret, &self.client_random, &self.server_random)?;

        let mut key_block = prf::key_expansion(
            &self.master_secret,
            &self.client_random,
            &self.server_random,
            suite.key_block_len(),
        )?;
        let keys = KeyMaterial::from_key_block(suite, &key_block);
        key_block.as_mut_slice().zeroize();
        let keys = keys?;

        self.write_cipher = Some(RecordCipher::new(suite, &keys, Direction::ClientWrite));
        self.pending_read_cipher = Some(RecordCipher::new(suite, &keys, Direction::ServerWrite));

        trace!("Derived {} bytes of key material", suite.key_block_len());
        Ok(())
    }

    fn send_change_cipher_spec(&mut self) -> Result<(), Error> {
        // Goes out under the null cipher. The write keys switch on after.
        let write_cipher = self.write_cipher.take();
        let result = self.send_record(ContentType::ChangeCipherSpec, &[0x01]);
        self.write_cipher = write_cipher;
        result?;

        self.client_seq = 0;
        self.advance(Event::SendChangeCipherSpec)?;

        debug!("Sent ChangeCipherSpec");
        Ok(())
    }

    fn send_finished(&mut self) -> Result<(), Error> {
        let handshake_hash = self.transcript.clone_and_finalize();
        let verify_data = prf::verify_data(&self.master_secret, "client finished", &handshake_hash)?;

        let body = Body::Finished(Finished::new(&verify_data));
        self.send_handshake(body, MessageType::Finished)?;
        self.advance(Event::SendFinished)?;

        debug!("Sent Finished");
        Ok(())
    }

    fn receive_server_finished(&mut self) -> Result<(), Error> {
        // ChangeCipherSpec
        loop {
            let record = self.read_record()?;
            match record.content_type {
                ContentType::ChangeCipherSpec => {
                    if record.fragment != [0x01] {
                        return Err(Error::UnexpectedMessage(
                            "malformed ChangeCipherSpec".into(),
                        ));
                    }
                    if !self.handshake_buffer.is_empty() {
                        return Err(Error::UnexpectedMessage(
                            "ChangeCipherSpec inside a handshake message".into(),
                        ));
                    }
                    self.read_cipher = self.pending_read_cipher.take();
                    self.server_seq = 0;
                    debug!("Received ChangeCipherSpec");
                    break;
                }
                ContentType::Alert => return Err(self.handle_alert(&record.fragment)),
                other => return Err(Error::UnexpectedContentType(other)),
            }
        }

        if self.config.verify_server_finished() {
            self.receive_verified_finished()?;
        } else {
            // Take one Handshake record on trust.
            let id = self.id.ok_or(Error::InvalidState(self.state))?;
            let poll_limit = self.config.recv_poll_limit();
            let record = self.reader.read(&mut self.transport, id, poll_limit)?;
            self.server_seq = next_sequence(self.server_seq)?;
            if record.content_type != ContentType::Handshake {
                return Err(Error::UnexpectedContentType(record.content_type));
            }
            warn!("Server Finished accepted without verification");
        }

        self.advance(Event::ServerFinished)?;
        Ok(())
    }

    fn receive_verified_finished(&mut self) -> Result<(), Error> {
        let expected = prf::verify_data(
            &self.master_secret,
            "server finished",
            &self.transcript.clone_and_finalize(),
        )?;

        let message = self.next_handshake_message()?;
        let (_, handshake) = Handshake::parse(&message, self.cipher_suite)?;

        let Body::Finished(finished) = handshake.body else {
            return Err(Error::UnexpectedHandshake(
                handshake.header.msg_type,
                self.state,
            ));
        };

        if !finished.verify(&expected) {
            return Err(Error::FinishedMismatch);
        }

        self.transcript.update(&message);
        debug!("Server Finished verified");
        Ok(())
    }

    /// Read records until there is one application data payload.
    fn fill_pending(&mut self) -> Result<(), Error> {
        loop {
            let record = self.read_record()?;

            match record.content_type {
                ContentType::ApplicationData => {
                    if record.fragment.is_empty() {
                        trace!("Skipping empty application data record");
                        continue;
                    }
                    self.pending = record.fragment;
                    return Ok(());
                }
                ContentType::Alert => return Err(self.handle_alert(&record.fragment)),
                ContentType::Handshake => {
                    // Renegotiation is not supported. HelloRequest may be
                    // ignored, anything else is a protocol error.
                    let (_, header) = Handshake::parse_header(&record.fragment)?;
                    if header.msg_type != MessageType::HelloRequest {
                        return Err(Error::UnexpectedHandshake(header.msg_type, self.state));
                    }
                    debug!("Ignoring HelloRequest");
                    continue;
                }
                other => return Err(Error::UnexpectedContentType(other)),
            }
        }
    }

    /// Next complete handshake message, reading records as needed.
    fn next_handshake_message(&mut self) -> Result<Vec<u8>, Error> {
        loop {
            if let Some(len) = Handshake::complete_len(&self.handshake_buffer) {
                return Ok(self.handshake_buffer.drain(..len).collect());
            }

            if let Ok((_, header)) = Handshake::parse_header(&self.handshake_buffer) {
                let len = HANDSHAKE_HEADER_LEN + header.length as usize;
                if len > MAX_HANDSHAKE_LEN {
                    return Err(Error::TooBigLength(len, MAX_HANDSHAKE_LEN));
                }
            }

            let record = self.read_record()?;
            match record.content_type {
                ContentType::Handshake => self.handshake_buffer.extend_from_slice(&record.fragment),
                ContentType::Alert => return Err(self.handle_alert(&record.fragment)),
                other => return Err(Error::UnexpectedContentType(other)),
            }
        }
    }

    /// Read one record and remove its protection if a read cipher is active.
    fn read_record(&mut self) -> Result<IncomingRecord, Error> {
        let id = self.id.ok_or(Error::InvalidState(self.state))?;
        let poll_limit = self.config.recv_poll_limit();
        let mut record = self.reader.read(&mut self.transport, id, poll_limit)?;

        if let Some(cipher) = &self.read_cipher {
            record.fragment = cipher.open(
                self.server_seq,
                record.content_type,
                record.version,
                &record.fragment,
                self.config.verify_record_mac(),
            )?;
            self.server_seq = next_sequence(self.server_seq)?;
        }

        if record.fragment.len() > MAX_PLAINTEXT {
            return Err(Error::TooBigLength(record.fragment.len(), MAX_PLAINTEXT));
        }

        Ok(record)
    }

    fn handle_alert(&mut self, fragment: &[u8]) -> Error {
        let alert = match Alert::parse(fragment) {
            Ok((_, alert)) => alert,
            Err(e) => return e.into(),
        };

        self.last_alert = Some(alert);

        if alert.is_close_notify() {
            debug!("Received close_notify");
            Error::ConnectionClosed
        } else {
            warn!("Received alert: {:?}", alert);
            Error::AlertReceived(alert)
        }
    }

    fn send_handshake(&mut self, body: Body, msg_type: MessageType) -> Result<(), Error> {
        let mut message = Vec::new();
        Handshake::new(msg_type, 0, body).serialize(&mut message);
        self.transcript.update(&message);
        self.send_record(ContentType::Handshake, &message)
    }

    fn send_record(&mut self, content_type: ContentType, payload: &[u8]) -> Result<(), Error> {
        let id = self.id.ok_or(Error::InvalidState(self.state))?;
        if payload.len() > MAX_PLAINTEXT {
            return Err(Error::TooBigLength(payload.len(), MAX_PLAINTEXT));
        }

        let mut fragment = Vec::with_capacity(payload.len() + 64);
        let fragment = match &self.write_cipher {
            Some(cipher) => {
                cipher.seal(
                    self.client_seq,
                    content_type,
                    ProtocolVersion::TLS1_2,
                    payload,
                    &mut self.rng,
                    &mut fragment,
                )?;
                self.client_seq = next_sequence(self.client_seq)?;
                &fragment[..]
            }
            None => payload,
        };

        let mut record = Vec::with_capacity(fragment.len() + 5);
        Record::new(content_type, ProtocolVersion::TLS1_2, fragment).serialize(&mut record);

        trace!("Record out: {:?} len {}", content_type, fragment.len());
        let sent = self.transport.send(id, &record)?;
        if sent != record.len() {
            return Err(TransportError::ShortWrite(sent, record.len()).into());
        }
        Ok(())
    }

    /// A failed record read leaves the read state unusable. Only timeouts,
    /// transport hiccups and close_notify keep the session.
    fn fail_established(&mut self, error: &Error) {
        match error {
            Error::Timeout | Error::Transport(_) | Error::ConnectionClosed => {}
            _ => {
                warn!("Session failed: {}", error);
                self.state = self.state.transition(Event::Fail).unwrap_or(State::Error);
                self.wipe_secrets();
            }
        }
    }

    fn negotiated_suite(&self) -> Result<CipherSuite, Error> {
        self.cipher_suite.ok_or(Error::InvalidState(self.state))
    }

    /// Map an out of order handshake message to a protocol error.
    fn expect(&self, msg_type: MessageType, event: Event) -> Result<(), Error> {
        self.state
            .transition(event)
            .map(|_| ())
            .map_err(|_| Error::UnexpectedHandshake(msg_type, self.state))
    }

    fn advance(&mut self, event: Event) -> Result<(), Error> {
        self.state = self.state.transition(event)?;
        Ok(())
    }

    fn wipe_secrets(&mut self) {
        self.master_secret.zeroize();
        self.write_cipher = None;
        self.pending_read_cipher = None;
        self.read_cipher = None;
        self.pending.zeroize();
    }

    fn reset(&mut self) {
        self.wipe_secrets();
        self.cipher_suite = None;
        self.client_random = [0; 32];
        self.server_random = [0; 32];
        self.session_id = SessionId::empty();
        self.server_key = None;
        self.transcript = Sha256::new();
        self.client_seq = 0;
        self.server_seq = 0;
        self.reader.clear();
        self.handshake_buffer.clear();
    }
}

fn next_sequence(seq: u64) -> Result<u64, Error> {
    seq.checked_add(1)
        .ok_or_else(|| Error::CryptoError("sequence number exhausted".into()))
}

impl<T: Transport> Drop for TlsConnection<T> {
    fn drop(&mut self) {
        self.wipe_secrets();
    }
}

impl<T: Transport> std::fmt::Debug for TlsConnection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnection")
            .field("state", &self.state)
            .field("id", &self.id)
            .field("cipher_suite", &self.cipher_suite)
            .field("client_seq", &self.client_seq)
            .field("server_seq", &self.server_seq)
            .finish()
    }
}
