//! Shared helpers for TLS 1.2 integration tests.
//!
//! [`FakeServer`] plays the server side of the handshake in-process. It
//! implements [`Transport`] so the client under test drives it directly,
//! and every bit of its crypto comes from independent crates.

#![allow(unused)]

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, OnceLock};

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::cipher::generic_array::GenericArray;
use aes_gcm::aes::cipher::{BlockDecrypt, BlockEncrypt};
use hmac::{Hmac, Mac};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rsa::pkcs8::EncodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use sha2::{Digest, Sha256};

use minitls::{Config, ConnectionId, TlsConnection, Transport, TransportError};

pub const SERVER_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
pub const SERVER_PORT: u16 = 4433;
pub const HOSTNAME: &str = "example.test";

pub const GCM: u16 = 0x009C;
pub const CBC: u16 = 0x003C;

/// Record content types.
pub const CHANGE_CIPHER_SPEC: u8 = 20;
pub const ALERT: u8 = 21;
pub const HANDSHAKE: u8 = 22;
pub const APPLICATION_DATA: u8 = 23;

/// Handshake message types.
pub const HELLO_REQUEST: u8 = 0;
pub const CLIENT_HELLO: u8 = 1;
pub const SERVER_HELLO: u8 = 2;
pub const CERTIFICATE: u8 = 11;
pub const SERVER_KEY_EXCHANGE: u8 = 12;
pub const SERVER_HELLO_DONE: u8 = 14;
pub const CLIENT_KEY_EXCHANGE: u8 = 16;
pub const FINISHED: u8 = 20;

/// Server RSA key, generated once per test binary.
pub fn server_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(0x7e57);
        RsaPrivateKey::new(&mut rng, 1024).expect("generate server key")
    })
}

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xFF {
        out.extend_from_slice(&[0x81, len as u8]);
    } else {
        out.extend_from_slice(&[0x82, (len >> 8) as u8, len as u8]);
    }
    out.extend_from_slice(content);
    out
}

fn seq(parts: &[&[u8]]) -> Vec<u8> {
    tlv(0x30, &parts.concat())
}

/// A minimal X.509 shaped certificate carrying the server key.
///
/// The signature is junk. The client does not validate chains.
pub fn server_certificate() -> Vec<u8> {
    let spki = server_key()
        .to_public_key()
        .to_public_key_der()
        .expect("encode spki");

    // sha256WithRSAEncryption
    let sig_alg = seq(&[
        &tlv(0x06, &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B]),
        &[0x05, 0x00],
    ]);
    let name = seq(&[&tlv(
        0x31,
        &seq(&[&tlv(0x06, &[0x55, 0x04, 0x03]), &tlv(0x0C, HOSTNAME.as_bytes())]),
    )]);
    let validity = seq(&[
        &tlv(0x17, b"250101000000Z"),
        &tlv(0x17, b"350101000000Z"),
    ]);
    let tbs = seq(&[
        &tlv(0xA0, &tlv(0x02, &[0x02])),
        &tlv(0x02, &[0x42]),
        &sig_alg,
        &name,
        &validity,
        &name,
        spki.as_bytes(),
    ]);
    seq(&[&tbs, &sig_alg, &tlv(0x03, &[0x00; 65])])
}

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key).expect("hmac key");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().to_vec()
}

/// P_SHA256 as in RFC 5246 section 5.
pub fn prf(secret: &[u8], label: &str, seed: &[u8], len: usize) -> Vec<u8> {
    let label_seed = [label.as_bytes(), seed].concat();
    let mut out = Vec::new();
    let mut a = hmac_sha256(secret, &[&label_seed]);
    while out.len() < len {
        out.extend(hmac_sha256(secret, &[&a, &label_seed]));
        a = hmac_sha256(secret, &[&a]);
    }
    out.truncate(len);
    out
}

pub fn record(content_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![content_type, 0x03, 0x03];
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn handshake(msg_type: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![msg_type];
    out.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(body);
    out
}

fn u24(len: usize) -> [u8; 3] {
    let b = (len as u32).to_be_bytes();
    [b[1], b[2], b[3]]
}

/// One direction of record protection.
#[derive(Clone)]
pub struct Protection {
    suite: u16,
    mac_key: Vec<u8>,
    key: Vec<u8>,
    iv: Vec<u8>,
}

fn aad(seq: u64, content_type: u8, len: usize) -> Vec<u8> {
    let mut out = seq.to_be_bytes().to_vec();
    out.extend_from_slice(&[content_type, 0x03, 0x03]);
    out.extend_from_slice(&(len as u16).to_be_bytes());
    out
}

impl Protection {
    /// Split a key block into (client write, server write).
    pub fn from_key_block(suite: u16, block: &[u8]) -> (Protection, Protection) {
        let (mac_len, iv_len) = if suite == GCM { (0, 4) } else { (32, 16) };
        let mut rest = block;
        let mut take = |n: usize| {
            let (head, tail) = rest.split_at(n);
            rest = tail;
            head.to_vec()
        };
        let client_mac = take(mac_len);
        let server_mac = take(mac_len);
        let client_key = take(16);
        let server_key = take(16);
        let client_iv = take(iv_len);
        let server_iv = take(iv_len);
        (
            Protection {
                suite,
                mac_key: client_mac,
                key: client_key,
                iv: client_iv,
            },
            Protection {
                suite,
                mac_key: server_mac,
                key: server_key,
                iv: server_iv,
            },
        )
    }

    pub fn key_block_len(suite: u16) -> usize {
        if suite == GCM {
            40
        } else {
            128
        }
    }

    pub fn seal(&self, seq: u64, content_type: u8, plaintext: &[u8], rng: &mut StdRng) -> Vec<u8> {
        if self.suite == GCM {
            let explicit = seq.to_be_bytes();
            let nonce = [&self.iv[..], &explicit[..]].concat();
            let cipher = aes_gcm::Aes128Gcm::new_from_slice(&self.key).expect("gcm key");
            let sealed = cipher
                .encrypt(
                    aes_gcm::Nonce::from_slice(&nonce),
                    Payload {
                        msg: plaintext,
                        aad: &aad(seq, content_type, plaintext.len()),
                    },
                )
                .expect("gcm seal");
            [&explicit[..], &sealed[..]].concat()
        } else {
            let mut iv = [0u8; 16];
            rng.fill_bytes(&mut iv);

            let mac = hmac_sha256(
                &self.mac_key,
                &[&aad(seq, content_type, plaintext.len()), plaintext],
            );
            let mut data = [plaintext, &mac[..]].concat();
            let pad = 15 - data.len() % 16;
            data.extend(std::iter::repeat(pad as u8).take(pad + 1));

            let cipher = aes_gcm::aes::Aes128::new_from_slice(&self.key).expect("aes key");
            let mut prev = iv;
            for chunk in data.chunks_mut(16) {
                for (b, p) in chunk.iter_mut().zip(prev.iter()) {
                    *b ^= p;
                }
                let block = GenericArray::from_mut_slice(chunk);
                cipher.encrypt_block(block);
                prev.copy_from_slice(chunk);
            }
            [&iv[..], &data[..]].concat()
        }
    }

    /// `None` if the fragment does not authenticate.
    pub fn open(&self, seq: u64, content_type: u8, fragment: &[u8]) -> Option<Vec<u8>> {
        if self.suite == GCM {
            if fragment.len() < 24 {
                return None;
            }
            let (explicit, sealed) = fragment.split_at(8);
            let nonce = [&self.iv[..], explicit].concat();
            let cipher = aes_gcm::Aes128Gcm::new_from_slice(&self.key).ok()?;
            cipher
                .decrypt(
                    aes_gcm::Nonce::from_slice(&nonce),
                    Payload {
                        msg: sealed,
                        aad: &aad(seq, content_type, sealed.len() - 16),
                    },
                )
                .ok()
        } else {
            if fragment.len() < 64 || fragment.len() % 16 != 0 {
                return None;
            }
            let (iv, ciphertext) = fragment.split_at(16);
            let cipher = aes_gcm::aes::Aes128::new_from_slice(&self.key).ok()?;

            let mut data = ciphertext.to_vec();
            let mut prev = iv.to_vec();
            for chunk in data.chunks_mut(16) {
                let saved = chunk.to_vec();
                cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
                for (b, p) in chunk.iter_mut().zip(prev.iter()) {
                    *b ^= p;
                }
                prev = saved;
            }

            let pad = *data.last()? as usize;
            if pad + 1 + 32 > data.len() || data[data.len() - pad - 1..].iter().any(|b| *b as usize != pad) {
                return None;
            }
            data.truncate(data.len() - pad - 1);
            let mac = data.split_off(data.len() - 32);
            let expected = hmac_sha256(&self.mac_key, &[&aad(seq, content_type, data.len()), &data]);
            (mac == expected).then_some(data)
        }
    }
}

/// Knobs for [`FakeServer`].
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Suite to select. `None` picks the first one offered.
    pub suite: Option<u16>,
    /// Version in ServerHello.
    pub version: u16,
    /// One record per handshake message, with Certificate split over two.
    pub split_records: bool,
    /// Largest chunk handed to the client per recv call.
    pub chunk: usize,
    /// Flip a bit in the server's verify_data.
    pub corrupt_finished: bool,
    /// Answer ClientHello with this alert instead of a flight.
    pub alert_on_hello: Option<[u8; 2]>,
    /// Never send anything.
    pub silent: bool,
    /// Insert a ServerKeyExchange before ServerHelloDone.
    pub server_key_exchange: bool,
    /// Send HelloRequest ahead of ServerHello.
    pub hello_request_first: bool,
    /// Send every application data record back.
    pub echo: bool,
    /// Accept at most this many bytes per send call.
    pub max_send: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions {
            suite: None,
            version: 0x0303,
            split_records: false,
            chunk: usize::MAX,
            corrupt_finished: false,
            alert_on_hello: None,
            silent: false,
            server_key_exchange: false,
            hello_request_first: false,
            echo: false,
            max_send: usize::MAX,
        }
    }
}

/// In-process TLS 1.2 server speaking RSA key transport.
pub struct FakeServer {
    options: ServerOptions,
    rng: StdRng,
    id: Option<ConnectionId>,

    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
    handshake_buffer: Vec<u8>,

    transcript: Vec<u8>,
    client_random: Vec<u8>,
    server_random: Vec<u8>,
    master_secret: Vec<u8>,
    suite: u16,

    client_write: Option<Protection>,
    server_write: Option<Protection>,
    client_seq: u64,
    server_seq: u64,
    client_encrypting: bool,

    /// Suites listed in ClientHello.
    pub offered_suites: Vec<u16>,
    /// server_name from ClientHello.
    pub sni: Option<String>,
    /// Whether the client's verify_data matched.
    pub client_finished_ok: Option<bool>,
    /// Decrypted application data, one entry per record.
    pub received: Vec<Vec<u8>>,
    pub close_notify_received: bool,
    /// The peer hung up. Reported once the outbox drains.
    pub hung_up: bool,
    pub closed: bool,
    pub polls: usize,
}

impl FakeServer {
    pub fn new(options: ServerOptions) -> Self {
        FakeServer {
            options,
            rng: StdRng::seed_from_u64(0x5e4e4),
            id: None,
            inbox: Vec::new(),
            outbox: VecDeque::new(),
            handshake_buffer: Vec::new(),
            transcript: Vec::new(),
            client_random: Vec::new(),
            server_random: Vec::new(),
            master_secret: Vec::new(),
            suite: 0,
            client_write: None,
            server_write: None,
            client_seq: 0,
            server_seq: 0,
            client_encrypting: false,
            offered_suites: Vec::new(),
            sni: None,
            client_finished_ok: None,
            received: Vec::new(),
            close_notify_received: false,
            hung_up: false,
            closed: false,
            polls: 0,
        }
    }

    pub fn suite(&self) -> u16 {
        self.suite
    }

    pub fn master_secret(&self) -> &[u8] {
        &self.master_secret
    }

    /// Queue raw bytes for the client.
    pub fn push_raw(&mut self, bytes: &[u8]) {
        self.outbox.extend(bytes);
    }

    /// Queue a record under the server write keys.
    pub fn push_protected(&mut self, content_type: u8, plaintext: &[u8]) {
        let protection = self.server_write.clone().expect("server keys active");
        let fragment = protection.seal(self.server_seq, content_type, plaintext, &mut self.rng);
        self.server_seq += 1;
        self.push_raw(&record(content_type, &fragment));
    }

    pub fn push_application_data(&mut self, data: &[u8]) {
        self.push_protected(APPLICATION_DATA, data);
    }

    pub fn push_alert(&mut self, level: u8, description: u8) {
        self.push_protected(ALERT, &[level, description]);
    }

    /// Flip a bit in the last byte waiting in the outbox.
    pub fn tamper_last_byte(&mut self) {
        if let Some(b) = self.outbox.back_mut() {
            *b ^= 0x01;
        }
    }

    fn process_inbox(&mut self) {
        while self.inbox.len() >= 5 {
            let len = u16::from_be_bytes([self.inbox[3], self.inbox[4]]) as usize;
            if self.inbox.len() < 5 + len {
                return;
            }
            let rec: Vec<u8> = self.inbox.drain(..5 + len).collect();
            assert_eq!(&rec[1..3], &[0x03, 0x03], "client record version");
            self.handle_record(rec[0], &rec[5..]);
        }
    }

    fn handle_record(&mut self, content_type: u8, fragment: &[u8]) {
        let plaintext = if self.client_encrypting {
            let protection = self.client_write.as_ref().expect("client keys");
            let plaintext = protection
                .open(self.client_seq, content_type, fragment)
                .expect("client record authenticates");
            self.client_seq += 1;
            plaintext
        } else {
            fragment.to_vec()
        };

        match content_type {
            HANDSHAKE => {
                self.handshake_buffer.extend_from_slice(&plaintext);
                while self.handshake_buffer.len() >= 4 {
                    let b = &self.handshake_buffer;
                    let len = u32::from_be_bytes([0, b[1], b[2], b[3]]) as usize;
                    if b.len() < 4 + len {
                        break;
                    }
                    let message: Vec<u8> = self.handshake_buffer.drain(..4 + len).collect();
                    self.handle_handshake(&message);
                }
            }
            CHANGE_CIPHER_SPEC => {
                assert_eq!(plaintext, [0x01]);
                self.client_encrypting = true;
                self.client_seq = 0;
            }
            APPLICATION_DATA => {
                if self.options.echo {
                    self.push_application_data(&plaintext);
                }
                self.received.push(plaintext);
            }
            ALERT => {
                if plaintext == [0x01, 0x00] {
                    self.close_notify_received = true;
                }
            }
            other => panic!("unexpected content type from client: {}", other),
        }
    }

    fn handle_handshake(&mut self, message: &[u8]) {
        match message[0] {
            CLIENT_HELLO => {
                self.transcript.extend_from_slice(message);
                self.parse_client_hello(&message[4..]);
                if self.options.silent {
                    return;
                }
                if let Some(alert) = self.options.alert_on_hello {
                    self.push_raw(&record(ALERT, &alert));
                    return;
                }
                self.send_server_flight();
            }
            CLIENT_KEY_EXCHANGE => {
                self.transcript.extend_from_slice(message);
                let body = &message[4..];
                let len = u16::from_be_bytes([body[0], body[1]]) as usize;
                assert_eq!(len, body.len() - 2, "ClientKeyExchange length");

                let pre_master_secret = server_key()
                    .decrypt(Pkcs1v15Encrypt, &body[2..])
                    .expect("decrypt pre-master secret");
                assert_eq!(pre_master_secret.len(), 48);
                assert_eq!(&pre_master_secret[..2], &[0x03, 0x03]);

                let randoms = [&self.client_random[..], &self.server_random[..]].concat();
                self.master_secret = prf(&pre_master_secret, "master secret", &randoms, 48);

                let randoms = [&self.server_random[..], &self.client_random[..]].concat();
                let block = prf(
                    &self.master_secret,
                    "key expansion",
                    &randoms,
                    Protection::key_block_len(self.suite),
                );
                let (client_write, server_write) = Protection::from_key_block(self.suite, &block);
                self.client_write = Some(client_write);
                self.server_write = Some(server_write);
            }
            FINISHED => {
                let hash = Sha256::digest(&self.transcript);
                let expected = prf(&self.master_secret, "client finished", &hash, 12);
                self.client_finished_ok = Some(message[4..] == expected[..]);
                self.transcript.extend_from_slice(message);

                self.push_raw(&record(CHANGE_CIPHER_SPEC, &[0x01]));
                self.server_seq = 0;

                let hash = Sha256::digest(&self.transcript);
                let mut verify_data = prf(&self.master_secret, "server finished", &hash, 12);
                if self.options.corrupt_finished {
                    verify_data[0] ^= 0x80;
                }
                self.push_protected(HANDSHAKE, &handshake(FINISHED, &verify_data));
            }
            other => panic!("unexpected handshake message from client: {}", other),
        }
    }

    fn parse_client_hello(&mut self, body: &[u8]) {
        assert_eq!(&body[..2], &[0x03, 0x03], "client_version");
        self.client_random = body[2..34].to_vec();

        let mut p = 34;
        p += 1 + body[p] as usize;

        let suites_len = u16::from_be_bytes([body[p], body[p + 1]]) as usize;
        self.offered_suites = body[p + 2..p + 2 + suites_len]
            .chunks(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        p += 2 + suites_len;

        let compression_len = body[p] as usize;
        assert!(body[p + 1..p + 1 + compression_len].contains(&0));
        p += 1 + compression_len;

        if p == body.len() {
            return;
        }
        let extensions_len = u16::from_be_bytes([body[p], body[p + 1]]) as usize;
        p += 2;
        assert_eq!(p + extensions_len, body.len(), "extensions length");

        while p < body.len() {
            let ext_type = u16::from_be_bytes([body[p], body[p + 1]]);
            let ext_len = u16::from_be_bytes([body[p + 2], body[p + 3]]) as usize;
            let data = &body[p + 4..p + 4 + ext_len];
            if ext_type == 0 {
                // server_name_list, one host_name entry
                assert_eq!(data[2], 0);
                let name_len = u16::from_be_bytes([data[3], data[4]]) as usize;
                self.sni = Some(String::from_utf8(data[5..5 + name_len].to_vec()).expect("utf8"));
            }
            p += 4 + ext_len;
        }
    }

    fn send_server_flight(&mut self) {
        self.suite = self.options.suite.unwrap_or_else(|| {
            *self
                .offered_suites
                .iter()
                .find(|s| **s == GCM || **s == CBC)
                .expect("client offers a known suite")
        });

        let mut server_random = [0u8; 32];
        self.rng.fill_bytes(&mut server_random);
        self.server_random = server_random.to_vec();

        let mut session_id = [0u8; 32];
        self.rng.fill_bytes(&mut session_id);

        let mut hello = self.options.version.to_be_bytes().to_vec();
        hello.extend_from_slice(&server_random);
        hello.push(32);
        hello.extend_from_slice(&session_id);
        hello.extend_from_slice(&self.suite.to_be_bytes());
        hello.push(0);

        let cert = server_certificate();
        let mut certificate = u24(cert.len() + 3).to_vec();
        certificate.extend_from_slice(&u24(cert.len()));
        certificate.extend_from_slice(&cert);

        let mut messages = Vec::new();
        if self.options.hello_request_first {
            // Not part of the transcript.
            messages.push(handshake(HELLO_REQUEST, &[]));
        }
        let first_hashed = messages.len();
        messages.push(handshake(SERVER_HELLO, &hello));
        messages.push(handshake(CERTIFICATE, &certificate));
        if self.options.server_key_exchange {
            messages.push(handshake(SERVER_KEY_EXCHANGE, &[0x03, 0x00, 0x17, 0x00]));
        }
        messages.push(handshake(SERVER_HELLO_DONE, &[]));

        for message in &messages[first_hashed..] {
            self.transcript.extend_from_slice(message);
        }

        if self.options.split_records {
            for message in &messages {
                if message[0] == CERTIFICATE {
                    let (a, b) = message.split_at(message.len() / 2);
                    self.push_raw(&record(HANDSHAKE, a));
                    self.push_raw(&record(HANDSHAKE, b));
                } else {
                    self.push_raw(&record(HANDSHAKE, message));
                }
            }
        } else {
            self.push_raw(&record(HANDSHAKE, &messages.concat()));
        }
    }
}

impl Transport for FakeServer {
    fn connect(&mut self, ip: IpAddr, port: u16) -> Result<ConnectionId, TransportError> {
        assert_eq!(ip, SERVER_IP);
        assert_eq!(port, SERVER_PORT);
        let id = ConnectionId(7);
        self.id = Some(id);
        Ok(id)
    }

    fn send(&mut self, id: ConnectionId, data: &[u8]) -> Result<usize, TransportError> {
        if self.id != Some(id) || self.closed {
            return Err(TransportError::UnknownConnection(id));
        }
        let accepted = data.len().min(self.options.max_send);
        self.inbox.extend_from_slice(&data[..accepted]);
        self.process_inbox();
        Ok(accepted)
    }

    fn recv(&mut self, id: ConnectionId, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.id != Some(id) {
            return Err(TransportError::UnknownConnection(id));
        }
        let n = buf.len().min(self.options.chunk).min(self.outbox.len());
        for (i, b) in self.outbox.drain(..n).enumerate() {
            buf[i] = b;
        }
        Ok(n)
    }

    fn is_closed(&self, _: ConnectionId) -> bool {
        self.closed || (self.hung_up && self.outbox.is_empty())
    }

    fn close(&mut self, _: ConnectionId) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }

    fn poll(&mut self) {
        self.polls += 1;
    }
}

pub fn config() -> Config {
    Config::builder()
        .rng_seed(42)
        .recv_poll_limit(10_000)
        .build()
        .expect("build config")
}

/// Handshake against a server with `options`.
pub fn connect_with(options: ServerOptions, config: Config) -> TlsConnection<FakeServer> {
    minitls::connect(
        FakeServer::new(options),
        Arc::new(config),
        HOSTNAME,
        SERVER_IP,
        SERVER_PORT,
    )
    .expect("handshake")
}

/// Try a handshake, keeping the connection on failure.
pub fn try_handshake(
    options: ServerOptions,
    config: Config,
) -> (TlsConnection<FakeServer>, Result<(), minitls::Error>) {
    let mut conn = TlsConnection::new(FakeServer::new(options), Arc::new(config));
    let result = conn.handshake(HOSTNAME, SERVER_IP, SERVER_PORT);
    (conn, result)
}
