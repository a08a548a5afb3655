//! TLS 1.2 handshake tests against the in-process server.

use minitls::{CipherSuite, Config, State};

use crate::common::*;

#[test]
fn tls12_handshake_gcm() {
    let _ = env_logger::try_init();

    let conn = connect_with(ServerOptions::default(), config());

    assert_eq!(conn.state(), State::Established);
    assert_eq!(
        conn.cipher_suite(),
        Some(CipherSuite::RSA_AES128_GCM_SHA256)
    );

    let server = conn.transport();
    assert_eq!(server.suite(), GCM);
    assert_eq!(server.offered_suites, vec![GCM, CBC]);
    assert_eq!(server.client_finished_ok, Some(true));
    assert_eq!(server.sni.as_deref(), Some(HOSTNAME));

    // Finished was the only protected record in each direction.
    assert_eq!(conn.client_sequence(), 1);
    assert_eq!(conn.server_sequence(), 1);
}

#[test]
fn tls12_handshake_cbc() {
    let _ = env_logger::try_init();

    let options = ServerOptions {
        suite: Some(CBC),
        ..Default::default()
    };
    let conn = connect_with(options, config());

    assert_eq!(conn.state(), State::Established);
    assert_eq!(
        conn.cipher_suite(),
        Some(CipherSuite::RSA_AES128_CBC_SHA256)
    );
    assert_eq!(conn.transport().client_finished_ok, Some(true));
}

#[test]
fn tls12_handshake_cbc_only_client() {
    let _ = env_logger::try_init();

    let config = Config::builder()
        .cipher_suites(&[CipherSuite::RSA_AES128_CBC_SHA256])
        .rng_seed(3)
        .build()
        .unwrap();
    let conn = connect_with(ServerOptions::default(), config);

    assert_eq!(conn.transport().offered_suites, vec![CBC]);
    assert_eq!(conn.transport().suite(), CBC);
    assert_eq!(conn.state(), State::Established);
}

#[test]
fn tls12_handshake_split_records_and_small_reads() {
    // Every handshake message in its own record, Certificate spread over
    // two records, and the transport handing out 7 bytes at a time.
    let _ = env_logger::try_init();

    let options = ServerOptions {
        split_records: true,
        chunk: 7,
        ..Default::default()
    };
    let conn = connect_with(options, config());

    assert_eq!(conn.state(), State::Established);
    assert_eq!(conn.transport().client_finished_ok, Some(true));
}

#[test]
fn tls12_handshake_server_key_matches_certificate() {
    use rsa::traits::PublicKeyParts;

    let _ = env_logger::try_init();

    let conn = connect_with(ServerOptions::default(), config());
    let key = conn.server_public_key().expect("server key");

    let expected = server_key().to_public_key();
    assert_eq!(key.bits(), 1024);
    assert_eq!(key.modulus().to_bytes(128).unwrap(), expected.n().to_bytes_be());
    assert_eq!(key.exponent().to_bytes(3).unwrap(), expected.e().to_bytes_be());
}

#[test]
fn tls12_handshake_session_id_echoed() {
    let _ = env_logger::try_init();

    let conn = connect_with(ServerOptions::default(), config());
    assert_eq!(conn.session_id().len(), 32);
}

#[test]
fn tls12_handshake_ignores_hello_request() {
    let _ = env_logger::try_init();

    let options = ServerOptions {
        hello_request_first: true,
        ..Default::default()
    };
    let conn = connect_with(options, config());

    assert_eq!(conn.state(), State::Established);
    assert_eq!(conn.transport().client_finished_ok, Some(true));
}

#[test]
fn tls12_handshake_without_server_name() {
    let _ = env_logger::try_init();

    let mut conn = minitls::TlsConnection::new(
        FakeServer::new(ServerOptions::default()),
        std::sync::Arc::new(config()),
    );
    conn.handshake("", SERVER_IP, SERVER_PORT).unwrap();

    assert_eq!(conn.transport().sni, None);
    assert_eq!(conn.state(), State::Established);
}
