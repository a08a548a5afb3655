//! TLS 1.2 failure paths and recovery.

use std::sync::Arc;

use minitls::message::{AlertDescription, AlertLevel, MessageType, ProtocolVersion};
use minitls::{CipherSuite, Config, Error, ErrorKind, State, TlsConnection, TransportError};

use crate::common::*;

fn quick_config() -> Config {
    Config::builder()
        .rng_seed(9)
        .recv_poll_limit(50)
        .build()
        .unwrap()
}

#[test]
fn tls12_edge_silent_server_times_out() {
    let _ = env_logger::try_init();

    let options = ServerOptions {
        silent: true,
        ..Default::default()
    };
    let (conn, result) = try_handshake(options, quick_config());

    let err = result.unwrap_err();
    assert!(matches!(err, Error::Timeout));
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(conn.state(), State::Error);
    assert_eq!(conn.transport().polls, 50);
}

#[test]
fn tls12_edge_alert_instead_of_server_hello() {
    let _ = env_logger::try_init();

    let options = ServerOptions {
        alert_on_hello: Some([2, 40]),
        ..Default::default()
    };
    let (conn, result) = try_handshake(options, config());

    match result {
        Err(Error::AlertReceived(alert)) => {
            assert_eq!(alert.level, AlertLevel::Fatal);
            assert_eq!(alert.description, AlertDescription::HandshakeFailure);
        }
        other => panic!("expected alert, got {:?}", other),
    }

    let last = conn.last_alert().expect("alert recorded");
    assert_eq!(last.description, AlertDescription::HandshakeFailure);
    assert_eq!(conn.state(), State::Error);
}

#[test]
fn tls12_edge_bad_server_finished() {
    let _ = env_logger::try_init();

    let options = ServerOptions {
        corrupt_finished: true,
        ..Default::default()
    };
    let (conn, result) = try_handshake(options, config());

    assert!(matches!(result, Err(Error::FinishedMismatch)));
    assert_eq!(conn.state(), State::Error);
    // The client did its part correctly.
    assert_eq!(conn.transport().client_finished_ok, Some(true));
}

#[test]
fn tls12_edge_bad_server_finished_accepted_when_unverified() {
    let _ = env_logger::try_init();

    let options = ServerOptions {
        corrupt_finished: true,
        ..Default::default()
    };
    let config = Config::builder()
        .verify_server_finished(false)
        .rng_seed(5)
        .build()
        .unwrap();
    let (mut conn, result) = try_handshake(options, config);

    result.unwrap();
    assert_eq!(conn.state(), State::Established);

    // Record sequence stays in step with the server.
    conn.transport_mut().push_application_data(b"data");
    let mut buf = [0u8; 8];
    let n = conn.recv(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"data");
}

#[test]
fn tls12_edge_tampered_record() {
    let _ = env_logger::try_init();

    for suite in [GCM, CBC] {
        let options = ServerOptions {
            suite: Some(suite),
            ..Default::default()
        };
        let mut conn = connect_with(options, config());

        conn.transport_mut().push_application_data(b"secret message");
        conn.transport_mut().tamper_last_byte();

        let mut buf = [0u8; 32];
        let err = conn.recv(&mut buf).unwrap_err();
        assert!(matches!(err, Error::BadRecordMac), "{:?}", err);
        assert_eq!(err.kind(), ErrorKind::Crypto);

        // The session is gone, later calls don't retry the bad record.
        assert_eq!(conn.state(), State::Error);
        assert!(matches!(
            conn.recv(&mut buf),
            Err(Error::InvalidState(State::Error))
        ));
        assert!(matches!(
            conn.send(b"more"),
            Err(Error::InvalidState(State::Error))
        ));

        conn.close().unwrap();
        assert_eq!(conn.state(), State::Init);
        assert!(!conn.transport().close_notify_received);
    }
}

#[test]
fn tls12_edge_server_version_mismatch() {
    let _ = env_logger::try_init();

    let options = ServerOptions {
        version: 0x0302,
        ..Default::default()
    };
    let (conn, result) = try_handshake(options, config());

    assert!(matches!(
        result,
        Err(Error::UnsupportedTlsVersion(ProtocolVersion::TLS1_1))
    ));
    assert_eq!(conn.state(), State::Error);
}

#[test]
fn tls12_edge_server_selects_unoffered_suite() {
    let _ = env_logger::try_init();

    let config = Config::builder()
        .cipher_suites(&[CipherSuite::RSA_AES128_GCM_SHA256])
        .rng_seed(11)
        .build()
        .unwrap();
    let options = ServerOptions {
        suite: Some(CBC),
        ..Default::default()
    };
    let (_, result) = try_handshake(options, config);

    assert!(matches!(result, Err(Error::UnsupportedCipherSuite(0x003C))));
}

#[test]
fn tls12_edge_server_key_exchange_rejected() {
    let _ = env_logger::try_init();

    let options = ServerOptions {
        server_key_exchange: true,
        ..Default::default()
    };
    let (_, result) = try_handshake(options, config());

    assert!(matches!(
        result,
        Err(Error::UnexpectedHandshake(
            MessageType::ServerKeyExchange,
            State::CertificateReceived
        ))
    ));
}

#[test]
fn tls12_edge_close_after_failure_resets() {
    let _ = env_logger::try_init();

    let options = ServerOptions {
        corrupt_finished: true,
        ..Default::default()
    };
    let (mut conn, result) = try_handshake(options, config());
    assert!(result.is_err());
    assert_eq!(conn.state(), State::Error);

    conn.close().unwrap();
    assert_eq!(conn.state(), State::Init);
    assert_eq!(conn.cipher_suite(), None);
    // Nothing protected goes out on a failed session.
    assert!(!conn.transport().close_notify_received);
}

#[test]
fn tls12_edge_send_before_handshake() {
    let _ = env_logger::try_init();

    let mut conn = TlsConnection::new(
        FakeServer::new(ServerOptions::default()),
        Arc::new(config()),
    );

    assert!(matches!(
        conn.send(b"too early"),
        Err(Error::InvalidState(State::Init))
    ));
    let mut buf = [0u8; 4];
    assert!(matches!(
        conn.recv(&mut buf),
        Err(Error::InvalidState(State::Init))
    ));
}

#[test]
fn tls12_edge_handshake_twice() {
    let _ = env_logger::try_init();

    let mut conn = connect_with(ServerOptions::default(), config());
    assert!(matches!(
        conn.handshake(HOSTNAME, SERVER_IP, SERVER_PORT),
        Err(Error::InvalidState(State::Established))
    ));
    // A misuse does not tear down the session.
    assert_eq!(conn.state(), State::Established);
}

#[test]
fn tls12_edge_close_notify_from_server() {
    let _ = env_logger::try_init();

    let mut conn = connect_with(ServerOptions::default(), config());
    conn.transport_mut().push_alert(1, 0);

    let mut buf = [0u8; 4];
    assert!(matches!(conn.recv(&mut buf), Err(Error::ConnectionClosed)));
    assert!(conn.last_alert().unwrap().is_close_notify());
}

#[test]
fn tls12_edge_fatal_alert_after_handshake() {
    let _ = env_logger::try_init();

    let mut conn = connect_with(ServerOptions::default(), config());
    conn.transport_mut().push_alert(2, 80);

    let mut buf = [0u8; 4];
    match conn.recv(&mut buf) {
        Err(Error::AlertReceived(alert)) => {
            assert_eq!(alert.description, AlertDescription::InternalError)
        }
        other => panic!("expected alert, got {:?}", other),
    }
    assert_eq!(conn.state(), State::Error);
}

#[test]
fn tls12_edge_peer_hangs_up() {
    let _ = env_logger::try_init();

    let mut conn = connect_with(ServerOptions::default(), config());
    conn.transport_mut().hung_up = true;

    let mut buf = [0u8; 4];
    assert!(matches!(conn.recv(&mut buf), Err(Error::ConnectionClosed)));
    assert_eq!(conn.state(), State::Established);
}

#[test]
fn tls12_edge_garbage_record_type() {
    let _ = env_logger::try_init();

    let mut conn = connect_with(ServerOptions::default(), config());
    conn.transport_mut().push_raw(&[0x63, 0x03, 0x03, 0x00, 0x00]);

    let mut buf = [0u8; 4];
    assert!(matches!(
        conn.recv(&mut buf),
        Err(Error::InvalidContentType(0x63))
    ));
}

#[test]
fn tls12_edge_host_name_too_long() {
    let _ = env_logger::try_init();

    let mut conn = TlsConnection::new(
        FakeServer::new(ServerOptions::default()),
        Arc::new(config()),
    );
    let result = conn.handshake(&"a".repeat(70_000), SERVER_IP, SERVER_PORT);

    assert!(matches!(result, Err(Error::TooBigLength(70_000, 255))));
    assert_eq!(conn.state(), State::Error);
    // Nothing reached the server.
    assert!(conn.transport().offered_suites.is_empty());
}

#[test]
fn tls12_edge_longest_host_name() {
    let _ = env_logger::try_init();

    let hostname = "a".repeat(255);
    let conn = minitls::connect(
        FakeServer::new(ServerOptions::default()),
        Arc::new(config()),
        &hostname,
        SERVER_IP,
        SERVER_PORT,
    )
    .unwrap();

    assert_eq!(conn.transport().sni.as_deref(), Some(hostname.as_str()));
    assert_eq!(conn.state(), State::Established);
}

#[test]
fn tls12_edge_short_transport_write() {
    let _ = env_logger::try_init();

    let options = ServerOptions {
        max_send: 10,
        ..Default::default()
    };
    let (conn, result) = try_handshake(options, config());

    let err = result.unwrap_err();
    match &err {
        Error::Transport(TransportError::ShortWrite(10, total)) => assert!(*total > 10),
        other => panic!("expected short write, got {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(conn.state(), State::Error);
}
