//! Application data over an established TLS 1.2 session.

use minitls::{Error, State};

use crate::common::*;

#[test]
fn tls12_data_send_gcm() {
    let _ = env_logger::try_init();

    let mut conn = connect_with(ServerOptions::default(), config());
    assert_eq!(conn.send(b"ping").unwrap(), 4);
    assert_eq!(conn.send(b"pong").unwrap(), 4);

    let server = conn.transport();
    assert_eq!(server.received, vec![b"ping".to_vec(), b"pong".to_vec()]);
    assert_eq!(conn.client_sequence(), 3);
}

#[test]
fn tls12_data_send_cbc() {
    let _ = env_logger::try_init();

    let options = ServerOptions {
        suite: Some(CBC),
        ..Default::default()
    };
    let mut conn = connect_with(options, config());

    // Exercise every padding length.
    let mut expected = Vec::new();
    for len in 0..40 {
        let data: Vec<u8> = (0..len as u8).collect();
        conn.send(&data).unwrap();
        expected.push(data);
    }

    assert_eq!(conn.transport().received, expected);
}

#[test]
fn tls12_data_echo() {
    let _ = env_logger::try_init();

    for suite in [GCM, CBC] {
        let options = ServerOptions {
            suite: Some(suite),
            echo: true,
            ..Default::default()
        };
        let mut conn = connect_with(options, config());

        conn.send(b"hello over tls").unwrap();

        let mut buf = [0u8; 64];
        let n = conn.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello over tls");
        assert_eq!(conn.server_sequence(), 2);
    }
}

#[test]
fn tls12_data_recv_in_pieces() {
    let _ = env_logger::try_init();

    let mut conn = connect_with(ServerOptions::default(), config());

    let payload: Vec<u8> = (0..3000u32).map(|i| i as u8).collect();
    conn.transport_mut().push_application_data(&payload);

    let mut received = Vec::new();
    let mut buf = [0u8; 1000];
    while received.len() < payload.len() {
        let n = conn.recv(&mut buf).unwrap();
        assert!(n > 0);
        received.extend_from_slice(&buf[..n]);
    }
    assert_eq!(received, payload);

    // One record, one sequence number.
    assert_eq!(conn.server_sequence(), 2);
}

#[test]
fn tls12_data_skips_empty_records() {
    let _ = env_logger::try_init();

    let mut conn = connect_with(ServerOptions::default(), config());
    conn.transport_mut().push_application_data(&[]);
    conn.transport_mut().push_application_data(b"after empty");

    let mut buf = [0u8; 32];
    let n = conn.recv(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"after empty");
}

#[test]
fn tls12_data_max_record_size() {
    let _ = env_logger::try_init();

    let mut conn = connect_with(ServerOptions::default(), config());

    let data = vec![0xAB; 16384];
    assert_eq!(conn.send(&data).unwrap(), 16384);
    assert_eq!(conn.transport().received[0].len(), 16384);

    let too_big = vec![0xAB; 16385];
    assert!(matches!(
        conn.send(&too_big),
        Err(Error::TooBigLength(16385, 16384))
    ));
    assert_eq!(conn.state(), State::Established);
}

#[test]
fn tls12_data_close_sends_close_notify() {
    let _ = env_logger::try_init();

    let mut conn = connect_with(ServerOptions::default(), config());
    conn.close().unwrap();

    assert!(conn.transport().close_notify_received);
    assert!(conn.transport().closed);
    assert_eq!(conn.state(), State::Init);
    assert_eq!(conn.cipher_suite(), None);
    assert!(conn.server_public_key().is_none());
    assert_eq!(conn.connection_id(), None);
}

#[test]
fn tls12_data_ignores_hello_request() {
    let _ = env_logger::try_init();

    let mut conn = connect_with(ServerOptions::default(), config());
    conn.transport_mut()
        .push_protected(HANDSHAKE, &handshake(HELLO_REQUEST, &[]));
    conn.transport_mut().push_application_data(b"still here");

    let mut buf = [0u8; 32];
    let n = conn.recv(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"still here");
}
