//! Сценарии входа против скриптового сервера

mod support;

use std::sync::Arc;

use tokio::net::TcpListener;

use mlink_core::auth::NullAuthenticator;
use mlink_core::connection::{ConnectOptions, ConnectOutcome, SessionConnection};
use mlink_core::error::{MlinkError, ProtocolError};
use mlink_core::events::{MemorySink, SessionEvent};
use mlink_core::packets::ConnectionState;

use support::*;

fn new_connection(
    addr: std::net::SocketAddr,
    sink: Arc<MemorySink>,
) -> SessionConnection {
    SessionConnection::new(
        addr.ip().to_string(),
        addr.port(),
        ConnectOptions::default(),
        Arc::new(NullAuthenticator),
        sink,
    )
}

#[tokio::test]
async fn login_success_transitions_to_configuration_then_play() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut link = ServerLink::new(stream);

        let username = accept_login(&mut link).await;
        assert_eq!(username, "TestSteve");

        link.write_frame(0x02, &login_success_payload()).await;

        let (id, _) = link.read_frame().await;
        assert_eq!(id, 0x03, "ожидалось подтверждение входа");

        link.write_frame(0x03, &[]).await;

        let (id, _) = link.read_frame().await;
        assert_eq!(id, 0x03, "ожидалось подтверждение finish-configuration");
    });

    let sink = Arc::new(MemorySink::new());
    let mut connection = new_connection(addr, sink.clone());

    let outcome = connection.connect(&test_credential()).await.unwrap();
    assert!(matches!(outcome, ConnectOutcome::Play));
    assert_eq!(connection.state(), ConnectionState::Play);
    assert!(!connection.encryption_enabled());

    let events = sink.snapshot();
    let transitions: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (ConnectionState::Handshaking, ConnectionState::Login),
            (ConnectionState::Login, ConnectionState::Configuration),
            (ConnectionState::Configuration, ConnectionState::Play),
        ]
    );

    server.await.unwrap();
}

#[tokio::test]
async fn login_disconnect_surfaces_reason_unmodified() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut link = ServerLink::new(stream);

        accept_login(&mut link).await;
        link.write_frame(0x00, &disconnect_payload(r#"{"text":"You are banned"}"#))
            .await;
    });

    let sink = Arc::new(MemorySink::new());
    let mut connection = new_connection(addr, sink.clone());

    let err = connection.connect(&test_credential()).await.unwrap_err();
    match err {
        MlinkError::Protocol(ProtocolError::Disconnected { reason }) => {
            assert_eq!(reason, "You are banned");
        }
        other => panic!("ожидался Disconnected, получено: {:?}", other),
    }
    assert!(connection.is_closed());

    let events = sink.snapshot();
    assert!(events.contains(&SessionEvent::Disconnected {
        reason: "You are banned".into()
    }));

    server.await.unwrap();
}

#[tokio::test]
async fn configuration_answers_keep_alive_and_ping() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut link = ServerLink::new(stream);

        accept_login(&mut link).await;
        link.write_frame(0x02, &login_success_payload()).await;
        let (id, _) = link.read_frame().await;
        assert_eq!(id, 0x03);

        // keep-alive: клиент обязан вернуть тот же идентификатор
        link.write_frame(0x04, &keep_alive_payload(0x55AA_55AA_1234_5678))
            .await;
        let (id, payload) = link.read_frame().await;
        assert_eq!(id, 0x04);
        assert_eq!(payload, keep_alive_payload(0x55AA_55AA_1234_5678).to_vec());

        // ping: pong с тем же id
        link.write_frame(0x05, &77i32.to_be_bytes()).await;
        let (id, payload) = link.read_frame().await;
        assert_eq!(id, 0x05);
        assert_eq!(payload, 77i32.to_be_bytes().to_vec());

        // known packs: пустой список в ответ
        link.write_frame(0x0E, &[0x00]).await;
        let (id, payload) = link.read_frame().await;
        assert_eq!(id, 0x07);
        assert_eq!(payload, vec![0x00]);

        // registry data поглощается без ответа, цикл не прерывается
        link.write_frame(0x07, &vec![0xEE; 2048]).await;

        link.write_frame(0x03, &[]).await;
        let (id, _) = link.read_frame().await;
        assert_eq!(id, 0x03);
    });

    let sink = Arc::new(MemorySink::new());
    let mut connection = new_connection(addr, sink);

    let outcome = connection.connect(&test_credential()).await.unwrap();
    assert!(matches!(outcome, ConnectOutcome::Play));
    assert_eq!(connection.keepalive().last_id(), 0x55AA_55AA_1234_5678);

    server.await.unwrap();
}

#[tokio::test]
async fn compression_threshold_applies_to_both_directions() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut link = ServerLink::new(stream);

        accept_login(&mut link).await;

        // Порог объявляется в старом формате, дальше — двойной
        link.write_frame(0x03, &set_compression_payload(16)).await;
        link.enable_compression(16);

        link.write_frame(0x02, &login_success_payload()).await;

        let (id, _) = link.read_frame().await;
        assert_eq!(id, 0x03);

        // keep-alive больше порога не бывает, а registry — бывает
        link.write_frame(0x07, &vec![0x42; 4096]).await;

        link.write_frame(0x03, &[]).await;
        let (id, _) = link.read_frame().await;
        assert_eq!(id, 0x03);
    });

    let sink = Arc::new(MemorySink::new());
    let mut connection = new_connection(addr, sink.clone());

    let outcome = connection.connect(&test_credential()).await.unwrap();
    assert!(matches!(outcome, ConnectOutcome::Play));

    let events = sink.snapshot();
    assert!(events.contains(&SessionEvent::CompressionEnabled { threshold: 16 }));

    server.await.unwrap();
}

#[tokio::test]
async fn unexpected_login_packet_is_protocol_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut link = ServerLink::new(stream);

        accept_login(&mut link).await;
        // Пакет 0x42 в LOGIN не существует
        link.write_frame(0x42, b"garbage").await;
    });

    let sink = Arc::new(MemorySink::new());
    let mut connection = new_connection(addr, sink);

    let err = connection.connect(&test_credential()).await.unwrap_err();
    assert!(matches!(
        err,
        MlinkError::Protocol(ProtocolError::UnexpectedPacket {
            state: ConnectionState::Login,
            id: 0x42,
        })
    ));

    server.await.unwrap();
}
