//! WebSocket transport against an in-process tokio-tungstenite server


use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use station_link::error::ErrorKind;
use station_link::protocol::Endpoint;
use station_link::station::{CommandRelay, LinkSettings, RetryPolicy, StationRunner};
use station_link::transport::{Connector, Session, TransportError, WsConnector};
use station_link::SystemClock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type ServerStream = WebSocketStream<TcpStream>;

/// Accept WebSocket clients on a local port, one handler call per client
async fn spawn_server<F, Fut>(handler: F) -> String
where
    F: Fn(ServerStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                tokio::spawn(handler(ws));
            }
        }
    });

    format!("ws://{addr}/rpi/RPI1")
}

fn connector() -> WsConnector {
    WsConnector::new(Duration::from_secs(5))
}

#[tokio::test]
async fn test_text_round_trip_and_clean_close() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let url = spawn_server(move |mut ws| {
        let seen_tx = seen_tx.clone();
        async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = seen_tx.send(text);
            }
            let _ = ws
                .send(Message::Text(r#"{"command":"move","direction":"left"}"#.into()))
                .await;
            let _ = ws.close(None).await;
        }
    })
    .await;

    let mut session = connector().connect(&Endpoint::new(url)).await.unwrap();
    session
        .send_text(r#"{"type":"register","rpi_id":"RPI1"}"#.to_string())
        .await
        .unwrap();

    assert_eq!(
        session.recv().await.unwrap(),
        r#"{"command":"move","direction":"left"}"#
    );
    assert!(matches!(session.recv().await, Err(TransportError::Closed)));
    assert_eq!(
        seen_rx.recv().await.unwrap(),
        r#"{"type":"register","rpi_id":"RPI1"}"#
    );
    session.close().await;
}

#[tokio::test]
async fn test_binary_frames_are_delivered_as_text() {
    let url = spawn_server(|mut ws| async move {
        let _ = ws
            .send(Message::Binary(br#"{"command":"stop"}"#.to_vec()))
            .await;
        tokio::time::sleep(Duration::from_secs(1)).await;
    })
    .await;

    let mut session = connector().connect(&Endpoint::new(url)).await.unwrap();
    assert_eq!(session.recv().await.unwrap(), r#"{"command":"stop"}"#);
    session.close().await;
}

#[tokio::test]
async fn test_recv_timeout_returns_none_when_idle() {
    let url = spawn_server(|ws| async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        drop(ws);
    })
    .await;

    let mut session = connector().connect(&Endpoint::new(url)).await.unwrap();
    let polled = session
        .recv_timeout(Duration::from_millis(20))
        .await
        .unwrap();
    assert!(polled.is_none());
    session.close().await;
}

#[tokio::test]
async fn test_refused_connection_is_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let error = connector()
        .connect(&Endpoint::new(format!("ws://{addr}/rpi/RPI1")))
        .await
        .err()
        .expect("nothing is listening");
    assert_eq!(error.kind(), ErrorKind::Connect);
}

#[tokio::test]
async fn test_stalled_handshake_times_out() {
    // accepts TCP but never answers the upgrade request
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let error = WsConnector::new(Duration::from_millis(100))
        .connect(&Endpoint::new(format!("ws://{addr}/rpi/RPI1")))
        .await
        .err()
        .expect("handshake must time out");
    assert!(matches!(error, TransportError::ConnectTimeout { .. }));
    assert_eq!(error.kind(), ErrorKind::Connect);
    drop(listener);
}

#[tokio::test]
async fn test_relay_station_registers_and_acknowledges_over_websocket() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<Value>();
    let url = spawn_server(move |mut ws| {
        let seen_tx = seen_tx.clone();
        async move {
            if let Some(Ok(Message::Text(register))) = ws.next().await {
                let _ = seen_tx.send(serde_json::from_str(&register).unwrap());
            }
            let _ = ws.send(Message::Text("not json".into())).await;
            let _ = ws
                .send(Message::Text(r#"{"command":"move","direction":"left"}"#.into()))
                .await;
            if let Some(Ok(Message::Text(ack))) = ws.next().await {
                let _ = seen_tx.send(serde_json::from_str(&ack).unwrap());
            }
            // hold the session open until the client goes away
            while let Some(Ok(_)) = ws.next().await {}
        }
    })
    .await;

    let settings = LinkSettings {
        station_id: "RPI1".to_string(),
        endpoints: vec![Endpoint::new(url)],
        policy: RetryPolicy::new(Duration::from_secs(5)),
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut runner = StationRunner::new(
        settings,
        connector(),
        CommandRelay::new("RPI1"),
        Arc::new(SystemClock),
        shutdown_rx,
    )
    .unwrap();
    let handle = tokio::spawn(async move { runner.run().await });

    let register = seen_rx.recv().await.unwrap();
    assert_eq!(register["type"], "register");
    assert_eq!(register["rpi_id"], "RPI1");
    assert_eq!(register["status"], "ready");

    let ack = seen_rx.recv().await.unwrap();
    assert_eq!(ack["status"], "success");
    assert_eq!(
        ack["message"],
        "Command 'move' executed with direction 'left'"
    );

    shutdown_tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("runner must stop on shutdown")
        .unwrap();
    assert!(result.is_ok());
}
