/*
[INPUT]:  Local WebSocket server scenarios
[OUTPUT]: Test results for the tungstenite transport and multiplexer over a socket
[POS]:    Integration tests - WebSocket
[UPDATE]: When WebSocket transport changes
*/

use std::sync::Arc;
use std::time::Duration;

use chartfeed_adapter::{
    ControlMessage, Multiplexer, MultiplexerConfig, StreamMessage, StreamTransport,
    TransportEvent, WsTransport,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_test::assert_ok;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

/// Accept one client, report its first text frame, then push `frames`
async fn spawn_server(frames: Vec<String>) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = assert_ok!(TcpListener::bind("127.0.0.1:0").await);
    let addr = assert_ok!(listener.local_addr());
    let (received_tx, received_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let Ok((socket, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
            return;
        };

        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                let _ = received_tx.send(text.as_str().to_string());
                break;
            }
        }

        for frame in frames {
            if ws.send(Message::Text(frame.into())).await.is_err() {
                return;
            }
        }

        // Hold the socket until the client goes away
        while let Some(Ok(_)) = ws.next().await {}
    });

    (format!("ws://{addr}"), received_rx)
}

#[test]
fn test_transport_default_url() {
    let transport = WsTransport::default();
    assert_eq!(transport.url(), "wss://stream.binance.com/stream");
}

#[tokio::test]
async fn test_transport_exchanges_text_frames() {
    let frame = json!({ "result": null, "id": 7 }).to_string();
    let (url, mut received) = spawn_server(vec![frame.clone()]).await;

    let transport = WsTransport::new(url);
    let mut connection = assert_ok!(transport.connect().await);
    assert_ok!(connection.outbound.send("hello".to_string()).await);

    let first = assert_ok!(tokio::time::timeout(WAIT, received.recv()).await);
    assert_eq!(first.as_deref(), Some("hello"));

    let event = assert_ok!(tokio::time::timeout(WAIT, connection.inbound.recv()).await);
    match event {
        Some(TransportEvent::Message(text)) => assert_eq!(text, frame),
        other => panic!("unexpected transport event: {other:?}"),
    }
}

#[tokio::test]
async fn test_multiplexer_over_websocket() {
    let kline = json!({
        "stream": "btcusdt@kline_1m",
        "data": {
            "e": "kline",
            "s": "BTCUSDT",
            "k": { "t": 1_700_000_000_000u64, "i": "1m", "o": "100", "h": "110", "l": "95", "c": "105", "v": "12" }
        }
    })
    .to_string();
    let (url, mut received) = spawn_server(vec![kline]).await;

    let mux = Multiplexer::new(Arc::new(WsTransport::new(url)), MultiplexerConfig::default());
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    mux.add_subscriber("chart", vec!["btcusdt@kline_1m".to_string()])
        .subscribe(move |message: &StreamMessage| {
            let _ = seen_tx.send(message.clone());
        });

    mux.subscribe_params(vec!["btcusdt@kline_1m".to_string()]);
    mux.connect();

    let request = assert_ok!(tokio::time::timeout(WAIT, received.recv()).await)
        .expect("server saw a frame");
    let control = assert_ok!(ControlMessage::parse(&request));
    assert_eq!(control.params, vec!["btcusdt@kline_1m".to_string()]);

    let message = assert_ok!(tokio::time::timeout(WAIT, seen_rx.recv()).await)
        .expect("subscriber called");
    assert_eq!(message.stream(), Some("btcusdt@kline_1m"));
    assert_eq!(message.event_type(), Some("kline"));

    let state = mux.symbol_state("BTCUSDT").expect("symbol state");
    assert_eq!(state["k"]["c"], "105");

    mux.shutdown();
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() {
    let listener = assert_ok!(TcpListener::bind("127.0.0.1:0").await);
    let addr = assert_ok!(listener.local_addr());
    drop(listener);

    let transport = WsTransport::new(format!("ws://{addr}"));
    assert!(transport.connect().await.is_err());
}
