use comb_common::observability::OpsJournal;
use comb_common::CombError;
use comb_drivers::behavioral::{BehavioralEngine, Span};
use comb_drivers::command::CommandChannel;
use comb_drivers::input::gateway::{InputSettings, SystemInputGateway};
use comb_drivers::input::socket::SocketChannel;
use comb_drivers::input::{InputGateway, InteractionContext};
use comb_drivers::page::exec::BrowserChannel;
use comb_drivers::page::geometry::FocusPoint;
use comb_drivers::page::selectors::CommentSelectors;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Accepts one connection, forwards every request to `seen`, and answers
/// with whatever `reply` returns for it.
async fn spawn_socket_server<F>(reply: F) -> (String, mpsc::UnboundedReceiver<Value>)
where
    F: Fn(&Value) -> Vec<Value> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let req: Value = serde_json::from_str(&text).unwrap();
            let _ = tx.send(req.clone());
            for out in reply(&req) {
                if ws.send(Message::Text(out.to_string().into())).await.is_err() {
                    return;
                }
            }
        }
    });
    (format!("ws://{addr}"), rx)
}

fn answer(req: &Value, success: bool, error: Option<&str>) -> Value {
    json!({"type": "response", "request_id": req["request_id"], "data": {"success": success, "error": error}})
}

#[tokio::test]
async fn matches_response_by_request_id() {
    let (url, mut seen) = spawn_socket_server(|req| {
        vec![
            json!({"type": "event", "data": {"kind": "cursor"}}),
            json!({"type": "response", "request_id": "someone-else", "data": {"success": false}}),
            answer(req, true, None),
        ]
    })
    .await;
    let socket = SocketChannel::new(url, "sess-9", Duration::from_secs(2));

    socket
        .scroll(640, Some(FocusPoint::new(900.0, 400.0)))
        .await
        .unwrap();

    let req = seen.recv().await.unwrap();
    assert_eq!(req["type"], "command");
    assert_eq!(req["session_id"], "sess-9");
    assert_eq!(req["data"]["parameters"]["deltaY"], 640);
    assert_eq!(req["data"]["parameters"]["target"]["coordinates"], json!({"x": 900, "y": 400}));
}

#[tokio::test]
async fn connection_is_reused_across_requests() {
    let (url, mut seen) = spawn_socket_server(|req| vec![answer(req, true, None)]).await;
    let socket = SocketChannel::new(url, "s", Duration::from_secs(2));

    socket.scroll(100, None).await.unwrap();
    socket.scroll(-100, None).await.unwrap();

    let first = seen.recv().await.unwrap();
    let second = seen.recv().await.unwrap();
    assert_ne!(first["request_id"], second["request_id"]);
}

#[tokio::test]
async fn reported_failure_is_transport_error() {
    let (url, _seen) = spawn_socket_server(|req| vec![answer(req, false, Some("no window"))]).await;
    let socket = SocketChannel::new(url, "s", Duration::from_secs(2));

    let err = socket.scroll(100, None).await.unwrap_err();
    assert!(matches!(err, CombError::Transport(ref m) if m.contains("no window")));
}

#[tokio::test]
async fn silence_times_out() {
    let (url, _seen) = spawn_socket_server(|_| Vec::new()).await;
    let socket = SocketChannel::new(url, "s", Duration::from_millis(200));

    let err = socket.scroll(100, None).await.unwrap_err();
    assert!(matches!(err, CombError::Timeout(_)));
}

#[tokio::test]
async fn gateway_falls_back_to_socket_when_wheel_command_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/command"))
        .and(body_partial_json(json!({"action": "browser:execute"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"ok": true, "body": {"result": {"captcha": false, "mediaViewer": false, "host": "", "hit": null}}}),
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/command"))
        .and(body_partial_json(json!({"action": "mouse:wheel"})))
        .respond_with(ResponseTemplate::new(502).set_body_json(json!({"error": "bad gateway"})))
        .expect(1)
        .mount(&server)
        .await;

    let (url, mut seen) = spawn_socket_server(|req| vec![answer(req, true, None)]).await;
    let commands = CommandChannel::new(&server.uri(), "command").unwrap();
    let exec = Arc::new(BrowserChannel::new(commands.clone(), "p1", Duration::from_secs(2)));
    let journal = Arc::new(OpsJournal::default());
    let gw = SystemInputGateway::new(
        commands,
        exec,
        CommentSelectors::default(),
        Arc::new(BehavioralEngine::seeded(5)),
        journal.clone(),
        InputSettings {
            dwell: Span::new(0, 0),
            highlight: false,
            ..Default::default()
        },
    )
    .with_socket(Some(SocketChannel::new(url, "p1", Duration::from_secs(2))));

    gw.wheel(700, None, InteractionContext::Scroll).await.unwrap();

    let req = seen.recv().await.unwrap();
    assert_eq!(req["data"]["parameters"]["deltaY"], 700);
    assert_eq!(journal.count_of("socket:scroll"), 1);
    assert_eq!(journal.count_of("mouse:wheel"), 0);
}
