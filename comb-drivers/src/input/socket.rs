//! Persistent WebSocket to the input service, used when the direct wheel
//! command fails.
//!
//! There is no background reader: each request sends its envelope and then
//! reads frames inline until the response with the same `request_id`
//! arrives or the action timeout elapses. Unrelated frames are discarded.
use comb_common::{CombError, Result};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::page::geometry::FocusPoint;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Serialize)]
pub struct CommandEnvelope<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub request_id: String,
    pub session_id: &'a str,
    pub data: CommandData,
}

#[derive(Debug, Serialize)]
pub struct CommandData {
    pub command_type: &'static str,
    pub action: &'static str,
    pub parameters: ScrollParameters,
}

#[derive(Debug, Serialize)]
pub struct ScrollParameters {
    pub operation_type: &'static str,
    #[serde(rename = "deltaY")]
    pub delta_y: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<ScrollTarget>,
}

#[derive(Debug, Serialize)]
pub struct ScrollTarget {
    pub coordinates: Coordinates,
}

#[derive(Debug, Serialize)]
pub struct Coordinates {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub data: ResponseData,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponseData {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<Value>,
}

impl<'a> CommandEnvelope<'a> {
    pub fn scroll(session_id: &'a str, delta_y: i64, target: Option<FocusPoint>) -> Self {
        let target = target.map(|p| {
            let (x, y) = p.rounded();
            ScrollTarget {
                coordinates: Coordinates { x, y },
            }
        });
        Self {
            kind: "command",
            request_id: Uuid::new_v4().to_string(),
            session_id,
            data: CommandData {
                command_type: "user_action",
                action: "operation",
                parameters: ScrollParameters {
                    operation_type: "scroll",
                    delta_y,
                    target,
                },
            },
        }
    }
}

pub struct SocketChannel {
    url: String,
    session_id: String,
    timeout: Duration,
    conn: Mutex<Option<WsStream>>,
}

impl SocketChannel {
    pub fn new(url: impl Into<String>, session_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            session_id: session_id.into(),
            timeout,
            conn: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Scroll by `delta_y`, optionally anchored at `target`.
    pub async fn scroll(&self, delta_y: i64, target: Option<FocusPoint>) -> Result<()> {
        let envelope = CommandEnvelope::scroll(&self.session_id, delta_y, target);
        let data = self.request(&envelope).await?;
        if data.success {
            return Ok(());
        }
        let reason = match data.error {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => "socket command reported failure".to_string(),
        };
        Err(CombError::Transport(format!("socket scroll: {reason}")))
    }

    async fn request(&self, envelope: &CommandEnvelope<'_>) -> Result<ResponseData> {
        let text = serde_json::to_string(envelope).map_err(|e| CombError::Decode(e.to_string()))?;
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            let (ws, _) = timeout(self.timeout, connect_async(self.url.as_str()))
                .await
                .map_err(|_| CombError::Timeout(format!("socket connect to {}", self.url)))?
                .map_err(|e| CombError::Transport(format!("socket connect: {e}")))?;
            debug!(target: "input.socket", url = %self.url, "socket connected");
            *guard = Some(ws);
        }
        let Some(ws) = guard.as_mut() else {
            return Err(CombError::Transport("socket unavailable".into()));
        };
        let outcome = exchange(ws, text, &envelope.request_id, self.timeout).await;
        if let Err(e) = &outcome {
            warn!(target: "input.socket", request_id = %envelope.request_id, error = %e, "dropping socket");
            *guard = None;
        }
        outcome
    }
}

async fn exchange(ws: &mut WsStream, text: String, request_id: &str, limit: Duration) -> Result<ResponseData> {
    ws.send(Message::Text(text.into()))
        .await
        .map_err(|e| CombError::Transport(format!("socket send: {e}")))?;
    let deadline = Instant::now() + limit;
    loop {
        let frame = timeout_at(deadline, ws.next())
            .await
            .map_err(|_| CombError::Timeout(format!("socket response {request_id}")))?;
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => return Err(CombError::Transport(format!("socket read: {e}"))),
            None => return Err(CombError::Transport("socket closed".into())),
        };
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => return Err(CombError::Transport("socket closed by peer".into())),
            _ => continue,
        };
        let Ok(resp) = serde_json::from_str::<ResponseEnvelope>(&text) else {
            continue;
        };
        if resp.kind == "response" && resp.request_id.as_deref() == Some(request_id) {
            return Ok(resp.data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_shape() {
        let env = CommandEnvelope::scroll("sess-1", 640, Some(FocusPoint::new(900.4, 411.6)));
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["type"], "command");
        assert_eq!(v["session_id"], "sess-1");
        assert_eq!(v["data"]["command_type"], "user_action");
        assert_eq!(v["data"]["action"], "operation");
        assert_eq!(
            v["data"]["parameters"],
            json!({"operation_type": "scroll", "deltaY": 640, "target": {"coordinates": {"x": 900, "y": 412}}})
        );
        assert!(Uuid::parse_str(v["request_id"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn target_is_omitted_without_focus() {
        let env = CommandEnvelope::scroll("s", -300, None);
        let v = serde_json::to_value(&env).unwrap();
        assert!(v["data"]["parameters"].get("target").is_none());
    }

    #[test]
    fn request_ids_are_unique() {
        let a = CommandEnvelope::scroll("s", 1, None);
        let b = CommandEnvelope::scroll("s", 1, None);
        assert_ne!(a.request_id, b.request_id);
    }
}
