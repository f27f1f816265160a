//! The `POST {action, ...}` command endpoint shared by the browser execution
//! channel and the input-injection service.
use comb_common::{CombError, Result};
use comb_http::{Auth, HttpClient, HttpError, RequestOpts};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Reply envelope. Services disagree on `ok` vs `success` and `body` vs
/// `data`, so both spellings are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommandReply {
    pub ok: Option<bool>,
    pub success: Option<bool>,
    pub error: Option<Value>,
    pub body: Option<Value>,
    pub data: Option<Value>,
}

impl CommandReply {
    pub fn succeeded(&self) -> bool {
        self.ok.or(self.success).unwrap_or(false) && self.error_message().is_none()
    }

    pub fn error_message(&self) -> Option<String> {
        match &self.error {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Object(o)) => Some(
                o.get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| Value::Object(o.clone()).to_string()),
            ),
            Some(other) => Some(other.to_string()),
        }
    }

    /// `Ok(payload)` or the service-reported error.
    pub fn into_payload(self, action: &str) -> Result<Value> {
        if !self.succeeded() {
            let msg = self
                .error_message()
                .unwrap_or_else(|| "command reported failure".to_string());
            return Err(CombError::Transport(format!("{action}: {msg}")));
        }
        Ok(self.data.or(self.body).unwrap_or(Value::Null))
    }
}

#[derive(Clone, Debug)]
pub struct CommandChannel {
    http: HttpClient,
    path: String,
    api_key: Option<String>,
}

impl CommandChannel {
    pub fn new(endpoint: &str, path: &str) -> Result<Self> {
        // Keep any base path: `Url::join` replaces the last segment otherwise.
        let base = if endpoint.ends_with('/') {
            endpoint.to_string()
        } else {
            format!("{endpoint}/")
        };
        let http = HttpClient::new(&base).map_err(map_http_error)?.with_retries(0);
        Ok(Self {
            http,
            path: path.trim_start_matches('/').to_string(),
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    /// Send one command and unwrap its payload.
    pub async fn send(&self, action: &str, body: &Value, timeout: Duration) -> Result<Value> {
        let opts = RequestOpts {
            timeout: Some(timeout),
            retries: Some(0),
            auth: self.api_key.as_deref().map(Auth::Bearer),
            ..Default::default()
        };
        let reply: CommandReply = self
            .http
            .post_json_opts(&self.path, body, opts)
            .await
            .map_err(map_http_error)?;
        reply.into_payload(action)
    }
}

pub fn map_http_error(err: HttpError) -> CombError {
    match err {
        HttpError::Timeout(ms) => CombError::Timeout(format!("command endpoint after {ms} ms")),
        HttpError::Decode(msg, snippet) => CombError::Decode(format!("{msg}: {snippet}")),
        other => CombError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reply(v: Value) -> CommandReply {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn accepts_both_success_spellings() {
        assert!(reply(json!({"ok": true})).succeeded());
        assert!(reply(json!({"success": true, "data": 1})).succeeded());
        assert!(!reply(json!({})).succeeded());
    }

    #[test]
    fn error_field_overrides_ok_flag() {
        let r = reply(json!({"ok": true, "error": "profile busy"}));
        assert!(!r.succeeded());
        let err = r.into_payload("mouse:move").unwrap_err();
        assert!(err.to_string().contains("mouse:move: profile busy"));
    }

    #[test]
    fn payload_prefers_data_over_body() {
        let v = reply(json!({"success": true, "data": {"a": 1}, "body": {"b": 2}}))
            .into_payload("x")
            .unwrap();
        assert_eq!(v, json!({"a": 1}));
        let v = reply(json!({"ok": true, "body": [1, 2]})).into_payload("x").unwrap();
        assert_eq!(v, json!([1, 2]));
    }

    #[test]
    fn structured_errors_use_message() {
        let r = reply(json!({"success": false, "error": {"message": "no such profile", "code": 4}}));
        assert_eq!(r.error_message().as_deref(), Some("no such profile"));
    }
}
