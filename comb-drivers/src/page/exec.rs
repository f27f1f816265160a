use async_trait::async_trait;
use comb_common::{CombError, Result};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

use crate::command::CommandChannel;

/// Runs a self-contained script in the remote page and returns its JSON value.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn execute(&self, script: &str) -> Result<Value>;

    /// Best-effort diagnostic screenshot; returns the encoded image if the
    /// channel supports it.
    async fn capture_screenshot(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Execute `script` and decode its value into `T`.
pub async fn run_script<T: DeserializeOwned>(exec: &dyn ScriptExecutor, script: &str) -> Result<T> {
    let value = exec.execute(script).await?;
    serde_json::from_value(value).map_err(|e| CombError::Decode(e.to_string()))
}

/// Script execution over the browser service's command endpoint.
#[derive(Clone, Debug)]
pub struct BrowserChannel {
    commands: CommandChannel,
    profile: String,
    timeout: Duration,
}

impl BrowserChannel {
    pub fn new(commands: CommandChannel, profile: impl Into<String>, timeout: Duration) -> Self {
        Self {
            commands,
            profile: profile.into(),
            timeout,
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }
}

/// Some services wrap the script value as `{result: ...}` or `{value: ...}`.
fn unwrap_script_value(payload: Value) -> Result<Value> {
    match payload {
        Value::Object(mut obj) if obj.len() <= 2 && (obj.contains_key("result") || obj.contains_key("value")) => {
            if let Some(err) = obj.get("exceptionDetails").or_else(|| obj.get("error")) {
                if !err.is_null() {
                    return Err(CombError::Script(err.to_string()));
                }
            }
            Ok(obj
                .remove("result")
                .or_else(|| obj.remove("value"))
                .unwrap_or(Value::Null))
        }
        other => Ok(other),
    }
}

#[async_trait]
impl ScriptExecutor for BrowserChannel {
    async fn execute(&self, script: &str) -> Result<Value> {
        let body = json!({
            "action": "browser:execute",
            "payload": { "profile": self.profile, "script": script },
        });
        let payload = self
            .commands
            .send("browser:execute", &body, self.timeout)
            .await?;
        unwrap_script_value(payload)
    }

    async fn capture_screenshot(&self) -> Result<Option<String>> {
        let body = json!({
            "action": "browser:screenshot",
            "payload": { "profile": self.profile },
        });
        let payload = self
            .commands
            .send("browser:screenshot", &body, self.timeout)
            .await?;
        Ok(match payload {
            Value::String(s) => Some(s),
            Value::Object(obj) => obj
                .get("image")
                .or_else(|| obj.get("data"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
    }
}
