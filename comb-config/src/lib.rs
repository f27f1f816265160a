//! Loader for Comb configuration with YAML + environment overlays.
//!
//! Precedence, lowest first: built-in defaults, YAML sources in the order
//! they were added, then `COMB__`-prefixed environment variables
//! (`COMB__BROWSER__PROFILE=alice` sets `browser.profile`). After merging,
//! every string value has `${VAR}` placeholders expanded, recursively.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CombConfig {
    pub version: Option<String>,
    pub browser: BrowserSection,
    pub input: InputSection,
    pub harvest: HarvestSection,
    pub diagnostics: DiagnosticsSection,
    pub logging: LoggingSection,
}

/// The remote browser's script-execution command endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub endpoint: String,
    pub command_path: String,
    pub profile: String,
    pub probe_timeout_ms: u64,
    pub action_timeout_ms: u64,
    pub api_key: Option<String>,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:7701".into(),
            command_path: "command".into(),
            profile: "default".into(),
            probe_timeout_ms: 8_000,
            action_timeout_ms: 12_000,
            api_key: None,
        }
    }
}

/// The OS-level input-injection service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputSection {
    /// Falls back to `browser.endpoint` when unset.
    pub endpoint: Option<String>,
    pub command_path: String,
    /// WebSocket used when the command endpoint rejects a wheel event.
    pub socket_url: Option<String>,
    /// Falls back to `browser.profile` when unset.
    pub session_id: Option<String>,
    pub move_steps: u32,
    pub click_delay_ms: u64,
    pub dwell_min_ms: u64,
    pub dwell_max_ms: u64,
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            command_path: "command".into(),
            socket_url: None,
            session_id: None,
            move_steps: 3,
            click_delay_ms: 40,
            dwell_min_ms: 80,
            dwell_max_ms: 220,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestSection {
    pub target_url: Option<String>,
    pub max_rounds: Option<u32>,
    /// Seed for the pacing RNG; unset means entropy.
    pub seed: Option<u64>,
    pub expand_replies: bool,
    pub max_reply_clicks: usize,
    pub activate_comments: bool,
    pub selectors: SelectorOverrides,
}

impl Default for HarvestSection {
    fn default() -> Self {
        Self {
            target_url: None,
            max_rounds: None,
            seed: None,
            expand_replies: true,
            max_reply_clicks: 2,
            activate_comments: true,
            selectors: SelectorOverrides::default(),
        }
    }
}

/// Per-site selector replacements. Unset lists keep the built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SelectorOverrides {
    pub root: Option<Vec<String>>,
    pub item: Option<Vec<String>>,
    pub end_marker: Option<Vec<String>>,
    pub empty_state: Option<Vec<String>>,
    pub show_more: Option<Vec<String>>,
    pub header_total: Option<Vec<String>>,
    pub count_badge: Option<Vec<String>>,
    pub captcha: Option<Vec<String>>,
    pub media_viewer: Option<Vec<String>>,
    pub comment_entry: Option<Vec<String>>,
    pub empty_keywords: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiagnosticsSection {
    pub highlight: bool,
    pub capture_on_click: bool,
    pub journal_capacity: usize,
}

impl Default for DiagnosticsSection {
    fn default() -> Self {
        Self {
            highlight: true,
            capture_on_click: false,
            journal_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub dir: Option<String>,
    pub format: String,
    pub emit_stderr: bool,
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            dir: None,
            format: "text".into(),
            emit_stderr: true,
            filter: "info".into(),
        }
    }
}

impl CombConfig {
    pub fn input_endpoint(&self) -> &str {
        self.input
            .endpoint
            .as_deref()
            .unwrap_or(self.browser.endpoint.as_str())
    }

    pub fn session_id(&self) -> &str {
        self.input
            .session_id
            .as_deref()
            .unwrap_or(self.browser.profile.as_str())
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct CombConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    env_prefix: &'static str,
}

impl Default for CombConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl CombConfigLoader {
    /// Start with defaults; `COMB__` environment overrides are applied last.
    ///
    /// ```
    /// use comb_config::CombConfigLoader;
    ///
    /// let config = CombConfigLoader::new()
    ///     .with_yaml_str("version: '1'\nbrowser:\n  profile: alice")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.browser.profile, "alice");
    /// assert_eq!(config.browser.probe_timeout_ms, 8000);
    /// assert_eq!(config.session_id(), "alice");
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
            env_prefix: "COMB",
        }
    }

    /// Attach a YAML/TOML/JSON file that must exist.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent, so deployments can rely purely on env.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Allow tests to merge inline YAML snippets.
    ///
    /// ```
    /// use comb_config::CombConfigLoader;
    ///
    /// let cfg = CombConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// harvest:
    ///   max_rounds: 40
    ///   selectors:
    ///     root: [".comments"]
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.harvest.max_rounds, Some(40));
    /// assert_eq!(cfg.harvest.selectors.root.as_deref(), Some(&[".comments".to_string()][..]));
    /// assert!(cfg.harvest.selectors.item.is_none());
    /// assert!(cfg.harvest.expand_replies);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into [`CombConfig`].
    pub fn load(self) -> Result<CombConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(self.env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: CombConfig =
            serde_json::from_value(v).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        if typed.browser.profile.trim().is_empty() {
            return Err(ConfigError::Message("browser.profile must not be empty".into()));
        }
        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("FOO", Some("bar"), || {
            let mut v = json!("prefix-${FOO}-suffix");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_in_array_and_object() {
        temp_env::with_vars([("HOST", Some("10.0.0.2")), ("PORT", Some("7701"))], || {
            let mut v = json!([
                "ws://$HOST",
                { "endpoint": "http://${HOST}:${PORT}" },
                42,
                true,
                null
            ]);
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!(["ws://10.0.0.2", { "endpoint": "http://10.0.0.2:7701" }, 42, true, null])
            );
        });
    }

    #[test]
    fn expands_recursively_across_env_values() {
        temp_env::with_vars(
            [
                ("BAZ", Some("qux")),
                ("BAR", Some("mid-${BAZ}")),
                ("FOO", Some("start-${BAR}-end")),
            ],
            || {
                let mut v = json!("X=${FOO}");
                expand_env_in_value(&mut v);
                assert_eq!(v, json!("X=start-mid-qux-end"));
            },
        );
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${DOES_NOT_EXIST_COMB}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${DOES_NOT_EXIST_COMB}"));
    }

    #[test]
    fn empty_sources_yield_defaults() {
        let cfg = CombConfigLoader::new().load().unwrap();
        assert_eq!(cfg.browser.endpoint, "http://127.0.0.1:7701");
        assert_eq!(cfg.input_endpoint(), "http://127.0.0.1:7701");
        assert_eq!(cfg.harvest.max_reply_clicks, 2);
        assert_eq!(cfg.diagnostics.journal_capacity, 64);
        assert_eq!(cfg.logging.format, "text");
    }
}
