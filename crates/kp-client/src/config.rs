//! Client configuration: endpoint selection and timing knobs.
//!
//! Values come from defaults, an optional RON file, and environment
//! overrides, in that order of increasing precedence.

use std::{env, fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Environment variable selecting [`Environment`].
pub const ENV_VAR: &str = "KPMACROS_ENV";
/// Environment variable overriding the resolved endpoint URL.
pub const URL_VAR: &str = "KPMACROS_URL";
/// Environment variable supplying the production origin.
pub const ORIGIN_VAR: &str = "KPMACROS_ORIGIN";

/// Build environment discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Talk to a backend on the loopback development endpoint.
    #[default]
    Development,
    /// Talk to the backend that serves the editor, on the same origin.
    Production,
}

impl Environment {
    /// Parse the value of [`ENV_VAR`].
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }
}

/// Connection and timing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Which endpoint rule applies.
    pub environment: Environment,
    /// Endpoint used in development.
    pub dev_url: String,
    /// Page origin (`http(s)://host[:port]`) used to derive the production endpoint.
    pub origin: Option<String>,
    /// Path of the WebSocket endpoint on the production origin.
    pub ws_path: String,
    /// Explicit endpoint; wins over both environment rules.
    pub url: Option<String>,
    /// First reconnect delay; doubles on each failed attempt.
    pub backoff_base_ms: u64,
    /// Upper bound for the reconnect delay.
    pub backoff_max_ms: u64,
    /// Reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Pause between two queued frames.
    pub drain_interval_ms: u64,
    /// Per-action cooldown for [`crate::Session::send`].
    pub send_cooldown_ms: u64,
    /// Default timeout for [`crate::Session::request_once`].
    pub request_timeout_ms: u64,
    /// Timeout for a single connect attempt.
    pub connect_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            dev_url: "ws://127.0.0.1:8080/ws".to_string(),
            origin: None,
            ws_path: "/ws".to_string(),
            url: None,
            backoff_base_ms: 1000,
            backoff_max_ms: 30_000,
            max_reconnect_attempts: 10,
            drain_interval_ms: 10,
            send_cooldown_ms: 300,
            request_timeout_ms: 10_000,
            connect_timeout_ms: 5000,
        }
    }
}

impl ClientConfig {
    /// Load a RON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(ron::from_str(&text)?)
    }

    /// Apply [`ENV_VAR`], [`URL_VAR`] and [`ORIGIN_VAR`] overrides.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(v) = env::var(ENV_VAR) {
            self.environment = Environment::parse(&v)
                .ok_or_else(|| Error::Config(format!("invalid {ENV_VAR} value '{v}'")))?;
        }
        if let Ok(v) = env::var(URL_VAR) {
            self.url = Some(v);
        }
        if let Ok(v) = env::var(ORIGIN_VAR) {
            self.origin = Some(v);
        }
        Ok(self)
    }

    /// Resolve the endpoint URL.
    ///
    /// # Errors
    /// Fails if the chosen URL does not parse, or if production is selected
    /// without an origin.
    pub fn endpoint(&self) -> Result<String> {
        if let Some(url) = &self.url {
            return Ok(parse_ws(url)?.to_string());
        }
        match self.environment {
            Environment::Development => Ok(parse_ws(&self.dev_url)?.to_string()),
            Environment::Production => {
                let origin = self
                    .origin
                    .as_deref()
                    .ok_or_else(|| Error::Config("production endpoint needs an origin".into()))?;
                derive_from_origin(origin, &self.ws_path)
            }
        }
    }

    /// Reconnect delay before attempt number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self
            .backoff_base_ms
            .saturating_mul(factor)
            .min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }

    /// Pause between two queued frames.
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    /// Per-action send cooldown.
    pub fn send_cooldown(&self) -> Duration {
        Duration::from_millis(self.send_cooldown_ms)
    }

    /// Default request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Timeout for one connect attempt.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Parse a URL and require a WebSocket scheme.
fn parse_ws(s: &str) -> Result<Url> {
    let url = Url::parse(s).map_err(|e| Error::Config(format!("invalid url '{s}': {e}")))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(Error::Config(format!("unsupported scheme '{other}' in '{s}'"))),
    }
}

/// `http://host:port` becomes `ws://host:port{path}`, `https` becomes `wss`.
fn derive_from_origin(origin: &str, path: &str) -> Result<String> {
    let mut url =
        Url::parse(origin).map_err(|e| Error::Config(format!("invalid origin '{origin}': {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(Error::Config(format!("unsupported origin scheme '{other}'"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::Config(format!("cannot derive endpoint from '{origin}'")))?;
    url.set_path(path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}
