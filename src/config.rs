//! Configuration management for Fabrica Relay

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub matrix: MatrixConfig,
    /// Accept `Authorization: Bearer <token>` in addition to `?token=`
    #[serde(default)]
    pub enable_bearer_auth: bool,
    /// Global tokens, valid for every endpoint
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub endpoints: HashMap<String, EndpointConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatrixConfig {
    pub homeserver_url: String,
    pub access_token: String,
}

/// A single named webhook target
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub template: String,
    pub room_id: String,
    /// Allowed HTTP methods, matched exactly (`"GET"`, `"POST"`). Empty means
    /// the endpoint accepts nothing.
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub format: PayloadFormat,
    /// Send as `m.notice` instead of `m.text`
    #[serde(default)]
    pub notice: bool,
    #[serde(default)]
    pub auth_token: Option<AuthToken>,
}

impl EndpointConfig {
    /// Whether `method` is in this endpoint's allow-list
    pub fn allows(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }
}

/// How a POST body is interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum PayloadFormat {
    #[serde(rename = "JSON", alias = "json")]
    Json,
    #[default]
    #[serde(rename = "plain", alias = "PLAIN")]
    Plain,
}

/// Endpoint-scoped token: one secret or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AuthToken {
    Single(String),
    Many(Vec<String>),
}

impl AuthToken {
    pub fn as_slice(&self) -> &[String] {
        match self {
            AuthToken::Single(token) => std::slice::from_ref(token),
            AuthToken::Many(tokens) => tokens,
        }
    }
}

const SUPPORTED_METHODS: [&str; 2] = ["GET", "POST"];

impl Config {
    /// Load configuration from relay.toml, or the path in RELAY_CONFIG
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load configuration from a specific path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Try to load from file first
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;

            let config = Self::parse(&content)
                .with_context(|| format!("Failed to parse config from {}", path.display()))?;
            return Ok(config);
        }

        // Fall back to environment variables only
        Self::from_env()
    }

    /// Parse a TOML document, expand secrets and validate endpoints
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.expand_env_vars();
        config.validate();
        Ok(config)
    }

    /// Load configuration entirely from environment variables.
    ///
    /// Endpoints cannot be expressed this way, so the result only serves
    /// global-token deployments that add endpoints on the next reload.
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            server: ServerConfig {
                host: std::env::var("WEBHOOK_HOST").unwrap_or_else(|_| default_host()),
                port: std::env::var("WEBHOOK_PORT")
                    .unwrap_or_else(|_| default_port().to_string())
                    .parse()
                    .unwrap_or(default_port()),
            },
            matrix: MatrixConfig {
                homeserver_url: std::env::var("MATRIX_HOMESERVER_URL")
                    .context("MATRIX_HOMESERVER_URL environment variable required")?,
                access_token: std::env::var("MATRIX_ACCESS_TOKEN")
                    .context("MATRIX_ACCESS_TOKEN environment variable required")?,
            },
            enable_bearer_auth: std::env::var("ENABLE_BEARER_AUTH")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            tokens: std::env::var("WEBHOOK_TOKENS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            endpoints: HashMap::new(),
        })
    }

    /// Look up an endpoint by exact name
    pub fn endpoint(&self, name: &str) -> Option<&EndpointConfig> {
        self.endpoints.get(name)
    }

    /// Expand ${VAR} patterns in secret fields
    fn expand_env_vars(&mut self) {
        self.matrix.access_token = expand_env(&self.matrix.access_token);
        for token in &mut self.tokens {
            *token = expand_env(token);
        }
        for endpoint in self.endpoints.values_mut() {
            match endpoint.auth_token {
                Some(AuthToken::Single(ref mut token)) => *token = expand_env(token),
                Some(AuthToken::Many(ref mut tokens)) => {
                    for token in tokens {
                        *token = expand_env(token);
                    }
                }
                None => {}
            }
        }
    }

    fn validate(&self) {
        for (name, endpoint) in &self.endpoints {
            if endpoint.methods.is_empty() {
                warn!("Endpoint '{}' has no allowed methods and will reject every request", name);
            }
            for method in &endpoint.methods {
                if !SUPPORTED_METHODS.contains(&method.as_str()) {
                    warn!("Endpoint '{}' lists unsupported method '{}'", name, method);
                }
            }
        }
    }
}

fn config_path() -> String {
    std::env::var("RELAY_CONFIG").unwrap_or_else(|_| "relay.toml".to_string())
}

/// Expand ${VAR} patterns in a string
fn expand_env(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    // Find all ${VAR} patterns
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + end];
        result.push_str(&rest[..start]);
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }

    result.push_str(rest);
    result
}

/// Process-wide configuration snapshot.
///
/// Request handlers take an `Arc<Config>` at the start of a request and keep
/// it until the response is written. Reloads swap the whole snapshot.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<Config>>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<Config> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the snapshot; in-flight requests keep the old one
    pub fn replace(&self, config: Config) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(config);
    }
}
