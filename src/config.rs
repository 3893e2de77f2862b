//! Session configuration.
//!
//! A session is described either by explicit arguments or by a TOML
//! table with the recognized keys below; any unrecognized key is a hard
//! configuration error. Validation happens eagerly, at construction.

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_OPERATION_TIMEOUT_MS;
use crate::constants::DEFAULT_PORT;
use crate::constants::DEFAULT_SESSION_TIMEOUT_MS;
use crate::error::KeeperError;
use crate::hosts::LoadBalancing;
use crate::paths::normalize_path;

/// One coordination-service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect over TLS.
    #[serde(default)]
    pub secure: bool,
}

impl NodeConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            secure: false,
        }
    }

    /// `host:port` form used for resolution and logging.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which connection implementation backs the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Implementation {
    /// The real protocol client, supplied through the
    /// [`Connect`](crate::api::Connect) seam.
    #[default]
    #[serde(rename = "real")]
    Real,
    /// The in-memory double, for tests.
    #[serde(rename = "in-memory-test")]
    InMemory,
}

impl FromStr for Implementation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "real" => Ok(Implementation::Real),
            "in-memory-test" => Ok(Implementation::InMemory),
            _ => Err(format!("unknown implementation: {s}")),
        }
    }
}

/// Full session configuration. Immutable once the session is built; a
/// new session derived via `start_new_session` reuses it as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeeperConfig {
    /// Candidate endpoints, tried in selector order.
    #[serde(default, rename = "node")]
    pub nodes: Vec<NodeConfig>,

    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Bound on every dispatched request.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Credential string sent at session establishment.
    #[serde(default)]
    pub identity: String,

    /// Path prefix under which all operations are rooted. Must start
    /// with `/`; a trailing `/` is stripped. The prefix node must exist.
    #[serde(default)]
    pub root: String,

    #[serde(default)]
    pub implementation: Implementation,

    #[serde(default)]
    pub load_balancing: LoadBalancing,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            session_timeout_ms: default_session_timeout_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
            identity: String::new(),
            root: String::new(),
            implementation: Implementation::default(),
            load_balancing: LoadBalancing::default(),
        }
    }
}

impl KeeperConfig {
    /// Configuration for the in-memory implementation, mainly for tests.
    pub fn in_memory() -> Self {
        Self {
            implementation: Implementation::InMemory,
            ..Self::default()
        }
    }

    /// Configuration for the real implementation with explicit endpoints.
    pub fn with_nodes(nodes: Vec<NodeConfig>) -> Self {
        Self {
            nodes,
            ..Self::default()
        }
    }

    /// Parse from a TOML table. Unrecognized keys are rejected.
    pub fn from_toml_str(content: &str) -> Result<Self, KeeperError> {
        let mut config: KeeperConfig =
            toml::from_str(content).map_err(|err| KeeperError::InvalidConfig {
                message: format!("failed to parse configuration: {err}"),
            })?;
        config.normalize()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, KeeperError> {
        let content = std::fs::read_to_string(path).map_err(|err| KeeperError::InvalidConfig {
            message: format!("failed to read configuration file {}: {err}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate and canonicalize in place. Raised errors are
    /// configuration errors, never deferred to dispatch.
    pub fn normalize(&mut self) -> Result<(), KeeperError> {
        if self.session_timeout_ms == 0 {
            return Err(KeeperError::InvalidConfig {
                message: "session_timeout_ms must be non-zero".into(),
            });
        }
        if self.operation_timeout_ms == 0 {
            return Err(KeeperError::InvalidConfig {
                message: "operation_timeout_ms must be non-zero".into(),
            });
        }
        if !self.root.is_empty() {
            if !self.root.starts_with('/') {
                return Err(KeeperError::InvalidConfig {
                    message: format!("root path must start with '/', got '{}'", self.root),
                });
            }
            self.root = normalize_path(&self.root, true)?;
            // A prefix of exactly "/" is no prefix at all.
            if self.root == "/" {
                self.root.clear();
            }
        }
        if self.implementation == Implementation::Real && self.nodes.is_empty() {
            return Err(KeeperError::InvalidConfig {
                message: "no hosts passed in configuration".into(),
            });
        }
        Ok(())
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_session_timeout_ms() -> u64 {
    DEFAULT_SESSION_TIMEOUT_MS
}

fn default_operation_timeout_ms() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_MS
}
