//! Mimic Configuration System
//!
//! Loads configuration from YAML files with a cascading priority system:
//! 1. `./mimic.yaml` (current directory - highest priority)
//! 2. `~/.config/mimic/mimic.yaml` (user config directory)
//! 3. `/etc/mimic/mimic.yaml` (system - lowest priority)
//!
//! Values from higher priority files override those from lower priority files.
//!
//! # YAML Structure
//!
//! ```yaml
//! node:
//!   host: "127.0.0.1"
//!   port: 3485
//! peer:
//!   network_id: "tc"
//!   port: 3486
//!   extensions: ["block-propagation", "transaction-propagation"]
//!   handshake_timeout_ms: 10000
//!   read_buffer: 8192
//! byzantine:
//!   secret: "0x..."
//!   request_delay_ms: 1000
//! ```

mod node;

use crate::identity::{Identity, IdentityError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use node::{ByzantineConfig, NodeConfig, PeerConfig};

/// Default config filename.
const CONFIG_FILENAME: &str = "mimic.yaml";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Node under test (`node.*`).
    #[serde(default)]
    pub node: NodeConfig,

    /// Simulated peer session (`peer.*`).
    #[serde(default)]
    pub peer: PeerConfig,

    /// Byzantine injector (`byzantine.*`).
    #[serde(default)]
    pub byzantine: ByzantineConfig,
}

impl Config {
    /// Create a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the standard search paths.
    ///
    /// Returns a tuple of (config, paths_loaded) where paths_loaded contains
    /// the paths that were successfully loaded.
    pub fn load() -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let search_paths = Self::search_paths();
        Self::load_from_paths(&search_paths)
    }

    /// Load configuration from specific paths.
    ///
    /// Paths are processed in order, with later paths overriding earlier ones.
    pub fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let mut config = Config::default();
        let mut loaded_paths = Vec::new();

        for path in paths {
            if path.exists() {
                let file_config = Self::load_file(path)?;
                config.merge(file_config);
                loaded_paths.push(path.clone());
            }
        }

        Ok((config, loaded_paths))
    }

    /// Load configuration from a single file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the standard search paths in priority order (lowest to highest).
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // System config (lowest priority)
        paths.push(PathBuf::from("/etc/mimic").join(CONFIG_FILENAME));

        // User config directory
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("mimic").join(CONFIG_FILENAME));
        }

        // Current directory (highest priority)
        paths.push(PathBuf::from(".").join(CONFIG_FILENAME));

        paths
    }

    /// Merge another configuration into this one.
    ///
    /// Values from `other` override values in `self` when present.
    pub fn merge(&mut self, other: Config) {
        self.node.merge(other.node);
        self.peer.merge(other.peer);
        self.byzantine.merge(other.byzantine);
    }

    /// Load the injector's validator identity, if a secret is configured.
    pub fn byzantine_identity(&self) -> Result<Option<Identity>, ConfigError> {
        match &self.byzantine.secret {
            Some(secret) => Ok(Some(Identity::from_secret_str(secret)?)),
            None => Ok(None),
        }
    }

    /// Serialize this configuration to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
