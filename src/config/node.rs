//! Configuration subsections.
//!
//! The node-under-test address (`node.*`), the simulated peer's advertised
//! session parameters (`peer.*`) and the Byzantine injector (`byzantine.*`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::{BLOCK_SYNC_EXTENSION, TRANSACTION_SYNC_EXTENSION};

/// Default node host.
const DEFAULT_NODE_HOST: &str = "127.0.0.1";

/// Default node port.
const DEFAULT_NODE_PORT: u16 = 3485;

/// Default network id advertised in Sync1.
const DEFAULT_NETWORK_ID: &str = "tc";

/// Default port advertised in Sync1.
const DEFAULT_PEER_PORT: u16 = 3486;

/// Default handshake completion timeout (10 s).
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Default socket read chunk size.
const DEFAULT_READ_BUFFER: usize = 8192;

/// Default delay before the injector's follow-up requests.
const DEFAULT_REQUEST_DELAY_MS: u64 = 1000;

// ============================================================================
// Node Under Test
// ============================================================================

/// Address of the node under test (`node.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// Host name or address (`node.host`). Defaults to 127.0.0.1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// TCP port (`node.port`). Defaults to 3485.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl NodeConfig {
    /// Get the host, using default if not configured.
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_NODE_HOST)
    }

    /// Get the port, using default if not configured.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_NODE_PORT)
    }

    /// `host:port` for connecting.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host(), self.port())
    }

    pub(super) fn merge(&mut self, other: NodeConfig) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
    }
}

// ============================================================================
// Simulated Peer
// ============================================================================

/// Session parameters of the simulated peer (`peer.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerConfig {
    /// Network id sent in Sync1 (`peer.network_id`). Defaults to "tc".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,

    /// Port advertised in Sync1 (`peer.port`). Defaults to 3486.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Extensions to negotiate (`peer.extensions`).
    /// Defaults to block and transaction propagation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,

    /// Handshake timeout in milliseconds (`peer.handshake_timeout_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handshake_timeout_ms: Option<u64>,

    /// Socket read chunk size (`peer.read_buffer`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_buffer: Option<usize>,
}

impl PeerConfig {
    pub fn network_id(&self) -> &str {
        self.network_id.as_deref().unwrap_or(DEFAULT_NETWORK_ID)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PEER_PORT)
    }

    /// Extensions to negotiate, in order.
    pub fn extensions(&self) -> Vec<String> {
        match &self.extensions {
            Some(list) => list.clone(),
            None => vec![
                BLOCK_SYNC_EXTENSION.to_string(),
                TRANSACTION_SYNC_EXTENSION.to_string(),
            ],
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(
            self.handshake_timeout_ms
                .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT_MS),
        )
    }

    pub fn read_buffer(&self) -> usize {
        self.read_buffer.unwrap_or(DEFAULT_READ_BUFFER).max(1)
    }

    pub(super) fn merge(&mut self, other: PeerConfig) {
        if other.network_id.is_some() {
            self.network_id = other.network_id;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.extensions.is_some() {
            self.extensions = other.extensions;
        }
        if other.handshake_timeout_ms.is_some() {
            self.handshake_timeout_ms = other.handshake_timeout_ms;
        }
        if other.read_buffer.is_some() {
            self.read_buffer = other.read_buffer;
        }
    }
}

// ============================================================================
// Byzantine Injector
// ============================================================================

/// Injector settings (`byzantine.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ByzantineConfig {
    /// Hex validator secret used to forge votes (`byzantine.secret`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Delay before follow-up requests (`byzantine.request_delay_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
}

impl ByzantineConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms.unwrap_or(DEFAULT_REQUEST_DELAY_MS))
    }

    pub(super) fn merge(&mut self, other: ByzantineConfig) {
        if other.secret.is_some() {
            self.secret = other.secret;
        }
        if other.request_delay_ms.is_some() {
            self.request_delay_ms = other.request_delay_ms;
        }
    }
}
