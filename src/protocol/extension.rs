//! Extension names and the decoded extension message sum type.

use super::block_sync::BlockSyncMessage;
use super::consensus::TendermintMessage;
use super::transaction_sync::TransactionSyncMessage;
use super::ProtocolError;

/// Block synchronization extension name.
pub const BLOCK_SYNC_EXTENSION: &str = "block-propagation";

/// Transaction propagation extension name.
pub const TRANSACTION_SYNC_EXTENSION: &str = "transaction-propagation";

/// Tendermint consensus extension name.
pub const CONSENSUS_EXTENSION: &str = "tendermint";

/// Version advertised for every extension during negotiation.
pub const EXTENSION_VERSION: u64 = 0;

/// A decoded payload of one of the known extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtensionMessage {
    BlockSync(BlockSyncMessage),
    TransactionSync(TransactionSyncMessage),
    Tendermint(TendermintMessage),
}

impl ExtensionMessage {
    /// Name of the extension carrying this message.
    pub fn extension(&self) -> &'static str {
        match self {
            ExtensionMessage::BlockSync(_) => BLOCK_SYNC_EXTENSION,
            ExtensionMessage::TransactionSync(_) => TRANSACTION_SYNC_EXTENSION,
            ExtensionMessage::Tendermint(_) => CONSENSUS_EXTENSION,
        }
    }

    /// Encode the payload carried inside an `Unencrypted` envelope.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            ExtensionMessage::BlockSync(message) => message.encode(),
            ExtensionMessage::TransactionSync(message) => Ok(message.encode()),
            ExtensionMessage::Tendermint(message) => Ok(message.encode()),
        }
    }

    /// Decode a payload received under `extension`.
    pub fn decode(extension: &str, bytes: &[u8]) -> Result<Self, ProtocolError> {
        match extension {
            BLOCK_SYNC_EXTENSION => Ok(ExtensionMessage::BlockSync(BlockSyncMessage::decode(
                bytes,
            )?)),
            TRANSACTION_SYNC_EXTENSION => Ok(ExtensionMessage::TransactionSync(
                TransactionSyncMessage::decode(bytes)?,
            )),
            CONSENSUS_EXTENSION => Ok(ExtensionMessage::Tendermint(TendermintMessage::decode(
                bytes,
            )?)),
            other => Err(ProtocolError::UnknownExtension(other.to_string())),
        }
    }
}

impl From<BlockSyncMessage> for ExtensionMessage {
    fn from(message: BlockSyncMessage) -> Self {
        ExtensionMessage::BlockSync(message)
    }
}

impl From<TransactionSyncMessage> for ExtensionMessage {
    fn from(message: TransactionSyncMessage) -> Self {
        ExtensionMessage::TransactionSync(message)
    }
}

impl From<TendermintMessage> for ExtensionMessage {
    fn from(message: TendermintMessage) -> Self {
        ExtensionMessage::Tendermint(message)
    }
}
