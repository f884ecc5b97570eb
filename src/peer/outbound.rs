//! Outbound send path.
//!
//! [`Outbound`] is the capability to put records on the wire for one
//! session. It is cheap to clone; the Byzantine injector holds one. Whole
//! records are written under a single writer lock so concurrent senders
//! never interleave bytes.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::session::Session;
use super::PeerError;
use crate::protocol::{Envelope, ExtensionMessage, SignedEnvelope};

/// Send capability for one session.
#[derive(Clone)]
pub struct Outbound {
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    session: Arc<Session>,
}

impl Outbound {
    pub(crate) fn new(writer: OwnedWriteHalf, session: Arc<Session>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Some(writer))),
            session,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Write one complete record and wait for it to drain.
    pub async fn write_record(&self, record: &[u8]) -> Result<(), PeerError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(PeerError::Closed)?;
        writer.write_all(record).await?;
        writer.flush().await?;
        trace!(bytes = record.len(), "Record written");
        Ok(())
    }

    /// Send an unsigned handshake envelope.
    pub async fn send_envelope(&self, envelope: &Envelope) -> Result<(), PeerError> {
        debug!(protocol_id = %envelope.protocol_id(), "Sending envelope");
        self.write_record(&envelope.encode()).await
    }

    /// Sign an envelope with the session nonce and send it.
    pub async fn send_signed(&self, envelope: Envelope) -> Result<(), PeerError> {
        let nonce = self.session.nonce().ok_or(PeerError::NotEstablished)?;
        let record = SignedEnvelope::seal(envelope, &nonce)?.encode();
        self.write_record(&record).await
    }

    /// Send an extension payload.
    pub async fn send(
        &self,
        extension: &str,
        payload: Vec<u8>,
        need_encryption: bool,
    ) -> Result<(), PeerError> {
        if !self.session.is_established() {
            return Err(PeerError::NotEstablished);
        }
        if need_encryption {
            return Err(PeerError::Unsupported("encrypted extension messages"));
        }
        debug!(extension, bytes = payload.len(), "Sending extension message");
        self.send_signed(Envelope::Unencrypted {
            extension: extension.to_string(),
            data: payload,
        })
        .await
    }

    /// Encode and send a typed extension message.
    pub async fn send_message(&self, message: &ExtensionMessage) -> Result<(), PeerError> {
        let payload = message.encode()?;
        self.send(message.extension(), payload, false).await
    }

    /// Close the write side. Later sends fail with [`PeerError::Closed`].
    pub async fn shutdown(&self) -> Result<(), PeerError> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }
}
