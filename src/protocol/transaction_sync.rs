//! Transaction propagation extension messages.
//!
//! The payload is a list of encoded transactions, relayed untouched.

use super::ProtocolError;
use crate::codec::{Rlp, RlpStream};

/// A batch of encoded transactions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionSyncMessage(pub Vec<Vec<u8>>);

impl TransactionSyncMessage {
    pub fn new(transactions: Vec<Vec<u8>>) -> Self {
        Self(transactions)
    }

    pub fn transactions(&self) -> &[Vec<u8>] {
        &self.0
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut s = RlpStream::new();
        s.append_raw_list(&self.0);
        s.out()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let rlp = Rlp::new(bytes);
        rlp.ensure_exact()?;
        Ok(Self(rlp.as_raw_list()?))
    }
}
