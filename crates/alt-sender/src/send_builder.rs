//! Signs a finished message and produces wire bytes.

use std::sync::Arc;

use chain_sol::{VersionedMessage, VersionedTransaction};
use tracing::debug;

use crate::error::AltResult;
use crate::signer::TransactionSigner;

#[derive(Clone)]
pub struct SendTransactionBuilder {
    signer: Arc<dyn TransactionSigner>,
}

impl SendTransactionBuilder {
    pub fn new(signer: Arc<dyn TransactionSigner>) -> Self {
        Self { signer }
    }

    /// Wrap `message` in a transaction envelope, sign the serialized message
    /// with the wallet key and return the signed wire bytes.
    pub async fn build(&self, message: VersionedMessage) -> AltResult<Vec<u8>> {
        let mut tx = VersionedTransaction::new_unsigned(message);
        let message_data = tx.message_data()?;

        let signature = self.signer.sign(&message_data).await?;
        tx.add_signature(&self.signer.pubkey(), signature)?;

        let wire = tx.serialize()?;
        debug!(
            bytes = wire.len(),
            signatures = tx.signatures.len(),
            "built signed transaction"
        );
        Ok(wire)
    }
}
