//! Creates and extends lookup tables on chain.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chain_sol::{
    create_lookup_table, extend_lookup_table, AddressLookupTableAccount, Blockhash, Instruction,
    LegacyMessage, Pubkey, VersionedMessage, MAX_ADDRESSES_PER_EXTEND,
};
use tracing::{debug, info, instrument};

use crate::error::{AltError, AltResult};
use crate::network::{BlockhashProvider, SolanaRpc};
use crate::send_builder::SendTransactionBuilder;

/// Mutates on-chain table state. No retries happen at this layer.
#[async_trait]
pub trait LookupTableWriter: Send + Sync {
    /// Create a table seeded with `keys` and return it as currently visible.
    async fn create(
        &self,
        keys: &[Pubkey],
        authority: &Pubkey,
        payer: &Pubkey,
    ) -> AltResult<AddressLookupTableAccount>;

    /// Append `addresses` to an existing table.
    ///
    /// Callers must skip addresses the table already holds.
    async fn extend(
        &self,
        table: &Pubkey,
        authority: &Pubkey,
        payer: &Pubkey,
        addresses: &[Pubkey],
    ) -> AltResult<()>;
}

/// Writer that builds, signs and broadcasts real transactions.
pub struct RpcLookupTableWriter {
    rpc: Arc<dyn SolanaRpc>,
    blockhash: BlockhashProvider,
    send_builder: SendTransactionBuilder,
}

impl RpcLookupTableWriter {
    pub fn new(rpc: Arc<dyn SolanaRpc>, send_builder: SendTransactionBuilder) -> Self {
        Self {
            blockhash: BlockhashProvider::new(rpc.clone()),
            rpc,
            send_builder,
        }
    }

    async fn submit(
        &self,
        instructions: &[Instruction],
        payer: &Pubkey,
        blockhash: &Blockhash,
    ) -> AltResult<String> {
        let message = LegacyMessage::compile(instructions, payer, blockhash)?;
        let wire = self.send_builder.build(VersionedMessage::Legacy(message)).await?;
        self.rpc
            .send_raw(STANDARD.encode(wire), SystemTime::now())
            .await
    }
}

fn check_batch(len: usize) -> AltResult<()> {
    if len > MAX_ADDRESSES_PER_EXTEND {
        return Err(AltError::TooManyAccountKeys(len));
    }
    Ok(())
}

#[async_trait]
impl LookupTableWriter for RpcLookupTableWriter {
    #[instrument(skip_all, fields(keys = keys.len()))]
    async fn create(
        &self,
        keys: &[Pubkey],
        authority: &Pubkey,
        payer: &Pubkey,
    ) -> AltResult<AddressLookupTableAccount> {
        check_batch(keys.len())?;

        let blockhash = self.blockhash.latest().await?;
        let slot = self.rpc.get_slot().await?;

        let (create_ix, table) = create_lookup_table(authority, payer, slot)?;
        let mut instructions = vec![create_ix];
        if !keys.is_empty() {
            instructions.push(extend_lookup_table(&table, authority, payer, keys)?);
        }

        let txid = self.submit(&instructions, payer, &blockhash).await?;
        info!(%table, slot, %txid, "ALT: create transaction sent");

        match self.rpc.get_address_lookup_table(&table).await? {
            Some(account) => Ok(account),
            None => {
                debug!(%table, "ALT: new table not visible yet");
                Ok(AddressLookupTableAccount::new(table, Vec::new()))
            }
        }
    }

    #[instrument(skip_all, fields(table = %table, addresses = addresses.len()))]
    async fn extend(
        &self,
        table: &Pubkey,
        authority: &Pubkey,
        payer: &Pubkey,
        addresses: &[Pubkey],
    ) -> AltResult<()> {
        check_batch(addresses.len())?;

        let blockhash = self.blockhash.latest().await?;
        let ix = extend_lookup_table(table, authority, payer, addresses)?;
        let txid = self.submit(&[ix], payer, &blockhash).await?;
        info!(%txid, "ALT: extend transaction sent");
        Ok(())
    }
}
