//! Entry point: decode, recompile, sign and broadcast one transaction.

use std::sync::Arc;
use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chain_sol::{VersionedMessage, VersionedTransaction};
use tracing::{info, instrument};

use crate::compiler::{LegacyMessageCompiler, MessageV0Compiler};
use crate::config::AltConfig;
use crate::dispatcher::{ChunkedLookupTableDispatcher, LookupTableDispatcher};
use crate::error::AltResult;
use crate::network::{BlockhashProvider, SolanaRpc};
use crate::send_builder::SendTransactionBuilder;
use crate::signer::TransactionSigner;
use crate::split::AccountKeysSplitProvider;
use crate::writer::RpcLookupTableWriter;

/// Sends a transaction with its account keys moved into a new lookup table.
///
/// Holds no state between sends; every call creates its own table.
pub struct AltTransactionService {
    rpc: Arc<dyn SolanaRpc>,
    v0_compiler: MessageV0Compiler,
    legacy_compiler: LegacyMessageCompiler,
    send_builder: SendTransactionBuilder,
}

impl AltTransactionService {
    /// Wire the live pipeline. The signer's key is table authority, table
    /// payer and fee payer.
    pub fn new(
        rpc: Arc<dyn SolanaRpc>,
        signer: Arc<dyn TransactionSigner>,
        split_provider: Arc<dyn AccountKeysSplitProvider>,
        config: AltConfig,
    ) -> AltResult<Self> {
        config.validate()?;
        let wallet = signer.pubkey();
        let send_builder = SendTransactionBuilder::new(signer);
        let writer = Arc::new(RpcLookupTableWriter::new(rpc.clone(), send_builder.clone()));
        let dispatcher = Arc::new(ChunkedLookupTableDispatcher::new(
            writer,
            rpc.clone(),
            wallet,
            wallet,
            config.clone(),
        ));
        Ok(Self::assemble(rpc, send_builder, dispatcher, split_provider, config))
    }

    /// Same as [`new`](Self::new) with a caller-supplied dispatcher.
    pub fn with_dispatcher(
        rpc: Arc<dyn SolanaRpc>,
        signer: Arc<dyn TransactionSigner>,
        dispatcher: Arc<dyn LookupTableDispatcher>,
        split_provider: Arc<dyn AccountKeysSplitProvider>,
        config: AltConfig,
    ) -> AltResult<Self> {
        config.validate()?;
        Ok(Self::assemble(
            rpc,
            SendTransactionBuilder::new(signer),
            dispatcher,
            split_provider,
            config,
        ))
    }

    fn assemble(
        rpc: Arc<dyn SolanaRpc>,
        send_builder: SendTransactionBuilder,
        dispatcher: Arc<dyn LookupTableDispatcher>,
        split_provider: Arc<dyn AccountKeysSplitProvider>,
        config: AltConfig,
    ) -> Self {
        let blockhash = BlockhashProvider::new(rpc.clone());
        Self {
            v0_compiler: MessageV0Compiler::new(
                dispatcher.clone(),
                split_provider.clone(),
                blockhash.clone(),
                config,
            ),
            legacy_compiler: LegacyMessageCompiler::new(dispatcher, split_provider, blockhash),
            rpc,
            send_builder,
        }
    }

    /// Recompile and sign `raw_transaction`, returning the wire bytes that
    /// [`send`](Self::send) would broadcast.
    pub async fn build_for_send(&self, raw_transaction: &[u8]) -> AltResult<Vec<u8>> {
        let tx = VersionedTransaction::deserialize(raw_transaction)?;
        let compiled = match &tx.message {
            VersionedMessage::V0(message) => self.v0_compiler.compile(message).await?,
            VersionedMessage::Legacy(message) => self.legacy_compiler.compile(message).await?,
        };
        self.send_builder.build(VersionedMessage::V0(compiled)).await
    }

    #[instrument(skip_all, fields(bytes = raw_transaction.len()))]
    pub async fn send(&self, raw_transaction: &[u8]) -> AltResult<String> {
        let wire = self.build_for_send(raw_transaction).await?;
        let txid = self
            .rpc
            .send_raw(STANDARD.encode(&wire), SystemTime::now())
            .await?;
        info!(%txid, bytes = wire.len(), "ALT: transaction sent");
        Ok(txid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::FixedLookupTableDispatcher;
    use crate::error::AltError;
    use crate::fixture::FixtureRpc;
    use crate::signer::KeypairSigner;
    use crate::split::SignerAndProgramSplitProvider;
    use chain_sol::{AccountMeta, AddressLookupTableAccount, Instruction, LegacyMessage, Pubkey};

    fn key(b: u8) -> Pubkey {
        Pubkey::new([b; 32])
    }

    fn raw_legacy(payer: Pubkey) -> Vec<u8> {
        let ix = Instruction {
            program_id: key(50),
            accounts: vec![
                AccountMeta::new(payer, true),
                AccountMeta::new(key(2), false),
                AccountMeta::new_readonly(key(3), false),
            ],
            data: vec![1, 2, 3],
        };
        let message = LegacyMessage::compile(&[ix], &payer, &[0; 32]).unwrap();
        VersionedTransaction::new_unsigned(VersionedMessage::Legacy(message))
            .serialize()
            .unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let config = AltConfig {
            chunk_size: 0,
            ..AltConfig::default()
        };
        let result = AltTransactionService::new(
            Arc::new(FixtureRpc::new()),
            Arc::new(KeypairSigner::from_seed([1; 32])),
            Arc::new(SignerAndProgramSplitProvider),
            config,
        );
        assert!(matches!(result, Err(AltError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn rejects_undecodable_transaction() {
        let service = AltTransactionService::new(
            Arc::new(FixtureRpc::new()),
            Arc::new(KeypairSigner::from_seed([1; 32])),
            Arc::new(SignerAndProgramSplitProvider),
            AltConfig::default(),
        )
        .unwrap();

        let err = service.send(&[0xff, 0x01]).await.unwrap_err();
        assert!(matches!(err, AltError::Sol(_)));
    }

    #[tokio::test]
    async fn injected_dispatcher_drives_legacy_send() {
        let rpc = Arc::new(FixtureRpc::new());
        let signer = Arc::new(KeypairSigner::from_seed([1; 32]));
        let payer = signer.pubkey();
        let table = AddressLookupTableAccount::new(key(200), vec![key(2), key(3)]);
        let dispatcher = Arc::new(FixedLookupTableDispatcher::new(Some(table), vec![]));
        let service = AltTransactionService::with_dispatcher(
            rpc.clone(),
            signer,
            dispatcher.clone(),
            Arc::new(SignerAndProgramSplitProvider),
            AltConfig::default(),
        )
        .unwrap();

        let txid = service.send(&raw_legacy(payer)).await.unwrap();

        let sent = rpc.sent_transactions().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(txid, bs58::encode(sent[0].signatures[0]).into_string());
        let VersionedMessage::V0(message) = &sent[0].message else {
            panic!("expected a v0 message");
        };
        assert_eq!(message.static_account_keys, vec![payer, key(50)]);
        assert_eq!(message.num_lookup_keys(), 2);
        assert_eq!(dispatcher.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn broadcast_failure_propagates() {
        let rpc = Arc::new(FixtureRpc::new());
        let signer = Arc::new(KeypairSigner::from_seed([1; 32]));
        let payer = signer.pubkey();
        let table = AddressLookupTableAccount::new(key(200), vec![key(2), key(3)]);
        let service = AltTransactionService::with_dispatcher(
            rpc.clone(),
            signer,
            Arc::new(FixedLookupTableDispatcher::new(Some(table), vec![])),
            Arc::new(SignerAndProgramSplitProvider),
            AltConfig::default(),
        )
        .unwrap();
        rpc.set_send_failure(Some("node is behind".into())).await;

        let err = service.send(&raw_legacy(payer)).await.unwrap_err();
        assert_eq!(err.to_string(), "network error: node is behind");
    }
}
