//! Rebuilds a message so that every offloadable key is loaded from one
//! freshly populated lookup table.

use std::sync::Arc;

use chain_sol::{
    compute_budget::{bump_compute_unit_limit, encode_compute_unit_limit},
    AddressLookupTableAccount, CompiledInstruction, LegacyMessage, MessageAddressTableLookup,
    MessageHeader, MessageV0, Pubkey, SolError, MAX_ACCOUNT_KEYS,
};
use tracing::{debug, info, instrument};

use crate::config::AltConfig;
use crate::dispatcher::LookupTableDispatcher;
use crate::error::{AltError, AltResult};
use crate::network::BlockhashProvider;
use crate::split::{AccountKeyUsage, AccountKeysSplitProvider};

/// Header for the single fee-payer model: one signer, and every non-writable
/// static key counted as readonly unsigned.
fn single_signer_header(static_keys: &[(Pubkey, bool)]) -> AltResult<MessageHeader> {
    let readonly = static_keys.iter().filter(|(_, writable)| !writable).count();
    Ok(MessageHeader {
        num_required_signatures: 1,
        num_readonly_signed_accounts: 0,
        num_readonly_unsigned_accounts: u8::try_from(readonly)
            .map_err(|_| AltError::TooManyAccountKeys(static_keys.len()))?,
    })
}

/// Selection of table entries a message loads, split by writability.
#[derive(Debug, Default)]
struct LookupSelection {
    /// Table positions in first-seen order, with the merged writable flag.
    entries: Vec<(u8, bool)>,
}

impl LookupSelection {
    fn observe(&mut self, position: u8, writable: bool) {
        match self.entries.iter_mut().find(|(p, _)| *p == position) {
            Some((_, w)) => *w |= writable,
            None => self.entries.push((position, writable)),
        }
    }

    fn into_lookup(self, table: Pubkey) -> MessageAddressTableLookup {
        let (writable, readonly): (Vec<_>, Vec<_>) =
            self.entries.into_iter().partition(|(_, w)| *w);
        MessageAddressTableLookup {
            account_key: table,
            writable_indexes: writable.into_iter().map(|(p, _)| p).collect(),
            readonly_indexes: readonly.into_iter().map(|(p, _)| p).collect(),
        }
    }
}

/// Recompiles v0 messages, including ones that already reference tables.
pub struct MessageV0Compiler {
    dispatcher: Arc<dyn LookupTableDispatcher>,
    split_provider: Arc<dyn AccountKeysSplitProvider>,
    blockhash: BlockhashProvider,
    config: AltConfig,
}

impl MessageV0Compiler {
    pub fn new(
        dispatcher: Arc<dyn LookupTableDispatcher>,
        split_provider: Arc<dyn AccountKeysSplitProvider>,
        blockhash: BlockhashProvider,
        config: AltConfig,
    ) -> Self {
        Self {
            dispatcher,
            split_provider,
            blockhash,
            config,
        }
    }

    #[instrument(skip_all, fields(
        static_keys = message.static_account_keys.len(),
        lookups = message.address_table_lookups.len()
    ))]
    pub async fn compile(&self, message: &MessageV0) -> AltResult<MessageV0> {
        let existing = self.dispatcher.resolve_existing_tables(message).await?;
        let old_all_keys = message.resolve_account_keys(&existing)?;

        let usages = AccountKeyUsage::from_v0(message, &old_all_keys);
        let split = self.split_provider.split_static_account_keys(&usages);
        let final_static = split.static_pubkeys();
        let header = single_signer_header(&split.static_keys)?;
        debug!(
            resolved = old_all_keys.len(),
            static_keys = final_static.len(),
            offload = split.lookup_keys.len(),
            "ALT: keys re-split"
        );

        let table = self
            .dispatcher
            .dispatch(&final_static, &split.lookup_keys)
            .await?
            .ok_or(AltError::KeyNotFoundInStaticOrAnyAlt)?;

        let recent_blockhash = self.blockhash.latest().await?;

        let old_key = |index: u8| -> AltResult<Pubkey> {
            old_all_keys
                .get(index as usize)
                .copied()
                .ok_or(AltError::AccountIndexOutOfRange {
                    index,
                    len: old_all_keys.len(),
                })
        };

        // Bitmap over the table's own positions.
        let mut selection = LookupSelection::default();
        for ix in &message.instructions {
            for &index in &ix.account_key_indexes {
                let key = old_key(index)?;
                if final_static.contains(&key) {
                    continue;
                }
                let Some(position) = table_position(&table, &key)? else {
                    continue;
                };
                selection.observe(position, message.is_account_writable(index as usize));
            }
        }
        let lookup = selection.into_lookup(table.key);

        // Key space as the network loads it.
        let mut new_keys = final_static.clone();
        for &i in lookup.writable_indexes.iter().chain(&lookup.readonly_indexes) {
            new_keys.push(table.addresses[i as usize]);
        }
        if new_keys.len() > MAX_ACCOUNT_KEYS {
            return Err(AltError::TooManyAccountKeys(new_keys.len()));
        }
        let new_index = |key: &Pubkey| -> AltResult<u8> {
            new_keys
                .iter()
                .position(|k| k == key)
                .and_then(|i| u8::try_from(i).ok())
                .ok_or(AltError::KeyNotFoundInStaticOrAnyAlt)
        };

        let mut instructions = Vec::with_capacity(message.instructions.len());
        for ix in &message.instructions {
            let program_id = old_key(ix.program_id_index)?;
            let program_id_index = new_index(&program_id)?;
            let account_key_indexes = ix
                .account_key_indexes
                .iter()
                .map(|&i| new_index(&old_key(i)?))
                .collect::<AltResult<Vec<_>>>()?;

            let mut data = ix.data.clone();
            if program_id == self.config.compute_budget_program_id {
                if let Some((old, new)) =
                    bump_compute_unit_limit(&data, self.config.compute_unit_bump_percent)
                {
                    info!(old, new, "ALT: compute unit limit raised");
                    data = encode_compute_unit_limit(new);
                }
            }

            instructions.push(CompiledInstruction {
                program_id_index,
                account_key_indexes,
                data,
            });
        }

        info!(
            table = %table.key,
            static_keys = final_static.len(),
            writable = lookup.writable_indexes.len(),
            readonly = lookup.readonly_indexes.len(),
            "ALT: v0 message recompiled"
        );

        Ok(MessageV0 {
            header,
            static_account_keys: final_static,
            recent_blockhash,
            instructions,
            address_table_lookups: vec![lookup],
        })
    }
}

/// Position of `key` in `table`, as a lookup index.
fn table_position(table: &AddressLookupTableAccount, key: &Pubkey) -> AltResult<Option<u8>> {
    match table.addresses.iter().position(|a| a == key) {
        None => Ok(None),
        Some(position) => u8::try_from(position).map(Some).map_err(|_| {
            AltError::Sol(SolError::InvalidLookupTable(format!(
                "table {} position {position} does not fit in u8",
                table.key
            )))
        }),
    }
}

/// Compiles legacy messages into v0 messages against one new table.
pub struct LegacyMessageCompiler {
    dispatcher: Arc<dyn LookupTableDispatcher>,
    split_provider: Arc<dyn AccountKeysSplitProvider>,
    blockhash: BlockhashProvider,
}

impl LegacyMessageCompiler {
    pub fn new(
        dispatcher: Arc<dyn LookupTableDispatcher>,
        split_provider: Arc<dyn AccountKeysSplitProvider>,
        blockhash: BlockhashProvider,
    ) -> Self {
        Self {
            dispatcher,
            split_provider,
            blockhash,
        }
    }

    #[instrument(skip_all, fields(keys = message.account_keys.len()))]
    pub async fn compile(&self, message: &LegacyMessage) -> AltResult<MessageV0> {
        let payer = *message.fee_payer().ok_or_else(|| {
            SolError::TransactionBuildError("legacy message has no fee payer".into())
        })?;

        let usages = AccountKeyUsage::from_legacy(message);
        let split = self.split_provider.split_static_account_keys(&usages);

        let table = self
            .dispatcher
            .dispatch(&split.static_pubkeys(), &split.lookup_keys)
            .await?
            .ok_or(AltError::KeyNotFoundInStaticOrAnyAlt)?;

        let instructions = message.decompile_instructions()?;
        let recent_blockhash = self.blockhash.latest().await?;
        let compiled = MessageV0::try_compile(&payer, &instructions, &[table], &recent_blockhash)?;

        info!(
            static_keys = compiled.static_account_keys.len(),
            loaded = compiled.num_lookup_keys(),
            "ALT: legacy message compiled to v0"
        );
        Ok(compiled)
    }
}
