//! Drives the writer until one table holds every offloaded key.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chain_sol::{AddressLookupTableAccount, MessageV0, Pubkey, LOOKUP_TABLE_MAX_ADDRESSES};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::AltConfig;
use crate::error::{AltError, AltResult};
use crate::network::SolanaRpc;
use crate::writer::LookupTableWriter;

#[async_trait]
pub trait LookupTableDispatcher: Send + Sync {
    /// Produce a table holding every key of `alt_keys`.
    ///
    /// Returns `Ok(None)` when the table never showed all keys within the
    /// configured poll attempts.
    async fn dispatch(
        &self,
        static_keys: &[Pubkey],
        alt_keys: &[Pubkey],
    ) -> AltResult<Option<AddressLookupTableAccount>>;

    /// Fetch every table `message` references, in reference order.
    async fn resolve_existing_tables(
        &self,
        message: &MessageV0,
    ) -> AltResult<Vec<AddressLookupTableAccount>>;
}

/// Progress of one dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    NotStarted,
    Creating,
    /// Index of the chunk about to be written.
    Extending(usize),
    /// 1-based poll attempt.
    Polling(u32),
    Converged,
    Exhausted,
}

/// Order-preserving de-duplication.
fn unique_keys(keys: &[Pubkey]) -> Vec<Pubkey> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.iter().copied().filter(|k| seen.insert(*k)).collect()
}

/// Live dispatcher: creates from the first chunk, extends with the rest and
/// polls until the table converges.
pub struct ChunkedLookupTableDispatcher {
    writer: Arc<dyn LookupTableWriter>,
    rpc: Arc<dyn SolanaRpc>,
    authority: Pubkey,
    payer: Pubkey,
    config: AltConfig,
}

impl ChunkedLookupTableDispatcher {
    pub fn new(
        writer: Arc<dyn LookupTableWriter>,
        rpc: Arc<dyn SolanaRpc>,
        authority: Pubkey,
        payer: Pubkey,
        config: AltConfig,
    ) -> Self {
        Self {
            writer,
            rpc,
            authority,
            payer,
            config,
        }
    }

    async fn visible_addresses(&self, table: &Pubkey) -> AltResult<HashSet<Pubkey>> {
        Ok(self
            .rpc
            .get_address_lookup_table(table)
            .await?
            .map(|account| account.addresses.into_iter().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl LookupTableDispatcher for ChunkedLookupTableDispatcher {
    #[instrument(skip_all, fields(static_keys = static_keys.len(), alt_keys = alt_keys.len()))]
    async fn dispatch(
        &self,
        static_keys: &[Pubkey],
        alt_keys: &[Pubkey],
    ) -> AltResult<Option<AddressLookupTableAccount>> {
        let keys = unique_keys(alt_keys);
        if keys.is_empty() {
            return Err(AltError::NoInputKeys);
        }
        if keys.len() > LOOKUP_TABLE_MAX_ADDRESSES {
            return Err(AltError::TooManyAccountKeys(keys.len()));
        }

        let chunks: Vec<&[Pubkey]> = keys.chunks(self.config.chunk_size.max(1)).collect();
        let mut table = Pubkey::default();
        let mut submitted: HashSet<Pubkey> = HashSet::with_capacity(keys.len());
        let mut converged = None;
        let mut state = DispatchState::NotStarted;

        loop {
            state = match state {
                DispatchState::NotStarted => {
                    debug!(chunks = chunks.len(), "ALT: dispatch started");
                    DispatchState::Creating
                }
                DispatchState::Creating => {
                    let first = chunks[0];
                    let account = self
                        .writer
                        .create(first, &self.authority, &self.payer)
                        .await?;
                    table = account.key;
                    submitted.extend(first.iter().copied());
                    info!(%table, keys = first.len(), "ALT: table created");
                    if chunks.len() > 1 {
                        DispatchState::Extending(1)
                    } else {
                        DispatchState::Polling(1)
                    }
                }
                DispatchState::Extending(index) => {
                    let present = self.visible_addresses(&table).await?;
                    let fresh: Vec<Pubkey> = chunks[index]
                        .iter()
                        .copied()
                        .filter(|k| !present.contains(k) && !submitted.contains(k))
                        .collect();

                    if fresh.is_empty() {
                        debug!(chunk = index, "ALT: chunk already present, skipped");
                    } else {
                        self.writer
                            .extend(&table, &self.authority, &self.payer, &fresh)
                            .await?;
                        submitted.extend(fresh.iter().copied());
                        info!(chunk = index, keys = fresh.len(), "ALT: table extended");
                    }

                    if index + 1 < chunks.len() {
                        DispatchState::Extending(index + 1)
                    } else {
                        DispatchState::Polling(1)
                    }
                }
                DispatchState::Polling(attempt) => {
                    if attempt > 1 {
                        tokio::time::sleep(self.config.poll_interval()).await;
                    }
                    let fetched = self.rpc.get_address_lookup_table(&table).await?;
                    let missing = match &fetched {
                        Some(account) => {
                            let present: HashSet<&Pubkey> = account.addresses.iter().collect();
                            keys.iter().filter(|k| !present.contains(k)).count()
                        }
                        None => keys.len(),
                    };

                    if missing == 0 {
                        info!(attempt, "ALT: table converged");
                        converged = fetched;
                        DispatchState::Converged
                    } else if attempt >= self.config.max_poll_attempts {
                        DispatchState::Exhausted
                    } else {
                        debug!(attempt, missing, "ALT: table incomplete, polling again");
                        DispatchState::Polling(attempt + 1)
                    }
                }
                DispatchState::Converged => return Ok(converged),
                DispatchState::Exhausted => {
                    warn!(
                        %table,
                        attempts = self.config.max_poll_attempts,
                        "ALT: table did not converge"
                    );
                    return Ok(None);
                }
            };
        }
    }

    async fn resolve_existing_tables(
        &self,
        message: &MessageV0,
    ) -> AltResult<Vec<AddressLookupTableAccount>> {
        let mut tables = Vec::with_capacity(message.address_table_lookups.len());
        for lookup in &message.address_table_lookups {
            let account = self
                .rpc
                .get_address_lookup_table(&lookup.account_key)
                .await?
                .ok_or(AltError::LookupTableNotFound(lookup.account_key))?;
            tables.push(account);
        }
        Ok(tables)
    }
}

/// Dispatcher returning canned tables, for tests of the compilers.
pub struct FixedLookupTableDispatcher {
    table: Option<AddressLookupTableAccount>,
    existing: Vec<AddressLookupTableAccount>,
    calls: Mutex<Vec<(Vec<Pubkey>, Vec<Pubkey>)>>,
}

impl FixedLookupTableDispatcher {
    /// `table` answers every dispatch; `existing` answers table resolution.
    pub fn new(
        table: Option<AddressLookupTableAccount>,
        existing: Vec<AddressLookupTableAccount>,
    ) -> Self {
        Self {
            table,
            existing,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Arguments of every dispatch call as `(static_keys, alt_keys)`.
    pub async fn calls(&self) -> Vec<(Vec<Pubkey>, Vec<Pubkey>)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl LookupTableDispatcher for FixedLookupTableDispatcher {
    async fn dispatch(
        &self,
        static_keys: &[Pubkey],
        alt_keys: &[Pubkey],
    ) -> AltResult<Option<AddressLookupTableAccount>> {
        if alt_keys.is_empty() {
            return Err(AltError::NoInputKeys);
        }
        self.calls
            .lock()
            .await
            .push((static_keys.to_vec(), alt_keys.to_vec()));
        Ok(self.table.clone())
    }

    async fn resolve_existing_tables(
        &self,
        message: &MessageV0,
    ) -> AltResult<Vec<AddressLookupTableAccount>> {
        message
            .address_table_lookups
            .iter()
            .map(|lookup| {
                self.existing
                    .iter()
                    .find(|t| t.key == lookup.account_key)
                    .cloned()
                    .ok_or(AltError::LookupTableNotFound(lookup.account_key))
            })
            .collect()
    }
}
