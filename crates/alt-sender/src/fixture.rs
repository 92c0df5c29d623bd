//! Deterministic in-memory chain for exercising the pipeline without a
//! network.
//!
//! [`FixtureRpc`] accepts signed transactions, verifies their signatures and
//! executes lookup table program instructions against its own account store.
//! Writes can be made to lag behind reads to reproduce RPC propagation delay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chain_sol::{
    derive_lookup_table_address, AddressLookupTableAccount, Blockhash, LookupTableInstruction,
    LookupTableState, Pubkey, VersionedMessage, VersionedTransaction,
    ADDRESS_LOOKUP_TABLE_PROGRAM_ID, LOOKUP_TABLE_MAX_ADDRESSES,
};
use ed25519_dalek::{Signature as DalekSignature, VerifyingKey};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{AltError, AltResult};
use crate::network::{lookup_table_from_account_data, SolanaRpc};
use crate::writer::LookupTableWriter;

const GENESIS_SLOT: u64 = 1_000;

#[derive(Debug, Clone)]
enum TableWrite {
    Create { authority: Pubkey, slot: u64 },
    Extend(Vec<Pubkey>),
}

#[derive(Debug)]
struct PendingWrite {
    table: Pubkey,
    write: TableWrite,
    /// Reads of `table` that still observe the state before this write.
    reads_left: u32,
}

#[derive(Debug)]
struct ChainState {
    blockhash: Blockhash,
    slot: u64,
    accounts: HashMap<Pubkey, Vec<u8>>,
    pending: Vec<PendingWrite>,
    visibility_lag: u32,
    withhold_extensions: bool,
    send_failure: Option<String>,
    sent: Vec<VersionedTransaction>,
    lookup_table_ops: Vec<(Pubkey, LookupTableInstruction)>,
    table_reads: HashMap<Pubkey, u32>,
}

impl ChainState {
    fn next_slot(&mut self) -> u64 {
        self.slot += 1;
        self.slot
    }

    /// Number of addresses a table will hold once every queued write lands.
    fn projected_len(&self, table: &Pubkey) -> Option<usize> {
        let mut len = match self.accounts.get(table) {
            Some(data) => Some(lookup_table_from_account_data(*table, data).ok()?.addresses.len()),
            None => None,
        };
        for pending in self.pending.iter().filter(|p| p.table == *table) {
            match &pending.write {
                TableWrite::Create { .. } => len = Some(0),
                TableWrite::Extend(addresses) => {
                    len = len.map(|n| n + addresses.len());
                }
            }
        }
        len
    }

    fn queue(&mut self, table: Pubkey, write: TableWrite) {
        if self.withhold_extensions && matches!(write, TableWrite::Extend(_)) {
            debug!(%table, "fixture: withholding extension");
            return;
        }
        if self.visibility_lag == 0 {
            self.apply(&table, write);
        } else {
            self.pending.push(PendingWrite {
                table,
                write,
                reads_left: self.visibility_lag,
            });
        }
    }

    fn apply(&mut self, table: &Pubkey, write: TableWrite) {
        match write {
            TableWrite::Create { authority, slot } => {
                let state = LookupTableState {
                    deactivation_slot: u64::MAX,
                    last_extended_slot: slot,
                    last_extended_slot_start_index: 0,
                    authority: Some(authority),
                    addresses: Vec::new(),
                };
                self.accounts.insert(*table, state.serialize());
            }
            TableWrite::Extend(addresses) => {
                let slot = self.slot;
                let Some(data) = self.accounts.get_mut(table) else {
                    warn!(%table, "fixture: extension of missing table dropped");
                    return;
                };
                let Ok(mut state) = LookupTableState::deserialize(data) else {
                    warn!(%table, "fixture: corrupt table data");
                    return;
                };
                state.last_extended_slot_start_index = state.addresses.len() as u8;
                state.last_extended_slot = slot;
                state.addresses.extend(addresses);
                *data = state.serialize();
            }
        }
    }

    /// Land writes whose lag has elapsed, then age the rest by one read.
    fn settle(&mut self, table: &Pubkey) {
        let mut remaining = Vec::with_capacity(self.pending.len());
        let mut blocked = false;
        for mut pending in std::mem::take(&mut self.pending) {
            if pending.table != *table {
                remaining.push(pending);
                continue;
            }
            // Writes to one table land in submission order.
            if pending.reads_left == 0 && !blocked {
                self.apply(&pending.table, pending.write);
            } else {
                blocked = true;
                pending.reads_left = pending.reads_left.saturating_sub(1);
                remaining.push(pending);
            }
        }
        self.pending = remaining;
    }
}

fn reject(reason: impl Into<String>) -> AltError {
    AltError::Network(reason.into())
}

/// In-memory stand-in for a Solana RPC node.
#[derive(Debug)]
pub struct FixtureRpc {
    state: Mutex<ChainState>,
}

impl Default for FixtureRpc {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureRpc {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChainState {
                blockhash: [0x5b; 32],
                slot: GENESIS_SLOT,
                accounts: HashMap::new(),
                pending: Vec::new(),
                visibility_lag: 0,
                withhold_extensions: false,
                send_failure: None,
                sent: Vec::new(),
                lookup_table_ops: Vec::new(),
                table_reads: HashMap::new(),
            }),
        }
    }

    /// Make every later write invisible to the next `reads` reads of its table.
    pub async fn set_visibility_lag(&self, reads: u32) {
        self.state.lock().await.visibility_lag = reads;
    }

    /// Accept extensions without ever applying them.
    pub async fn set_withhold_extensions(&self, withhold: bool) {
        self.state.lock().await.withhold_extensions = withhold;
    }

    /// Fail every later broadcast with `reason`.
    pub async fn set_send_failure(&self, reason: Option<String>) {
        self.state.lock().await.send_failure = reason;
    }

    pub async fn set_blockhash(&self, blockhash: Blockhash) {
        self.state.lock().await.blockhash = blockhash;
    }

    pub async fn blockhash(&self) -> Blockhash {
        self.state.lock().await.blockhash
    }

    /// Create an already visible table owned by `authority`.
    pub async fn insert_table(&self, authority: &Pubkey, addresses: &[Pubkey]) -> AltResult<Pubkey> {
        let mut state = self.state.lock().await;
        let slot = state.next_slot();
        let (table, _) = derive_lookup_table_address(authority, slot)?;
        state.apply(
            &table,
            TableWrite::Create {
                authority: *authority,
                slot,
            },
        );
        if !addresses.is_empty() {
            state.apply(&table, TableWrite::Extend(addresses.to_vec()));
        }
        Ok(table)
    }

    pub async fn sent_transactions(&self) -> Vec<VersionedTransaction> {
        self.state.lock().await.sent.clone()
    }

    /// Every lookup table instruction executed, with the table it targeted.
    pub async fn lookup_table_instructions(&self) -> Vec<(Pubkey, LookupTableInstruction)> {
        self.state.lock().await.lookup_table_ops.clone()
    }

    pub async fn table_reads(&self, table: &Pubkey) -> u32 {
        self.state
            .lock()
            .await
            .table_reads
            .get(table)
            .copied()
            .unwrap_or(0)
    }

    async fn create_direct(&self, authority: &Pubkey, keys: &[Pubkey]) -> AltResult<Pubkey> {
        let mut state = self.state.lock().await;
        let slot = state.next_slot();
        let (table, bump_seed) = derive_lookup_table_address(authority, slot)?;
        state.lookup_table_ops.push((
            table,
            LookupTableInstruction::CreateLookupTable {
                recent_slot: slot,
                bump_seed,
            },
        ));
        state.queue(
            table,
            TableWrite::Create {
                authority: *authority,
                slot,
            },
        );
        if !keys.is_empty() {
            state.lookup_table_ops.push((
                table,
                LookupTableInstruction::ExtendLookupTable {
                    new_addresses: keys.to_vec(),
                },
            ));
            state.queue(table, TableWrite::Extend(keys.to_vec()));
        }
        Ok(table)
    }

    async fn extend_direct(&self, table: &Pubkey, addresses: &[Pubkey]) -> AltResult<()> {
        let mut state = self.state.lock().await;
        state.lookup_table_ops.push((
            *table,
            LookupTableInstruction::ExtendLookupTable {
                new_addresses: addresses.to_vec(),
            },
        ));
        state.queue(*table, TableWrite::Extend(addresses.to_vec()));
        Ok(())
    }
}

fn verify_signatures(tx: &VersionedTransaction) -> AltResult<()> {
    let message = tx.message_data()?;
    let signers = tx.message.header().num_required_signatures as usize;
    if tx.signatures.len() != signers {
        return Err(reject(format!(
            "expected {signers} signatures, got {}",
            tx.signatures.len()
        )));
    }
    for (key, signature) in tx.message.static_account_keys().iter().zip(&tx.signatures) {
        let verifying_key = VerifyingKey::from_bytes(key.as_bytes())
            .map_err(|e| reject(format!("signer {key} is not an ed25519 key: {e}")))?;
        verifying_key
            .verify_strict(&message, &DalekSignature::from_bytes(signature))
            .map_err(|_| reject(format!("signature verification failed for {key}")))?;
    }
    Ok(())
}

/// Lookup table instructions of `message` whose program and accounts are
/// all static keys.
fn lookup_table_instructions(
    message: &VersionedMessage,
) -> AltResult<Vec<(LookupTableInstruction, Vec<Pubkey>)>> {
    let (keys, instructions) = match message {
        VersionedMessage::Legacy(m) => (&m.account_keys, &m.instructions),
        VersionedMessage::V0(m) => (&m.static_account_keys, &m.instructions),
    };

    let mut decoded = Vec::new();
    for ix in instructions {
        let Some(program) = keys.get(ix.program_id_index as usize) else {
            continue;
        };
        if *program != ADDRESS_LOOKUP_TABLE_PROGRAM_ID {
            continue;
        }
        let accounts = ix
            .account_key_indexes
            .iter()
            .map(|&i| {
                keys.get(i as usize)
                    .copied()
                    .ok_or_else(|| reject("lookup table instruction references a loaded key"))
            })
            .collect::<AltResult<Vec<_>>>()?;
        decoded.push((LookupTableInstruction::decode(&ix.data)?, accounts));
    }
    Ok(decoded)
}

#[async_trait]
impl SolanaRpc for FixtureRpc {
    async fn get_latest_blockhash(&self) -> AltResult<String> {
        let state = self.state.lock().await;
        Ok(bs58::encode(state.blockhash).into_string())
    }

    async fn get_slot(&self) -> AltResult<u64> {
        Ok(self.state.lock().await.next_slot())
    }

    async fn get_address_lookup_table(
        &self,
        key: &Pubkey,
    ) -> AltResult<Option<AddressLookupTableAccount>> {
        let mut state = self.state.lock().await;
        *state.table_reads.entry(*key).or_default() += 1;
        state.settle(key);
        state
            .accounts
            .get(key)
            .map(|data| lookup_table_from_account_data(*key, data))
            .transpose()
    }

    async fn send_raw(
        &self,
        base64_transaction: String,
        _started_at: SystemTime,
    ) -> AltResult<String> {
        let mut state = self.state.lock().await;
        if let Some(reason) = &state.send_failure {
            return Err(reject(reason.clone()));
        }

        let wire = STANDARD
            .decode(base64_transaction)
            .map_err(|e| reject(format!("transaction is not base64: {e}")))?;
        let tx = VersionedTransaction::deserialize(&wire)?;
        if *tx.message.recent_blockhash() != state.blockhash {
            return Err(reject("blockhash not found"));
        }
        verify_signatures(&tx)?;

        // Validate every instruction before touching any account.
        let mut writes = Vec::new();
        let mut executed = Vec::new();
        let mut projected: HashMap<Pubkey, usize> = HashMap::new();
        for (ix, accounts) in lookup_table_instructions(&tx.message)? {
            let (table, authority) = match accounts.as_slice() {
                [table, authority, ..] => (*table, *authority),
                _ => return Err(reject("lookup table instruction is missing accounts")),
            };
            match &ix {
                LookupTableInstruction::CreateLookupTable {
                    recent_slot,
                    bump_seed,
                } => {
                    let (expected, bump) = derive_lookup_table_address(&authority, *recent_slot)?;
                    if expected != table || bump != *bump_seed {
                        return Err(reject(format!(
                            "table address {table} does not match derived {expected}"
                        )));
                    }
                    if state.projected_len(&table).is_some() || projected.contains_key(&table) {
                        return Err(reject(format!("table {table} already exists")));
                    }
                    projected.insert(table, 0);
                    writes.push((
                        table,
                        TableWrite::Create {
                            authority,
                            slot: *recent_slot,
                        },
                    ));
                }
                LookupTableInstruction::ExtendLookupTable { new_addresses } => {
                    let current = match projected.get(&table) {
                        Some(len) => *len,
                        None => state
                            .projected_len(&table)
                            .ok_or_else(|| reject(format!("table {table} does not exist")))?,
                    };
                    let len = current + new_addresses.len();
                    if len > LOOKUP_TABLE_MAX_ADDRESSES {
                        return Err(reject(format!(
                            "table {table} would hold {len} addresses"
                        )));
                    }
                    projected.insert(table, len);
                    writes.push((table, TableWrite::Extend(new_addresses.clone())));
                }
            }
            executed.push((table, ix));
        }

        state.lookup_table_ops.extend(executed);
        for (table, write) in writes {
            state.queue(table, write);
        }

        let txid = bs58::encode(tx.signatures.first().copied().unwrap_or([0u8; 64])).into_string();
        debug!(%txid, "fixture: accepted transaction");
        state.sent.push(tx);
        Ok(txid)
    }
}

/// A write recorded by [`FixtureLookupTableWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterCall {
    Create { keys: Vec<Pubkey> },
    Extend { table: Pubkey, addresses: Vec<Pubkey> },
}

/// Writer that mutates a [`FixtureRpc`] directly, skipping transaction
/// building, and records every call.
pub struct FixtureLookupTableWriter {
    rpc: Arc<FixtureRpc>,
    calls: Mutex<Vec<WriterCall>>,
}

impl FixtureLookupTableWriter {
    pub fn new(rpc: Arc<FixtureRpc>) -> Self {
        Self {
            rpc,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub async fn calls(&self) -> Vec<WriterCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl LookupTableWriter for FixtureLookupTableWriter {
    async fn create(
        &self,
        keys: &[Pubkey],
        authority: &Pubkey,
        _payer: &Pubkey,
    ) -> AltResult<AddressLookupTableAccount> {
        self.calls.lock().await.push(WriterCall::Create {
            keys: keys.to_vec(),
        });
        let table = self.rpc.create_direct(authority, keys).await?;
        Ok(self
            .rpc
            .get_address_lookup_table(&table)
            .await?
            .unwrap_or_else(|| AddressLookupTableAccount::new(table, Vec::new())))
    }

    async fn extend(
        &self,
        table: &Pubkey,
        _authority: &Pubkey,
        _payer: &Pubkey,
        addresses: &[Pubkey],
    ) -> AltResult<()> {
        self.calls.lock().await.push(WriterCall::Extend {
            table: *table,
            addresses: addresses.to_vec(),
        });
        self.rpc.extend_direct(table, addresses).await
    }
}
