//! Address Lookup Table program: instructions and account state.
//!
//! Implements table address derivation, the `CreateLookupTable` and
//! `ExtendLookupTable` instructions, and decoding of table accounts without
//! pulling in the `solana-sdk` or `solana-address-lookup-table-program`
//! crates.
//!
//! Instruction payloads use bincode's enum layout: a little-endian `u32`
//! variant index followed by the fields.
//!
//! ```text
//! CreateLookupTable:  u32 0 | recent_slot u64 | bump_seed u8
//! ExtendLookupTable:  u32 2 | len u64 | addresses 32 bytes * len
//! ```

use sha2::{Digest, Sha256};

use crate::address::{Pubkey, PUBKEY_BYTES};
use crate::error::SolError;
use crate::transaction::{AccountMeta, Instruction, SYSTEM_PROGRAM_ID};

// ---------------------------------------------------------------------------
// Program constants
// ---------------------------------------------------------------------------

/// Address Lookup Table Program ID: `AddressLookupTab1e1111111111111111111111111`
pub const ADDRESS_LOOKUP_TABLE_PROGRAM_ID: Pubkey = Pubkey::new([
    0x02, 0x77, 0xa6, 0xaf, 0x97, 0x33, 0x9b, 0x7a, 0xc8, 0x8d, 0x18, 0x92, 0xc9, 0x04, 0x46,
    0xf5, 0x00, 0x02, 0x30, 0x92, 0x66, 0xf6, 0x2e, 0x53, 0xc1, 0x18, 0x24, 0x49, 0x82, 0x00,
    0x00, 0x00,
]);

/// Maximum number of addresses a single table can hold.
pub const LOOKUP_TABLE_MAX_ADDRESSES: usize = 256;

/// Size of the serialized table metadata preceding the address list.
pub const LOOKUP_TABLE_META_SIZE: usize = 56;

/// Largest address batch that fits in one extend transaction.
pub const MAX_ADDRESSES_PER_EXTEND: usize = 30;

const CREATE_LOOKUP_TABLE_IX: u32 = 0;
const EXTEND_LOOKUP_TABLE_IX: u32 = 2;

/// Discriminator of an initialized table in the account data.
const LOOKUP_TABLE_STATE: u32 = 1;

/// The string appended to PDA derivation: "ProgramDerivedAddress".
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

/// Derive the table address for `authority` at `recent_slot`.
///
/// Seeds: `[authority, recent_slot_le_bytes]` under the lookup table program.
pub fn derive_lookup_table_address(
    authority: &Pubkey,
    recent_slot: u64,
) -> Result<(Pubkey, u8), SolError> {
    find_program_address(
        &[authority.as_ref(), &recent_slot.to_le_bytes()],
        &ADDRESS_LOOKUP_TABLE_PROGRAM_ID,
    )
}

/// Build a `CreateLookupTable` instruction.
///
/// Returns the instruction together with the derived table address.
pub fn create_lookup_table(
    authority: &Pubkey,
    payer: &Pubkey,
    recent_slot: u64,
) -> Result<(Instruction, Pubkey), SolError> {
    let (table, bump_seed) = derive_lookup_table_address(authority, recent_slot)?;

    let mut data = Vec::with_capacity(13);
    data.extend_from_slice(&CREATE_LOOKUP_TABLE_IX.to_le_bytes());
    data.extend_from_slice(&recent_slot.to_le_bytes());
    data.push(bump_seed);

    let ix = Instruction {
        program_id: ADDRESS_LOOKUP_TABLE_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(table, false),
            AccountMeta::new_readonly(*authority, true),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ],
        data,
    };

    Ok((ix, table))
}

/// Build an `ExtendLookupTable` instruction appending `new_addresses`.
pub fn extend_lookup_table(
    table: &Pubkey,
    authority: &Pubkey,
    payer: &Pubkey,
    new_addresses: &[Pubkey],
) -> Result<Instruction, SolError> {
    if new_addresses.is_empty() {
        return Err(SolError::TransactionBuildError(
            "extend requires at least one address".into(),
        ));
    }

    let mut data = Vec::with_capacity(12 + new_addresses.len() * PUBKEY_BYTES);
    data.extend_from_slice(&EXTEND_LOOKUP_TABLE_IX.to_le_bytes());
    data.extend_from_slice(&(new_addresses.len() as u64).to_le_bytes());
    for address in new_addresses {
        data.extend_from_slice(address.as_bytes());
    }

    Ok(Instruction {
        program_id: ADDRESS_LOOKUP_TABLE_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*table, false),
            AccountMeta::new_readonly(*authority, true),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ],
        data,
    })
}

/// A decoded lookup table program instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupTableInstruction {
    CreateLookupTable { recent_slot: u64, bump_seed: u8 },
    ExtendLookupTable { new_addresses: Vec<Pubkey> },
}

impl LookupTableInstruction {
    /// Decode the payload of a lookup table program instruction.
    ///
    /// Variants this crate never emits (freeze, deactivate, close) are
    /// reported as errors.
    pub fn decode(data: &[u8]) -> Result<Self, SolError> {
        let tag = read_u32(data, 0)?;
        match tag {
            CREATE_LOOKUP_TABLE_IX => {
                let recent_slot = read_u64(data, 4)?;
                let bump_seed = *data.get(12).ok_or_else(|| {
                    SolError::SerializationError("create payload missing bump seed".into())
                })?;
                Ok(Self::CreateLookupTable {
                    recent_slot,
                    bump_seed,
                })
            }
            EXTEND_LOOKUP_TABLE_IX => {
                let len = read_u64(data, 4)? as usize;
                let body = &data[12..];
                if body.len() != len.saturating_mul(PUBKEY_BYTES) {
                    return Err(SolError::SerializationError(format!(
                        "extend payload declares {len} addresses but carries {} bytes",
                        body.len()
                    )));
                }
                let new_addresses = body
                    .chunks_exact(PUBKEY_BYTES)
                    .map(Pubkey::from_slice)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::ExtendLookupTable { new_addresses })
            }
            other => Err(SolError::SerializationError(format!(
                "unsupported lookup table instruction {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Account state
// ---------------------------------------------------------------------------

/// Decoded contents of a lookup table account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTableState {
    pub deactivation_slot: u64,
    pub last_extended_slot: u64,
    pub last_extended_slot_start_index: u8,
    pub authority: Option<Pubkey>,
    pub addresses: Vec<Pubkey>,
}

impl LookupTableState {
    /// Decode raw account data.
    ///
    /// Layout: `u32` state tag (1 = table), `u64` deactivation slot, `u64`
    /// last extended slot, `u8` start index, optional authority (`u8` tag +
    /// 32 bytes), padding to 56 bytes, then the packed address list.
    pub fn deserialize(data: &[u8]) -> Result<Self, SolError> {
        if data.len() < LOOKUP_TABLE_META_SIZE {
            return Err(SolError::InvalidLookupTable(format!(
                "account data is {} bytes, metadata alone is {LOOKUP_TABLE_META_SIZE}",
                data.len()
            )));
        }
        if read_u32(data, 0)? != LOOKUP_TABLE_STATE {
            return Err(SolError::InvalidLookupTable("account is not initialized".into()));
        }

        let deactivation_slot = read_u64(data, 4)?;
        let last_extended_slot = read_u64(data, 12)?;
        let last_extended_slot_start_index = data[20];
        let authority = match data[21] {
            0 => None,
            1 => Some(Pubkey::from_slice(&data[22..54])?),
            tag => {
                return Err(SolError::InvalidLookupTable(format!(
                    "invalid authority option tag {tag}"
                )))
            }
        };

        let body = &data[LOOKUP_TABLE_META_SIZE..];
        if body.len() % PUBKEY_BYTES != 0 {
            return Err(SolError::InvalidLookupTable(format!(
                "address section of {} bytes is not a multiple of 32",
                body.len()
            )));
        }
        let addresses = body
            .chunks_exact(PUBKEY_BYTES)
            .map(Pubkey::from_slice)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            deactivation_slot,
            last_extended_slot,
            last_extended_slot_start_index,
            authority,
            addresses,
        })
    }

    /// Encode back into account data.
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(LOOKUP_TABLE_META_SIZE + self.addresses.len() * 32);
        data.extend_from_slice(&LOOKUP_TABLE_STATE.to_le_bytes());
        data.extend_from_slice(&self.deactivation_slot.to_le_bytes());
        data.extend_from_slice(&self.last_extended_slot.to_le_bytes());
        data.push(self.last_extended_slot_start_index);
        match &self.authority {
            Some(key) => {
                data.push(1);
                data.extend_from_slice(key.as_bytes());
            }
            None => data.extend_from_slice(&[0u8; 33]),
        }
        data.resize(LOOKUP_TABLE_META_SIZE, 0);
        for address in &self.addresses {
            data.extend_from_slice(address.as_bytes());
        }
        data
    }

    /// A table that has never been deactivated.
    pub fn is_active(&self) -> bool {
        self.deactivation_slot == u64::MAX
    }
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, SolError> {
    data.get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| SolError::SerializationError(format!("missing u32 at offset {offset}")))
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64, SolError> {
    data.get(offset..offset + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| SolError::SerializationError(format!("missing u64 at offset {offset}")))
}

// ---------------------------------------------------------------------------
// Program Derived Address derivation
// ---------------------------------------------------------------------------

/// Find a valid Program Derived Address (PDA) for the given seeds and program.
///
/// Iterates bump seeds from 255 down to 0, computing
/// `SHA-256(seed_0 || seed_1 || ... || bump || program_id || "ProgramDerivedAddress")`
/// and returning the first result that is NOT a valid Ed25519 point.
pub fn find_program_address(
    seeds: &[&[u8]],
    program_id: &Pubkey,
) -> Result<(Pubkey, u8), SolError> {
    for bump in (0u8..=255).rev() {
        if let Some(address) = try_create_program_address(seeds, &[bump], program_id) {
            return Ok((address, bump));
        }
    }

    Err(SolError::InvalidAddress(
        "could not find valid PDA bump seed".into(),
    ))
}

/// Returns `Some(address)` if the derived point is OFF the Ed25519 curve,
/// `None` if it falls on the curve.
fn try_create_program_address(
    seeds: &[&[u8]],
    bump_seed: &[u8],
    program_id: &Pubkey,
) -> Option<Pubkey> {
    let mut hasher = Sha256::new();

    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(bump_seed);
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);

    let hash: [u8; 32] = hasher.finalize().into();

    if is_on_curve(&hash) {
        return None;
    }

    Some(Pubkey::new(hash))
}

/// Uses `curve25519-dalek` to attempt decompression. If it succeeds, the
/// point is on the curve.
fn is_on_curve(bytes: &[u8; 32]) -> bool {
    curve25519_dalek::edwards::CompressedEdwardsY(*bytes)
        .decompress()
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> Pubkey {
        Pubkey::new([b; 32])
    }

    #[test]
    fn program_id_matches_base58() {
        assert_eq!(
            ADDRESS_LOOKUP_TABLE_PROGRAM_ID.to_string(),
            "AddressLookupTab1e1111111111111111111111111"
        );
    }

    #[test]
    fn table_address_is_off_curve_and_deterministic() {
        let (a, bump_a) = derive_lookup_table_address(&key(1), 42).unwrap();
        let (b, bump_b) = derive_lookup_table_address(&key(1), 42).unwrap();
        assert_eq!((a, bump_a), (b, bump_b));
        assert!(!is_on_curve(a.as_bytes()));
    }

    #[test]
    fn table_address_depends_on_slot() {
        let (a, _) = derive_lookup_table_address(&key(1), 42).unwrap();
        let (b, _) = derive_lookup_table_address(&key(1), 43).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn create_instruction_layout() {
        let (ix, table) = create_lookup_table(&key(1), &key(1), 1234).unwrap();
        let (_, bump) = derive_lookup_table_address(&key(1), 1234).unwrap();

        assert_eq!(ix.program_id, ADDRESS_LOOKUP_TABLE_PROGRAM_ID);
        assert_eq!(ix.data.len(), 13);
        assert_eq!(&ix.data[..4], &[0, 0, 0, 0]);
        assert_eq!(&ix.data[4..12], &1234u64.to_le_bytes());
        assert_eq!(ix.data[12], bump);
        assert_eq!(ix.accounts[0].pubkey, table);
        assert!(ix.accounts[0].is_writable);
        assert!(ix.accounts[1].is_signer);
        assert!(ix.accounts[2].is_signer && ix.accounts[2].is_writable);
        assert_eq!(ix.accounts[3].pubkey, SYSTEM_PROGRAM_ID);

        assert_eq!(
            LookupTableInstruction::decode(&ix.data).unwrap(),
            LookupTableInstruction::CreateLookupTable {
                recent_slot: 1234,
                bump_seed: bump
            }
        );
    }

    #[test]
    fn extend_instruction_layout() {
        let addresses = vec![key(7), key(8)];
        let ix = extend_lookup_table(&key(9), &key(1), &key(1), &addresses).unwrap();

        assert_eq!(&ix.data[..4], &[2, 0, 0, 0]);
        assert_eq!(&ix.data[4..12], &2u64.to_le_bytes());
        assert_eq!(ix.data.len(), 12 + 64);
        assert_eq!(
            LookupTableInstruction::decode(&ix.data).unwrap(),
            LookupTableInstruction::ExtendLookupTable {
                new_addresses: addresses
            }
        );
    }

    #[test]
    fn extend_rejects_empty_list() {
        assert!(extend_lookup_table(&key(9), &key(1), &key(1), &[]).is_err());
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        let mut data = 2u32.to_le_bytes().to_vec();
        data.extend_from_slice(&3u64.to_le_bytes());
        data.extend_from_slice(&[0u8; 32]);
        assert!(LookupTableInstruction::decode(&data).is_err());
    }

    #[test]
    fn decode_rejects_unknown_variant() {
        assert!(LookupTableInstruction::decode(&4u32.to_le_bytes()).is_err());
    }

    #[test]
    fn state_decodes_from_account_data() {
        let state = LookupTableState {
            deactivation_slot: u64::MAX,
            last_extended_slot: 77,
            last_extended_slot_start_index: 2,
            authority: Some(key(1)),
            addresses: vec![key(4), key(5), key(6)],
        };
        let data = state.serialize();
        assert_eq!(data.len(), LOOKUP_TABLE_META_SIZE + 96);
        let decoded = LookupTableState::deserialize(&data).unwrap();
        assert_eq!(decoded, state);
        assert!(decoded.is_active());
    }

    #[test]
    fn frozen_table_has_no_authority() {
        let state = LookupTableState {
            deactivation_slot: 10,
            last_extended_slot: 0,
            last_extended_slot_start_index: 0,
            authority: None,
            addresses: vec![],
        };
        let decoded = LookupTableState::deserialize(&state.serialize()).unwrap();
        assert_eq!(decoded.authority, None);
        assert!(!decoded.is_active());
    }

    #[test]
    fn state_rejects_uninitialized_and_ragged_data() {
        assert!(LookupTableState::deserialize(&[0u8; LOOKUP_TABLE_META_SIZE]).is_err());

        let mut data = LookupTableState {
            deactivation_slot: u64::MAX,
            last_extended_slot: 0,
            last_extended_slot_start_index: 0,
            authority: None,
            addresses: vec![key(1)],
        }
        .serialize();
        data.pop();
        assert!(LookupTableState::deserialize(&data).is_err());
        assert!(LookupTableState::deserialize(&data[..20]).is_err());
    }
}
