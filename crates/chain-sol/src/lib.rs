//! Solana wire-format support for address lookup table rewriting.
//!
//! Account keys, legacy and v0 message encoding, versioned transaction
//! envelopes, and instruction builders for the Address Lookup Table and
//! Compute Budget programs. There is no `solana-sdk` dependency: the compact
//! binary format is written by hand, with `ed25519-dalek` for signatures and
//! `bs58` for Base58.

pub mod address;
pub mod compute_budget;
pub mod error;
pub mod lookup_table;
pub mod transaction;
pub mod v0;

// Re-export key public types for ergonomic imports.
pub use address::{validate_address, Pubkey};
pub use compute_budget::COMPUTE_BUDGET_PROGRAM_ID;
pub use error::SolError;
pub use lookup_table::{
    create_lookup_table, derive_lookup_table_address, extend_lookup_table,
    LookupTableInstruction, LookupTableState, ADDRESS_LOOKUP_TABLE_PROGRAM_ID,
    LOOKUP_TABLE_MAX_ADDRESSES, MAX_ADDRESSES_PER_EXTEND,
};
pub use transaction::{
    decode_compact_u16, encode_compact_u16, keypair_public_key, sign_message, AccountMeta,
    Blockhash, CompiledInstruction, Instruction, LegacyMessage, MessageHeader, Signature,
    VersionedMessage, VersionedTransaction, MAX_ACCOUNT_KEYS, SYSTEM_PROGRAM_ID,
};
pub use v0::{AddressLookupTableAccount, MessageAddressTableLookup, MessageV0};
