//! Version 0 messages and address table lookups.
//!
//! A v0 message is a legacy message prefixed with `0x80` and followed by a
//! list of address table lookups:
//!
//! ```text
//! AddressTableLookup:
//!   account_key             32 bytes
//!   num_writable            compact-u16
//!   writable_indexes        u8 * num_writable
//!   num_readonly            compact-u16
//!   readonly_indexes        u8 * num_readonly
//! ```
//!
//! The resolved key space of a v0 message is the static keys, then the
//! writable selections of every lookup, then the readonly selections of
//! every lookup.

use crate::address::Pubkey;
use crate::error::SolError;
use crate::transaction::{
    push_len, Blockhash, CompiledInstruction, CompiledKeys, Instruction, MessageHeader,
    WireReader, MAX_ACCOUNT_KEYS,
};

/// High bit set on the first byte marks a versioned message.
pub const MESSAGE_VERSION_PREFIX: u8 = 0x80;

/// A reference to one lookup table and the entries a message loads from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageAddressTableLookup {
    pub account_key: Pubkey,
    pub writable_indexes: Vec<u8>,
    pub readonly_indexes: Vec<u8>,
}

/// An on-chain lookup table: its address and the ordered addresses it holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressLookupTableAccount {
    pub key: Pubkey,
    pub addresses: Vec<Pubkey>,
}

impl AddressLookupTableAccount {
    pub fn new(key: Pubkey, addresses: Vec<Pubkey>) -> Self {
        Self { key, addresses }
    }

    fn address_at(&self, index: u8) -> Result<Pubkey, SolError> {
        self.addresses.get(index as usize).copied().ok_or_else(|| {
            SolError::InvalidLookupTable(format!(
                "index {index} out of range for table {} with {} addresses",
                self.key,
                self.addresses.len()
            ))
        })
    }
}

/// A compiled v0 message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageV0 {
    pub header: MessageHeader,
    pub static_account_keys: Vec<Pubkey>,
    pub recent_blockhash: Blockhash,
    pub instructions: Vec<CompiledInstruction>,
    pub address_table_lookups: Vec<MessageAddressTableLookup>,
}

impl MessageV0 {
    /// Compile `instructions` into a v0 message, loading every eligible key
    /// from `lookup_tables`.
    ///
    /// Signers and invoked programs always stay static. Any other key found
    /// in a table is loaded from the first table that contains it.
    pub fn try_compile(
        payer: &Pubkey,
        instructions: &[Instruction],
        lookup_tables: &[AddressLookupTableAccount],
        recent_blockhash: &Blockhash,
    ) -> Result<Self, SolError> {
        let mut keys = CompiledKeys::compile(instructions, payer);

        let mut address_table_lookups = Vec::new();
        let mut loaded_writable = Vec::new();
        let mut loaded_readonly = Vec::new();
        for table in lookup_tables {
            if let Some((lookup, writable, readonly)) = keys.try_extract_table_lookup(table)? {
                address_table_lookups.push(lookup);
                loaded_writable.extend(writable);
                loaded_readonly.extend(readonly);
            }
        }

        let (header, static_account_keys) = keys.into_header_and_keys()?;

        let resolved: Vec<Pubkey> = static_account_keys
            .iter()
            .chain(&loaded_writable)
            .chain(&loaded_readonly)
            .copied()
            .collect();
        if resolved.len() > MAX_ACCOUNT_KEYS {
            return Err(SolError::TransactionBuildError(format!(
                "{} account keys exceed the {MAX_ACCOUNT_KEYS} addressable by a message",
                resolved.len()
            )));
        }

        let instructions = instructions
            .iter()
            .map(|ix| CompiledInstruction::compile(ix, &resolved))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            header,
            static_account_keys,
            recent_blockhash: *recent_blockhash,
            instructions,
            address_table_lookups,
        })
    }

    /// Serialize the message, version prefix included.
    pub fn serialize(&self) -> Result<Vec<u8>, SolError> {
        let mut buf = Vec::with_capacity(512);
        buf.push(MESSAGE_VERSION_PREFIX);
        self.header.write(&mut buf);

        push_len(&mut buf, self.static_account_keys.len())?;
        for key in &self.static_account_keys {
            buf.extend_from_slice(key.as_bytes());
        }

        buf.extend_from_slice(&self.recent_blockhash);

        push_len(&mut buf, self.instructions.len())?;
        for ix in &self.instructions {
            ix.write(&mut buf)?;
        }

        push_len(&mut buf, self.address_table_lookups.len())?;
        for lookup in &self.address_table_lookups {
            buf.extend_from_slice(lookup.account_key.as_bytes());
            push_len(&mut buf, lookup.writable_indexes.len())?;
            buf.extend_from_slice(&lookup.writable_indexes);
            push_len(&mut buf, lookup.readonly_indexes.len())?;
            buf.extend_from_slice(&lookup.readonly_indexes);
        }

        Ok(buf)
    }

    /// Decode everything after the version prefix.
    pub(crate) fn read_body(reader: &mut WireReader<'_>) -> Result<Self, SolError> {
        let header = MessageHeader::read(reader)?;
        let static_account_keys = reader.read_pubkeys()?;
        let recent_blockhash = reader.read_blockhash()?;

        let num_instructions = reader.read_compact_u16()?;
        let instructions = (0..num_instructions)
            .map(|_| CompiledInstruction::read(reader))
            .collect::<Result<Vec<_>, _>>()?;

        let num_lookups = reader.read_compact_u16()?;
        let address_table_lookups = (0..num_lookups)
            .map(|_| {
                Ok(MessageAddressTableLookup {
                    account_key: reader.read_pubkey()?,
                    writable_indexes: reader.read_byte_list()?,
                    readonly_indexes: reader.read_byte_list()?,
                })
            })
            .collect::<Result<Vec<_>, SolError>>()?;

        Ok(Self {
            header,
            static_account_keys,
            recent_blockhash,
            instructions,
            address_table_lookups,
        })
    }

    /// Number of keys loaded through lookups.
    pub fn num_lookup_keys(&self) -> usize {
        self.address_table_lookups
            .iter()
            .map(|l| l.writable_indexes.len() + l.readonly_indexes.len())
            .sum()
    }

    pub fn is_signer(&self, index: usize) -> bool {
        index < self.header.num_required_signatures as usize
    }

    /// Writable flag of the resolved key at `index`.
    pub fn is_account_writable(&self, index: usize) -> bool {
        let num_static = self.static_account_keys.len();
        if index >= num_static {
            let num_writable_loaded: usize = self
                .address_table_lookups
                .iter()
                .map(|l| l.writable_indexes.len())
                .sum();
            return index - num_static < num_writable_loaded;
        }
        self.header.is_static_writable(index, num_static)
    }

    /// Resolve the full key space against the tables this message references.
    ///
    /// Every lookup must have a matching entry in `tables`.
    pub fn resolve_account_keys(
        &self,
        tables: &[AddressLookupTableAccount],
    ) -> Result<Vec<Pubkey>, SolError> {
        let table_for = |key: &Pubkey| {
            tables.iter().find(|t| t.key == *key).ok_or_else(|| {
                SolError::InvalidLookupTable(format!("table {key} was not supplied"))
            })
        };

        let mut writable = Vec::new();
        let mut readonly = Vec::new();
        for lookup in &self.address_table_lookups {
            let table = table_for(&lookup.account_key)?;
            for &i in &lookup.writable_indexes {
                writable.push(table.address_at(i)?);
            }
            for &i in &lookup.readonly_indexes {
                readonly.push(table.address_at(i)?);
            }
        }

        let mut keys = self.static_account_keys.clone();
        keys.extend(writable);
        keys.extend(readonly);
        Ok(keys)
    }
}

impl CompiledKeys {
    /// Move every non-signer, non-program key present in `table` out of the
    /// static set and into a lookup against it.
    pub(crate) fn try_extract_table_lookup(
        &mut self,
        table: &AddressLookupTableAccount,
    ) -> Result<Option<(MessageAddressTableLookup, Vec<Pubkey>, Vec<Pubkey>)>, SolError> {
        let mut lookup = MessageAddressTableLookup {
            account_key: table.key,
            ..Default::default()
        };
        let mut writable = Vec::new();
        let mut readonly = Vec::new();

        let mut remaining = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            let position = if entry.is_signer || entry.is_invoked {
                None
            } else {
                table.addresses.iter().position(|a| *a == entry.pubkey)
            };

            let Some(position) = position else {
                remaining.push(entry);
                continue;
            };

            let index = u8::try_from(position).map_err(|_| {
                SolError::InvalidLookupTable(format!(
                    "table {} index {position} does not fit in u8",
                    table.key
                ))
            })?;

            if entry.is_writable {
                lookup.writable_indexes.push(index);
                writable.push(entry.pubkey);
            } else {
                lookup.readonly_indexes.push(index);
                readonly.push(entry.pubkey);
            }
        }
        self.entries = remaining;

        if writable.is_empty() && readonly.is_empty() {
            return Ok(None);
        }
        Ok(Some((lookup, writable, readonly)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{AccountMeta, VersionedMessage, SYSTEM_PROGRAM_ID};

    fn key(b: u8) -> Pubkey {
        Pubkey::new([b; 32])
    }

    fn sample_ix() -> Instruction {
        Instruction {
            program_id: key(50),
            accounts: vec![
                AccountMeta::new(key(1), true),
                AccountMeta::new(key(2), false),
                AccountMeta::new_readonly(key(3), false),
                AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            ],
            data: vec![9, 9, 9],
        }
    }

    #[test]
    fn try_compile_without_tables_matches_legacy_layout() {
        let msg = MessageV0::try_compile(&key(1), &[sample_ix()], &[], &[4; 32]).unwrap();
        assert_eq!(
            msg.static_account_keys,
            vec![key(1), key(2), key(3), SYSTEM_PROGRAM_ID, key(50)]
        );
        assert_eq!(msg.header.num_readonly_unsigned_accounts, 3);
        assert!(msg.address_table_lookups.is_empty());
    }

    #[test]
    fn try_compile_loads_eligible_keys_from_table() {
        let table = AddressLookupTableAccount::new(
            key(200),
            vec![key(3), key(1), key(2), key(50)],
        );
        let msg = MessageV0::try_compile(&key(1), &[sample_ix()], &[table.clone()], &[4; 32])
            .unwrap();

        // Signer and program stay static.
        assert_eq!(
            msg.static_account_keys,
            vec![key(1), SYSTEM_PROGRAM_ID, key(50)]
        );
        assert_eq!(
            msg.address_table_lookups,
            vec![MessageAddressTableLookup {
                account_key: key(200),
                writable_indexes: vec![2],
                readonly_indexes: vec![0],
            }]
        );

        let resolved = msg.resolve_account_keys(&[table]).unwrap();
        assert_eq!(resolved, vec![key(1), SYSTEM_PROGRAM_ID, key(50), key(2), key(3)]);
        let ix = &msg.instructions[0];
        assert_eq!(resolved[ix.program_id_index as usize], key(50));
        let accounts: Vec<Pubkey> = ix
            .account_key_indexes
            .iter()
            .map(|&i| resolved[i as usize])
            .collect();
        assert_eq!(accounts, vec![key(1), key(2), key(3), SYSTEM_PROGRAM_ID]);
    }

    #[test]
    fn writable_flags_cover_loaded_keys() {
        let table = AddressLookupTableAccount::new(key(200), vec![key(3), key(2)]);
        let msg = MessageV0::try_compile(&key(1), &[sample_ix()], &[table], &[4; 32]).unwrap();
        // static: payer, system, program; loaded: key2 (w), key3 (r)
        assert!(msg.is_account_writable(0));
        assert!(!msg.is_account_writable(1));
        assert!(!msg.is_account_writable(2));
        assert!(msg.is_account_writable(3));
        assert!(!msg.is_account_writable(4));
        assert_eq!(msg.num_lookup_keys(), 2);
    }

    #[test]
    fn serialized_v0_has_prefix_and_decodes() {
        let table = AddressLookupTableAccount::new(key(200), vec![key(3), key(2)]);
        let msg = MessageV0::try_compile(&key(1), &[sample_ix()], &[table], &[4; 32]).unwrap();
        let bytes = msg.serialize().unwrap();
        assert_eq!(bytes[0], 0x80);
        assert_eq!(
            VersionedMessage::deserialize(&bytes).unwrap(),
            VersionedMessage::V0(msg)
        );
    }

    #[test]
    fn resolve_fails_for_missing_table() {
        let table = AddressLookupTableAccount::new(key(200), vec![key(3), key(2)]);
        let msg = MessageV0::try_compile(&key(1), &[sample_ix()], &[table], &[4; 32]).unwrap();
        assert!(msg.resolve_account_keys(&[]).is_err());
    }

    #[test]
    fn resolve_fails_for_index_past_table_end() {
        let msg = MessageV0 {
            static_account_keys: vec![key(1)],
            address_table_lookups: vec![MessageAddressTableLookup {
                account_key: key(200),
                writable_indexes: vec![5],
                readonly_indexes: vec![],
            }],
            ..Default::default()
        };
        let table = AddressLookupTableAccount::new(key(200), vec![key(3)]);
        let err = msg.resolve_account_keys(&[table]).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
