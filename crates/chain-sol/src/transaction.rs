//! Manual Solana transaction wire format and signing.
//!
//! Transactions are built by hand, without `solana-sdk`.
//! The wire format is a compact binary layout documented here:
//!
//! ```text
//! Transaction:
//!   num_signatures          compact-u16
//!   signatures              64 bytes * num_signatures
//!   message:
//!     [version prefix]      u8, only for v0 (0x80 | version)
//!     num_required_sigs     u8
//!     num_readonly_signed   u8
//!     num_readonly_unsigned u8
//!     num_accounts          compact-u16
//!     account_keys          32 bytes * num_accounts
//!     recent_blockhash      32 bytes
//!     num_instructions      compact-u16
//!     instructions[]        (see below)
//!     [address_table_lookups] only for v0, see `crate::v0`
//!
//! Instruction:
//!   program_id_index        u8
//!   num_accounts            compact-u16
//!   account_indices         u8 * num_accounts
//!   data_len                compact-u16
//!   data                    u8 * data_len
//! ```

use ed25519_dalek::Signer;
use zeroize::Zeroize;

use crate::address::{Pubkey, PUBKEY_BYTES};
use crate::error::SolError;
use crate::v0::{MessageV0, MESSAGE_VERSION_PREFIX};

// ---------------------------------------------------------------------------
// Well-known values
// ---------------------------------------------------------------------------

/// The Solana System Program public key: 32 zero bytes.
/// Base58: `11111111111111111111111111111111`
pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::new([0u8; 32]);

/// Length of an Ed25519 signature.
pub const SIGNATURE_BYTES: usize = 64;

/// Largest number of account keys addressable by a `u8` index.
pub const MAX_ACCOUNT_KEYS: usize = 256;

/// A recent blockhash as it appears on the wire.
pub type Blockhash = [u8; 32];

/// A detached Ed25519 signature.
pub type Signature = [u8; SIGNATURE_BYTES];

// ---------------------------------------------------------------------------
// Compact-u16 encoding
// ---------------------------------------------------------------------------

/// Encode a `u16` value in Solana's compact-u16 format.
///
/// - Values 0..0x7f       -> 1 byte
/// - Values 0x80..0x3fff  -> 2 bytes
/// - Values 0x4000..      -> 3 bytes (max 0x1_ffff, but u16 caps at 0xffff)
pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut val = value as u32;
    let mut out = Vec::with_capacity(3);

    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }

    out
}

/// Decode a compact-u16 value from a byte slice.
///
/// Returns `(value, bytes_consumed)` or an error if the data is truncated.
pub fn decode_compact_u16(data: &[u8]) -> Result<(u16, usize), SolError> {
    let mut value: u32 = 0;
    let mut consumed = 0usize;

    loop {
        let byte = *data.get(consumed).ok_or_else(|| {
            SolError::SerializationError(
                "unexpected end of data while decoding compact-u16".into(),
            )
        })?;
        value |= ((byte & 0x7f) as u32) << (7 * consumed);
        consumed += 1;

        if byte & 0x80 == 0 || consumed >= 3 {
            break;
        }
    }

    if value > u16::MAX as u32 {
        return Err(SolError::SerializationError(
            "compact-u16 value overflow".into(),
        ));
    }

    Ok((value as u16, consumed))
}

/// Append a length prefix, failing for lists the wire format cannot carry.
pub(crate) fn push_len(buf: &mut Vec<u8>, len: usize) -> Result<(), SolError> {
    let len = u16::try_from(len).map_err(|_| {
        SolError::SerializationError(format!("list of {len} items exceeds compact-u16"))
    })?;
    buf.extend_from_slice(&encode_compact_u16(len));
    Ok(())
}

/// Cursor over serialized message bytes.
pub(crate) struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub(crate) fn peek_u8(&self) -> Result<u8, SolError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| SolError::SerializationError("unexpected end of data".into()))
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, SolError> {
        let byte = self.peek_u8()?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], SolError> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.data.len());
        let end = end.ok_or_else(|| {
            SolError::SerializationError(format!(
                "need {len} bytes at offset {}, only {} left",
                self.pos,
                self.data.len().saturating_sub(self.pos)
            ))
        })?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn read_compact_u16(&mut self) -> Result<usize, SolError> {
        let (value, consumed) = decode_compact_u16(&self.data[self.pos.min(self.data.len())..])?;
        self.pos += consumed;
        Ok(value as usize)
    }

    pub(crate) fn read_pubkey(&mut self) -> Result<Pubkey, SolError> {
        Pubkey::from_slice(self.read_bytes(PUBKEY_BYTES)?)
    }

    pub(crate) fn read_blockhash(&mut self) -> Result<Blockhash, SolError> {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(self.read_bytes(32)?);
        Ok(hash)
    }

    pub(crate) fn read_pubkeys(&mut self) -> Result<Vec<Pubkey>, SolError> {
        let count = self.read_compact_u16()?;
        (0..count).map(|_| self.read_pubkey()).collect()
    }

    pub(crate) fn read_byte_list(&mut self) -> Result<Vec<u8>, SolError> {
        let len = self.read_compact_u16()?;
        Ok(self.read_bytes(len)?.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A single account reference in a Solana instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn new(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn new_readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// A Solana instruction (before it is compiled into a message).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// A compiled instruction where account references are replaced by u8 indices
/// into the message's resolved key array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    /// Index of the program to invoke.
    pub program_id_index: u8,
    /// Indices of each account the instruction reads or writes.
    pub account_key_indexes: Vec<u8>,
    /// Opaque instruction data.
    pub data: Vec<u8>,
}

impl CompiledInstruction {
    /// Compile `ix` against a fully resolved key list.
    pub fn compile(ix: &Instruction, keys: &[Pubkey]) -> Result<Self, SolError> {
        let index_of = |key: &Pubkey, what: &str| -> Result<u8, SolError> {
            keys.iter()
                .position(|k| k == key)
                .and_then(|i| u8::try_from(i).ok())
                .ok_or_else(|| {
                    SolError::TransactionBuildError(format!("{what} {key} not in account keys"))
                })
        };

        let program_id_index = index_of(&ix.program_id, "program id")?;
        let account_key_indexes = ix
            .accounts
            .iter()
            .map(|meta| index_of(&meta.pubkey, "account"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            program_id_index,
            account_key_indexes,
            data: ix.data.clone(),
        })
    }

    pub(crate) fn write(&self, buf: &mut Vec<u8>) -> Result<(), SolError> {
        buf.push(self.program_id_index);
        push_len(buf, self.account_key_indexes.len())?;
        buf.extend_from_slice(&self.account_key_indexes);
        push_len(buf, self.data.len())?;
        buf.extend_from_slice(&self.data);
        Ok(())
    }

    pub(crate) fn read(reader: &mut WireReader<'_>) -> Result<Self, SolError> {
        let program_id_index = reader.read_u8()?;
        let account_key_indexes = reader.read_byte_list()?;
        let data = reader.read_byte_list()?;
        Ok(Self {
            program_id_index,
            account_key_indexes,
            data,
        })
    }
}

/// The three-byte message header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageHeader {
    /// Number of required signatures (first N static keys are signers).
    pub num_required_signatures: u8,
    /// How many of the signing accounts are read-only.
    pub num_readonly_signed_accounts: u8,
    /// How many of the non-signing static accounts are read-only.
    pub num_readonly_unsigned_accounts: u8,
}

impl MessageHeader {
    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        buf.push(self.num_required_signatures);
        buf.push(self.num_readonly_signed_accounts);
        buf.push(self.num_readonly_unsigned_accounts);
    }

    pub(crate) fn read(reader: &mut WireReader<'_>) -> Result<Self, SolError> {
        Ok(Self {
            num_required_signatures: reader.read_u8()?,
            num_readonly_signed_accounts: reader.read_u8()?,
            num_readonly_unsigned_accounts: reader.read_u8()?,
        })
    }

    /// Writable flag of a static key at `index` given `num_static` keys.
    pub(crate) fn is_static_writable(&self, index: usize, num_static: usize) -> bool {
        let num_signed = self.num_required_signatures as usize;
        if index < num_signed {
            index < num_signed.saturating_sub(self.num_readonly_signed_accounts as usize)
        } else {
            let num_unsigned = num_static.saturating_sub(num_signed);
            let num_writable_unsigned =
                num_unsigned.saturating_sub(self.num_readonly_unsigned_accounts as usize);
            index - num_signed < num_writable_unsigned
        }
    }
}

// ---------------------------------------------------------------------------
// Account key compilation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub(crate) struct KeyEntry {
    pub(crate) pubkey: Pubkey,
    pub(crate) is_signer: bool,
    pub(crate) is_writable: bool,
    pub(crate) is_invoked: bool,
}

/// Unique account keys of an instruction list with merged permission bits.
#[derive(Debug, Clone)]
pub(crate) struct CompiledKeys {
    pub(crate) entries: Vec<KeyEntry>,
}

impl CompiledKeys {
    /// Collect keys with the fee payer first (always signer + writable).
    pub(crate) fn compile(instructions: &[Instruction], payer: &Pubkey) -> Self {
        let mut keys = Self {
            entries: Vec::new(),
        };
        keys.upsert(*payer, true, true, false);

        for ix in instructions {
            for meta in &ix.accounts {
                keys.upsert(meta.pubkey, meta.is_signer, meta.is_writable, false);
            }
            // Program IDs are non-signer, read-only accounts.
            keys.upsert(ix.program_id, false, false, true);
        }

        keys
    }

    fn upsert(&mut self, pubkey: Pubkey, signer: bool, writable: bool, invoked: bool) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.pubkey == pubkey) {
            entry.is_signer |= signer;
            entry.is_writable |= writable;
            entry.is_invoked |= invoked;
        } else {
            self.entries.push(KeyEntry {
                pubkey,
                is_signer: signer,
                is_writable: writable,
                is_invoked: invoked,
            });
        }
    }

    /// Sort into canonical order and derive the header:
    ///   1. writable signers  (fee payer first)
    ///   2. read-only signers
    ///   3. writable non-signers
    ///   4. read-only non-signers
    pub(crate) fn into_header_and_keys(mut self) -> Result<(MessageHeader, Vec<Pubkey>), SolError> {
        fn rank(e: &KeyEntry) -> u8 {
            match (e.is_signer, e.is_writable) {
                (true, true) => 0,
                (true, false) => 1,
                (false, true) => 2,
                (false, false) => 3,
            }
        }
        // Stable sort keeps insertion order within a category, so the fee
        // payer stays at index 0.
        self.entries.sort_by_key(rank);

        let count = |pred: fn(&KeyEntry) -> bool| -> Result<u8, SolError> {
            u8::try_from(self.entries.iter().filter(|e| pred(e)).count()).map_err(|_| {
                SolError::TransactionBuildError("too many accounts for message header".into())
            })
        };

        let header = MessageHeader {
            num_required_signatures: count(|e| e.is_signer)?,
            num_readonly_signed_accounts: count(|e| e.is_signer && !e.is_writable)?,
            num_readonly_unsigned_accounts: count(|e| !e.is_signer && !e.is_writable)?,
        };

        Ok((header, self.entries.into_iter().map(|e| e.pubkey).collect()))
    }
}

// ---------------------------------------------------------------------------
// Legacy message
// ---------------------------------------------------------------------------

/// A pre-v0 message: every account key is static.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyMessage {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: Blockhash,
    pub instructions: Vec<CompiledInstruction>,
}

impl LegacyMessage {
    /// Build a message from a set of instructions with a single fee payer.
    ///
    /// The fee payer is always the first signer and is placed at index 0 in
    /// the account keys.
    pub fn compile(
        instructions: &[Instruction],
        fee_payer: &Pubkey,
        recent_blockhash: &Blockhash,
    ) -> Result<Self, SolError> {
        let (header, account_keys) =
            CompiledKeys::compile(instructions, fee_payer).into_header_and_keys()?;

        if account_keys.len() > MAX_ACCOUNT_KEYS {
            return Err(SolError::TransactionBuildError(format!(
                "{} account keys exceed the {MAX_ACCOUNT_KEYS} addressable by a message",
                account_keys.len()
            )));
        }

        let instructions = instructions
            .iter()
            .map(|ix| CompiledInstruction::compile(ix, &account_keys))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            header,
            account_keys,
            recent_blockhash: *recent_blockhash,
            instructions,
        })
    }

    /// Serialize the message (the bytes that get signed).
    pub fn serialize(&self) -> Result<Vec<u8>, SolError> {
        let mut buf = Vec::with_capacity(256);
        self.header.write(&mut buf);

        push_len(&mut buf, self.account_keys.len())?;
        for key in &self.account_keys {
            buf.extend_from_slice(key.as_bytes());
        }

        buf.extend_from_slice(&self.recent_blockhash);

        push_len(&mut buf, self.instructions.len())?;
        for ix in &self.instructions {
            ix.write(&mut buf)?;
        }

        Ok(buf)
    }

    pub(crate) fn read(reader: &mut WireReader<'_>) -> Result<Self, SolError> {
        let header = MessageHeader::read(reader)?;
        let account_keys = reader.read_pubkeys()?;
        let recent_blockhash = reader.read_blockhash()?;
        let num_instructions = reader.read_compact_u16()?;
        let instructions = (0..num_instructions)
            .map(|_| CompiledInstruction::read(reader))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }

    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.account_keys.first()
    }

    pub fn is_signer(&self, index: usize) -> bool {
        index < self.header.num_required_signatures as usize
    }

    pub fn is_writable(&self, index: usize) -> bool {
        index < self.account_keys.len()
            && self
                .header
                .is_static_writable(index, self.account_keys.len())
    }

    /// Rebuild the instruction list with signer/writable metadata taken from
    /// the header.
    pub fn decompile_instructions(&self) -> Result<Vec<Instruction>, SolError> {
        let key_at = |index: u8| -> Result<Pubkey, SolError> {
            self.account_keys
                .get(index as usize)
                .copied()
                .ok_or_else(|| {
                    SolError::SerializationError(format!(
                        "account index {index} out of range for {} keys",
                        self.account_keys.len()
                    ))
                })
        };

        self.instructions
            .iter()
            .map(|ix| {
                let accounts = ix
                    .account_key_indexes
                    .iter()
                    .map(|&i| {
                        Ok(AccountMeta {
                            pubkey: key_at(i)?,
                            is_signer: self.is_signer(i as usize),
                            is_writable: self.is_writable(i as usize),
                        })
                    })
                    .collect::<Result<Vec<_>, SolError>>()?;

                Ok(Instruction {
                    program_id: key_at(ix.program_id_index)?,
                    accounts,
                    data: ix.data.clone(),
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Versioned message / transaction
// ---------------------------------------------------------------------------

/// Either message encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionedMessage {
    Legacy(LegacyMessage),
    V0(MessageV0),
}

impl VersionedMessage {
    pub fn header(&self) -> &MessageHeader {
        match self {
            Self::Legacy(m) => &m.header,
            Self::V0(m) => &m.header,
        }
    }

    pub fn static_account_keys(&self) -> &[Pubkey] {
        match self {
            Self::Legacy(m) => &m.account_keys,
            Self::V0(m) => &m.static_account_keys,
        }
    }

    pub fn recent_blockhash(&self) -> &Blockhash {
        match self {
            Self::Legacy(m) => &m.recent_blockhash,
            Self::V0(m) => &m.recent_blockhash,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, SolError> {
        match self {
            Self::Legacy(m) => m.serialize(),
            Self::V0(m) => m.serialize(),
        }
    }

    /// Decode a message, detecting the encoding from the first byte.
    pub fn deserialize(data: &[u8]) -> Result<Self, SolError> {
        let mut reader = WireReader::new(data);
        let message = Self::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(SolError::SerializationError(format!(
                "{} trailing bytes after message",
                data.len() - reader.position()
            )));
        }
        Ok(message)
    }

    pub(crate) fn read(reader: &mut WireReader<'_>) -> Result<Self, SolError> {
        let first = reader.peek_u8()?;
        if first & MESSAGE_VERSION_PREFIX == 0 {
            return LegacyMessage::read(reader).map(Self::Legacy);
        }

        reader.read_u8()?;
        match first & !MESSAGE_VERSION_PREFIX {
            0 => MessageV0::read_body(reader).map(Self::V0),
            version => Err(SolError::SerializationError(format!(
                "unsupported message version {version}"
            ))),
        }
    }
}

/// A transaction envelope: signature slots followed by a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedTransaction {
    pub signatures: Vec<Signature>,
    pub message: VersionedMessage,
}

impl VersionedTransaction {
    /// Wrap `message` with one zeroed signature slot per required signer.
    pub fn new_unsigned(message: VersionedMessage) -> Self {
        let slots = message.header().num_required_signatures as usize;
        Self {
            signatures: vec![[0u8; SIGNATURE_BYTES]; slots],
            message,
        }
    }

    /// Bytes covered by every signature.
    pub fn message_data(&self) -> Result<Vec<u8>, SolError> {
        self.message.serialize()
    }

    /// Place `signature` into the slot belonging to `signer`.
    pub fn add_signature(&mut self, signer: &Pubkey, signature: Signature) -> Result<(), SolError> {
        let num_signers = self.message.header().num_required_signatures as usize;
        let slot = self
            .message
            .static_account_keys()
            .iter()
            .take(num_signers)
            .position(|k| k == signer)
            .ok_or_else(|| {
                SolError::SigningError(format!("{signer} not found in transaction signers"))
            })?;

        let target = self.signatures.get_mut(slot).ok_or_else(|| {
            SolError::SigningError(format!("no signature slot at index {slot}"))
        })?;
        *target = signature;
        Ok(())
    }

    /// Serialize into wire format, ready to be submitted via `sendTransaction`.
    pub fn serialize(&self) -> Result<Vec<u8>, SolError> {
        let message = self.message.serialize()?;
        let mut wire = Vec::with_capacity(3 + self.signatures.len() * SIGNATURE_BYTES + message.len());
        push_len(&mut wire, self.signatures.len())?;
        for sig in &self.signatures {
            wire.extend_from_slice(sig);
        }
        wire.extend_from_slice(&message);
        Ok(wire)
    }

    pub fn deserialize(raw_tx: &[u8]) -> Result<Self, SolError> {
        let mut reader = WireReader::new(raw_tx);
        let num_sigs = reader.read_compact_u16()?;
        let signatures = (0..num_sigs)
            .map(|_| {
                let mut sig = [0u8; SIGNATURE_BYTES];
                sig.copy_from_slice(reader.read_bytes(SIGNATURE_BYTES)?);
                Ok(sig)
            })
            .collect::<Result<Vec<_>, SolError>>()?;

        let message = VersionedMessage::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(SolError::SerializationError(
                "trailing bytes after transaction message".into(),
            ));
        }

        Ok(Self {
            signatures,
            message,
        })
    }
}

// ---------------------------------------------------------------------------
// Ed25519 helpers
// ---------------------------------------------------------------------------

/// Public key of the Ed25519 keypair built from a 32-byte seed.
pub fn keypair_public_key(private_key: &[u8; 32]) -> Pubkey {
    let mut seed = *private_key;
    let signing_key = ed25519_dalek::SigningKey::from_bytes(&seed);
    seed.zeroize();
    Pubkey::new(signing_key.verifying_key().to_bytes())
}

/// Sign `message` with the Ed25519 seed `private_key`.
pub fn sign_message(private_key: &[u8; 32], message: &[u8]) -> Signature {
    // Build the signing key (zeroize-on-drop via ed25519-dalek).
    let mut seed = *private_key;
    let signing_key = ed25519_dalek::SigningKey::from_bytes(&seed);
    seed.zeroize();
    signing_key.sign(message).to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> Pubkey {
        Pubkey::new([b; 32])
    }

    fn transfer_ix(from: Pubkey, to: Pubkey) -> Instruction {
        let mut data = 2u32.to_le_bytes().to_vec();
        data.extend_from_slice(&1_000u64.to_le_bytes());
        Instruction {
            program_id: SYSTEM_PROGRAM_ID,
            accounts: vec![AccountMeta::new(from, true), AccountMeta::new(to, false)],
            data,
        }
    }

    // -- compact-u16 --------------------------------------------------------

    #[test]
    fn compact_u16_boundaries() {
        assert_eq!(encode_compact_u16(0), vec![0x00]);
        assert_eq!(encode_compact_u16(0x7f), vec![0x7f]);
        assert_eq!(encode_compact_u16(128), vec![0x80, 0x01]);
        assert_eq!(encode_compact_u16(16383), vec![0xff, 0x7f]);
        assert_eq!(encode_compact_u16(16384), vec![0x80, 0x80, 0x01]);
        assert_eq!(encode_compact_u16(u16::MAX), vec![0xff, 0xff, 0x03]);
    }

    #[test]
    fn decode_compact_u16_three_bytes() {
        let (val, len) = decode_compact_u16(&[0x80, 0x80, 0x01]).unwrap();
        assert_eq!(val, 16384);
        assert_eq!(len, 3);
    }

    #[test]
    fn decode_compact_u16_empty_input_fails() {
        assert!(decode_compact_u16(&[]).is_err());
    }

    #[test]
    fn decode_compact_u16_truncated_fails() {
        assert!(decode_compact_u16(&[0x80]).is_err());
    }

    #[test]
    fn decode_compact_u16_overflow_fails() {
        assert!(decode_compact_u16(&[0xff, 0xff, 0x7f]).is_err());
    }

    // -- Legacy compilation -------------------------------------------------

    #[test]
    fn legacy_compile_account_order() {
        let tx = LegacyMessage::compile(&[transfer_ix(key(1), key(2))], &key(1), &[0xAA; 32])
            .unwrap();

        // from (signer+writable), to (writable), system program (read-only)
        assert_eq!(tx.account_keys, vec![key(1), key(2), SYSTEM_PROGRAM_ID]);
        assert_eq!(tx.header.num_required_signatures, 1);
        assert_eq!(tx.header.num_readonly_signed_accounts, 0);
        assert_eq!(tx.header.num_readonly_unsigned_accounts, 1);
        assert_eq!(tx.instructions[0].program_id_index, 2);
        assert_eq!(tx.instructions[0].account_key_indexes, vec![0, 1]);
    }

    #[test]
    fn legacy_compile_keeps_payer_first_when_not_in_instructions() {
        let payer = key(9);
        let tx = LegacyMessage::compile(&[transfer_ix(key(1), key(2))], &payer, &[0; 32]).unwrap();
        assert_eq!(tx.fee_payer(), Some(&payer));
        assert_eq!(tx.header.num_required_signatures, 2);
    }

    #[test]
    fn self_transfer_deduplicates_accounts() {
        let tx = LegacyMessage::compile(&[transfer_ix(key(1), key(1))], &key(1), &[0; 32]).unwrap();
        assert_eq!(tx.account_keys.len(), 2);
    }

    #[test]
    fn legacy_writable_flags_follow_header() {
        let tx = LegacyMessage::compile(&[transfer_ix(key(1), key(2))], &key(1), &[0; 32]).unwrap();
        assert!(tx.is_writable(0));
        assert!(tx.is_writable(1));
        assert!(!tx.is_writable(2));
        assert!(!tx.is_writable(3));
        assert!(tx.is_signer(0));
        assert!(!tx.is_signer(1));
    }

    #[test]
    fn decompile_restores_metas() {
        let ix = transfer_ix(key(1), key(2));
        let tx = LegacyMessage::compile(&[ix.clone()], &key(1), &[0; 32]).unwrap();
        assert_eq!(tx.decompile_instructions().unwrap(), vec![ix]);
    }

    #[test]
    fn legacy_serialize_contains_blockhash() {
        let blockhash = [0xCCu8; 32];
        let tx = LegacyMessage::compile(&[transfer_ix(key(1), key(2))], &key(1), &blockhash).unwrap();
        let msg = tx.serialize().unwrap();

        assert_eq!(&msg[..3], &[1, 0, 1]);
        // header(3) + compact(1) + 3 keys
        let offset = 3 + 1 + 32 * 3;
        assert_eq!(&msg[offset..offset + 32], &blockhash);
    }

    #[test]
    fn legacy_message_decodes_to_same_value() {
        let tx = LegacyMessage::compile(&[transfer_ix(key(1), key(2))], &key(1), &[7; 32]).unwrap();
        let bytes = tx.serialize().unwrap();
        let decoded = VersionedMessage::deserialize(&bytes).unwrap();
        assert_eq!(decoded, VersionedMessage::Legacy(tx));
    }

    #[test]
    fn truncated_message_fails() {
        let tx = LegacyMessage::compile(&[transfer_ix(key(1), key(2))], &key(1), &[7; 32]).unwrap();
        let bytes = tx.serialize().unwrap();
        assert!(VersionedMessage::deserialize(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn unknown_version_is_rejected() {
        assert!(VersionedMessage::deserialize(&[0x81, 1, 0, 0]).is_err());
    }

    // -- Signing ------------------------------------------------------------

    #[test]
    fn signed_transaction_verifies() {
        use ed25519_dalek::{Signature as DalekSig, VerifyingKey};

        let private_key = [0x42u8; 32];
        let payer = keypair_public_key(&private_key);
        let message = LegacyMessage::compile(&[transfer_ix(payer, key(2))], &payer, &[0xCC; 32])
            .unwrap();

        let mut tx = VersionedTransaction::new_unsigned(VersionedMessage::Legacy(message));
        let data = tx.message_data().unwrap();
        tx.add_signature(&payer, sign_message(&private_key, &data)).unwrap();
        let wire = tx.serialize().unwrap();

        assert_eq!(wire[0], 0x01);
        let sig = DalekSig::from_bytes(&wire[1..65].try_into().unwrap());
        let vk = VerifyingKey::from_bytes(payer.as_bytes()).unwrap();
        assert!(vk.verify_strict(&wire[65..], &sig).is_ok());

        assert_eq!(VersionedTransaction::deserialize(&wire).unwrap(), tx);
    }

    #[test]
    fn signature_for_unknown_signer_fails() {
        let message = LegacyMessage::compile(&[transfer_ix(key(1), key(2))], &key(1), &[0; 32])
            .unwrap();
        let mut tx = VersionedTransaction::new_unsigned(VersionedMessage::Legacy(message));
        let err = tx.add_signature(&key(2), [1u8; 64]).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn sign_message_deterministic() {
        let private_key = [0x55u8; 32];
        assert_eq!(
            sign_message(&private_key, b"payload"),
            sign_message(&private_key, b"payload")
        );
    }

    #[test]
    fn deserialize_rejects_truncated_signatures() {
        assert!(VersionedTransaction::deserialize(&[0x01, 0x00]).is_err());
        assert!(VersionedTransaction::deserialize(&[]).is_err());
    }
}
