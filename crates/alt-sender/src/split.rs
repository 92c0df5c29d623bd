//! Static versus offloadable account key classification.

use chain_sol::{LegacyMessage, MessageV0, Pubkey};

/// How a message uses one key of its resolved key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountKeyUsage {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
    /// Referenced as a program id by at least one instruction.
    pub is_invoked: bool,
}

impl AccountKeyUsage {
    /// Usage of every key of a v0 message, given its resolved key list.
    pub fn from_v0(message: &MessageV0, resolved_keys: &[Pubkey]) -> Vec<Self> {
        resolved_keys
            .iter()
            .enumerate()
            .map(|(index, pubkey)| Self {
                pubkey: *pubkey,
                is_signer: message.is_signer(index),
                is_writable: message.is_account_writable(index),
                is_invoked: message
                    .instructions
                    .iter()
                    .any(|ix| ix.program_id_index as usize == index),
            })
            .collect()
    }

    pub fn from_legacy(message: &LegacyMessage) -> Vec<Self> {
        message
            .account_keys
            .iter()
            .enumerate()
            .map(|(index, pubkey)| Self {
                pubkey: *pubkey,
                is_signer: message.is_signer(index),
                is_writable: message.is_writable(index),
                is_invoked: message
                    .instructions
                    .iter()
                    .any(|ix| ix.program_id_index as usize == index),
            })
            .collect()
    }
}

/// Result of a split: ordered static keys with their writable flag, and the
/// keys that may move into a lookup table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitAccountKeys {
    pub static_keys: Vec<(Pubkey, bool)>,
    pub lookup_keys: Vec<Pubkey>,
}

impl SplitAccountKeys {
    pub fn static_pubkeys(&self) -> Vec<Pubkey> {
        self.static_keys.iter().map(|(key, _)| *key).collect()
    }
}

/// Policy deciding which keys must stay static.
///
/// Static keys must come back fee payer first, then writable keys, then
/// readonly keys; the recompiled header is derived from that order.
pub trait AccountKeysSplitProvider: Send + Sync {
    fn split_static_account_keys(&self, keys: &[AccountKeyUsage]) -> SplitAccountKeys;
}

/// Keeps signers and invoked programs static and offloads every other key.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignerAndProgramSplitProvider;

impl AccountKeysSplitProvider for SignerAndProgramSplitProvider {
    fn split_static_account_keys(&self, keys: &[AccountKeyUsage]) -> SplitAccountKeys {
        let mut static_keys: Vec<(Pubkey, bool)> = Vec::new();
        let mut lookup_keys = Vec::new();

        for usage in keys {
            if static_keys.iter().any(|(k, _)| *k == usage.pubkey)
                || lookup_keys.contains(&usage.pubkey)
            {
                continue;
            }
            if usage.is_signer || usage.is_invoked {
                // Invoked programs are never writable.
                static_keys.push((usage.pubkey, usage.is_writable && !usage.is_invoked));
            } else {
                lookup_keys.push(usage.pubkey);
            }
        }

        // Stable: the fee payer is the first writable signer.
        static_keys.sort_by_key(|(_, writable)| !writable);

        SplitAccountKeys {
            static_keys,
            lookup_keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_sol::{AccountMeta, Instruction};

    fn key(b: u8) -> Pubkey {
        Pubkey::new([b; 32])
    }

    fn usage(b: u8, is_signer: bool, is_writable: bool, is_invoked: bool) -> AccountKeyUsage {
        AccountKeyUsage {
            pubkey: key(b),
            is_signer,
            is_writable,
            is_invoked,
        }
    }

    #[test]
    fn keeps_signers_and_programs_static() {
        let split = SignerAndProgramSplitProvider.split_static_account_keys(&[
            usage(1, true, true, false),
            usage(2, false, true, false),
            usage(3, false, false, true),
            usage(4, false, false, false),
        ]);

        assert_eq!(split.static_keys, vec![(key(1), true), (key(3), false)]);
        assert_eq!(split.lookup_keys, vec![key(2), key(4)]);
    }

    #[test]
    fn readonly_static_keys_follow_writable_ones() {
        let split = SignerAndProgramSplitProvider.split_static_account_keys(&[
            usage(9, false, false, true),
            usage(1, true, true, false),
        ]);
        assert_eq!(split.static_pubkeys(), vec![key(1), key(9)]);
    }

    #[test]
    fn duplicate_keys_are_classified_once() {
        let split = SignerAndProgramSplitProvider.split_static_account_keys(&[
            usage(1, true, true, false),
            usage(2, false, true, false),
            usage(2, false, false, false),
        ]);
        assert_eq!(split.lookup_keys, vec![key(2)]);
    }

    #[test]
    fn legacy_usage_marks_programs() {
        let ix = Instruction {
            program_id: key(7),
            accounts: vec![AccountMeta::new(key(1), true), AccountMeta::new(key(2), false)],
            data: vec![],
        };
        let message = LegacyMessage::compile(&[ix], &key(1), &[0; 32]).unwrap();
        let usages = AccountKeyUsage::from_legacy(&message);

        assert_eq!(usages.len(), 3);
        assert!(usages[0].is_signer && usages[0].is_writable);
        assert!(!usages[1].is_signer && usages[1].is_writable);
        assert!(usages[2].is_invoked && !usages[2].is_writable);
    }
}
