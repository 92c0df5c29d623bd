//! Signing capability seam.

use async_trait::async_trait;
use chain_sol::{keypair_public_key, sign_message, Pubkey, Signature};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::AltResult;

/// Produces Ed25519 signatures for one wallet key. Hardware-backed signers
/// may suspend while the user confirms.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    async fn sign(&self, message: &[u8]) -> AltResult<Signature>;
}

/// In-process signer over a 32-byte Ed25519 seed.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeypairSigner {
    seed: [u8; 32],
    #[zeroize(skip)]
    pubkey: Pubkey,
}

impl KeypairSigner {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let pubkey = keypair_public_key(&seed);
        Self { seed, pubkey }
    }
}

#[async_trait]
impl TransactionSigner for KeypairSigner {
    fn pubkey(&self) -> Pubkey {
        self.pubkey
    }

    async fn sign(&self, message: &[u8]) -> AltResult<Signature> {
        Ok(sign_message(&self.seed, message))
    }
}
