//! Network collaborator seam and the blockhash source built on it.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use chain_sol::{AddressLookupTableAccount, Blockhash, LookupTableState, Pubkey};

use crate::error::{AltError, AltResult};

/// RPC calls the pipeline needs. Implementations map transport failures to
/// [`AltError::Network`] with the underlying message intact.
#[async_trait]
pub trait SolanaRpc: Send + Sync {
    /// Latest blockhash, Base58-encoded.
    async fn get_latest_blockhash(&self) -> AltResult<String>;

    async fn get_slot(&self) -> AltResult<u64>;

    /// Fetch a lookup table, or `None` if the account is not visible yet.
    async fn get_address_lookup_table(
        &self,
        key: &Pubkey,
    ) -> AltResult<Option<AddressLookupTableAccount>>;

    /// Broadcast a Base64 wire transaction and return its id.
    async fn send_raw(&self, base64_transaction: String, started_at: SystemTime)
        -> AltResult<String>;
}

/// Decode raw lookup table account data fetched by an RPC implementation.
pub fn lookup_table_from_account_data(
    key: Pubkey,
    data: &[u8],
) -> AltResult<AddressLookupTableAccount> {
    let state = LookupTableState::deserialize(data)?;
    Ok(AddressLookupTableAccount::new(key, state.addresses))
}

/// Supplies fresh blockhashes.
#[derive(Clone)]
pub struct BlockhashProvider {
    rpc: Arc<dyn SolanaRpc>,
}

impl BlockhashProvider {
    pub fn new(rpc: Arc<dyn SolanaRpc>) -> Self {
        Self { rpc }
    }

    pub async fn latest(&self) -> AltResult<Blockhash> {
        let encoded = self.rpc.get_latest_blockhash().await?;
        let bytes = bs58::decode(&encoded)
            .into_vec()
            .map_err(|e| AltError::Network(format!("blockhash {encoded} is not base58: {e}")))?;
        bytes.try_into().map_err(|v: Vec<u8>| {
            AltError::Network(format!("blockhash must be 32 bytes, got {}", v.len()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        pub Rpc {}

        #[async_trait]
        impl SolanaRpc for Rpc {
            async fn get_latest_blockhash(&self) -> AltResult<String>;
            async fn get_slot(&self) -> AltResult<u64>;
            async fn get_address_lookup_table(&self, key: &Pubkey) -> AltResult<Option<AddressLookupTableAccount>>;
            async fn send_raw(&self, base64_transaction: String, started_at: SystemTime) -> AltResult<String>;
        }
    }

    fn provider_returning(result: fn() -> AltResult<String>) -> BlockhashProvider {
        let mut rpc = MockRpc::new();
        rpc.expect_get_latest_blockhash()
            .times(1)
            .returning(move || result());
        BlockhashProvider::new(Arc::new(rpc))
    }

    #[tokio::test]
    async fn decodes_base58_blockhash() {
        let provider = provider_returning(|| Ok(bs58::encode([9u8; 32]).into_string()));
        assert_eq!(provider.latest().await.unwrap(), [9u8; 32]);
    }

    #[tokio::test]
    async fn rejects_short_blockhash() {
        let provider = provider_returning(|| Ok(bs58::encode([9u8; 8]).into_string()));
        assert!(matches!(provider.latest().await, Err(AltError::Network(_))));
    }

    #[tokio::test]
    async fn propagates_rpc_failure() {
        let provider = provider_returning(|| Err(AltError::Network("timeout".into())));
        let err = provider.latest().await.unwrap_err();
        assert_eq!(err.to_string(), "network error: timeout");
    }

    #[test]
    fn decodes_table_account_data() {
        let state = LookupTableState {
            deactivation_slot: u64::MAX,
            last_extended_slot: 3,
            last_extended_slot_start_index: 0,
            authority: Some(Pubkey::new([1; 32])),
            addresses: vec![Pubkey::new([2; 32]), Pubkey::new([3; 32])],
        };
        let table = lookup_table_from_account_data(Pubkey::new([8; 32]), &state.serialize()).unwrap();
        assert_eq!(table.key, Pubkey::new([8; 32]));
        assert_eq!(table.addresses, state.addresses);
    }
}
