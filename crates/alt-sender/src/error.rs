use chain_sol::{Pubkey, SolError};
use thiserror::Error;

pub type AltResult<T> = Result<T, AltError>;

/// Errors raised while offloading keys and rebuilding a transaction.
#[derive(Debug, Error)]
pub enum AltError {
    #[error("no input keys to place in a lookup table")]
    NoInputKeys,

    #[error("key not found in static keys or any address lookup table")]
    KeyNotFoundInStaticOrAnyAlt,

    #[error("address lookup table {0} not found")]
    LookupTableNotFound(Pubkey),

    #[error("account index {index} out of range for {len} resolved keys")]
    AccountIndexOutOfRange { index: u8, len: usize },

    #[error("too many account keys: {0}")]
    TooManyAccountKeys(usize),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error(transparent)]
    Sol(#[from] SolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_key_not_found() {
        assert_eq!(
            AltError::KeyNotFoundInStaticOrAnyAlt.to_string(),
            "key not found in static keys or any address lookup table"
        );
    }

    #[test]
    fn display_index_out_of_range() {
        let err = AltError::AccountIndexOutOfRange { index: 9, len: 4 };
        assert_eq!(
            err.to_string(),
            "account index 9 out of range for 4 resolved keys"
        );
    }

    #[test]
    fn network_message_is_kept_verbatim() {
        let err = AltError::Network("429 Too Many Requests".into());
        assert_eq!(err.to_string(), "network error: 429 Too Many Requests");
    }

    #[test]
    fn sol_errors_are_transparent() {
        let err: AltError = SolError::SerializationError("truncated".into()).into();
        assert_eq!(err.to_string(), "serialization error: truncated");
    }
}
