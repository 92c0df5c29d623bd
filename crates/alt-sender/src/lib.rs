//! Address lookup table pipeline for Solana transactions.
//!
//! Takes a signed-ready transaction, moves every key that does not have to
//! stay static into a freshly created lookup table, recompiles the message as
//! v0 against that table, signs it and broadcasts it.
//!
//! The network and the signer are injected as [`SolanaRpc`] and
//! [`TransactionSigner`]; [`fixture::FixtureRpc`] stands in for the network
//! in tests.

pub mod compiler;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fixture;
pub mod network;
pub mod send_builder;
pub mod service;
pub mod signer;
pub mod split;
pub mod writer;

pub use compiler::{LegacyMessageCompiler, MessageV0Compiler};
pub use config::AltConfig;
pub use dispatcher::{
    ChunkedLookupTableDispatcher, DispatchState, FixedLookupTableDispatcher, LookupTableDispatcher,
};
pub use error::{AltError, AltResult};
pub use network::{BlockhashProvider, SolanaRpc};
pub use send_builder::SendTransactionBuilder;
pub use service::AltTransactionService;
pub use signer::{KeypairSigner, TransactionSigner};
pub use split::{
    AccountKeyUsage, AccountKeysSplitProvider, SignerAndProgramSplitProvider, SplitAccountKeys,
};
pub use writer::{LookupTableWriter, RpcLookupTableWriter};
