//! GRID validator node.
//!
//! Follows the GRID registry and market contracts into a local store and,
//! every epoch, challenges the nodes with running orders and settles their
//! providers' profits.

pub mod chain;
pub mod common;
pub mod config;
pub mod database;
pub mod dumper;
pub mod storage;
pub mod types;
pub mod validator;

pub use chain::{ChainClient, ChainError, EthersChainClient};
pub use config::{ConfigError, StorageBackend, ValidatorConfig};
pub use database::{Database, StoreError};
pub use dumper::{Dumper, DumperError, PollSummary};
pub use types::{NodeId, Proof, ProofResult};
pub use validator::{
    result_channel, GridValidator, Phase, ResultSender, SchedulerHandle, ValidatorError,
};
