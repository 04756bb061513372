use ethers::types::{Address, Bytes, U256};
use pylon_contracts::ChainError;
use pylon_primitives::UserOperationHash;
use thiserror::Error;

/// Persistence errors. The store is the commit point for admission, so these
/// are fatal for the operation that hit them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert collided with an existing `user_op_hash`
    #[error("duplicate user operation hash")]
    DuplicateHash,

    /// A stored value did not parse back
    #[error("corrupt record: {inner}")]
    Corrupt { inner: String },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Admission errors raised by the mempool itself.
#[derive(Debug, Error)]
pub enum MempoolError {
    /// The hash is already tracked in memory
    #[error("user operation {hash} already in mempool")]
    DuplicateInMempool { hash: UserOperationHash },

    /// Another pending operation from the sender holds this nonce
    #[error("nonce {nonce} already used by a pending user operation from {sender:?}")]
    NonceReused { sender: Address, nonce: U256 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the admission pipeline: format, nonce freshness, simulation.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or malformed; `field` is the wire name
    #[error("invalid-{field}")]
    InvalidField { field: &'static str },

    /// The nonce is below the account's current next-nonce
    #[error("nonce too low: {nonce} < {current}")]
    NonceTooLow { nonce: U256, current: U256 },

    /// The EntryPoint rejected the operation during simulation
    #[error("simulation failed: {reason}")]
    Simulation { reason: String, data: Option<Bytes> },

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Errors surfaced by the uopool service to the RPC layer, which owns the
/// translation into JSON-RPC error objects.
#[derive(Debug, Error)]
pub enum UoPoolError {
    #[error("Unsupported EntryPoint: {given:?}")]
    UnsupportedEntryPoint { given: Address, supported: Address },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Mempool(#[from] MempoolError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
