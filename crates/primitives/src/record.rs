//! Persisted lifecycle records for user operations and bundles.

use crate::{UserOperation, UserOperationHash};
use ethers::types::{H256, U256};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle status of a user operation record.
///
/// Allowed transitions are `pending -> submitted -> {confirmed, failed}` and
/// `pending -> removed`; there are no back-transitions (the receipt-timeout
/// requeue is the single sanctioned exception, see the store).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserOpStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
    Removed,
}

impl UserOpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserOpStatus::Pending => "pending",
            UserOpStatus::Submitted => "submitted",
            UserOpStatus::Confirmed => "confirmed",
            UserOpStatus::Failed => "failed",
            UserOpStatus::Removed => "removed",
        }
    }

    /// Terminal statuses never leave the store and never re-enter the mempool
    pub fn is_terminal(&self) -> bool {
        matches!(self, UserOpStatus::Confirmed | UserOpStatus::Failed | UserOpStatus::Removed)
    }
}

impl std::fmt::Display for UserOpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error)]
#[error("unknown status: {0}")]
pub struct InvalidStatus(String);

impl FromStr for UserOpStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UserOpStatus::Pending),
            "submitted" => Ok(UserOpStatus::Submitted),
            "confirmed" => Ok(UserOpStatus::Confirmed),
            "failed" => Ok(UserOpStatus::Failed),
            "removed" => Ok(UserOpStatus::Removed),
            other => Err(InvalidStatus(other.into())),
        }
    }
}

/// Lifecycle status of a bundle record. The `pending` state is never observed
/// externally; bundles are persisted as `submitted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

impl BundleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleStatus::Pending => "pending",
            BundleStatus::Submitted => "submitted",
            BundleStatus::Confirmed => "confirmed",
            BundleStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BundleStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BundleStatus::Pending),
            "submitted" => Ok(BundleStatus::Submitted),
            "confirmed" => Ok(BundleStatus::Confirmed),
            "failed" => Ok(BundleStatus::Failed),
            other => Err(InvalidStatus(other.into())),
        }
    }
}

/// A user operation together with everything the bundler learns about it over
/// its lifetime. `user_op_hash` is the primary key.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationRecord {
    pub user_op_hash: UserOperationHash,
    #[serde(flatten)]
    pub user_operation: UserOperation,
    pub status: UserOpStatus,
    pub tx_hash: Option<H256>,
    pub gas_used: Option<U256>,
    pub gas_cost: Option<U256>,
    pub error_message: Option<String>,
    pub block_number: Option<u64>,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
    pub submitted_at: Option<i64>,
    pub confirmed_at: Option<i64>,
}

impl UserOperationRecord {
    /// A freshly admitted record: pending, with only the creation timestamp set.
    pub fn new(user_op_hash: UserOperationHash, user_operation: UserOperation, created_at: i64) -> Self {
        Self {
            user_op_hash,
            user_operation,
            status: UserOpStatus::Pending,
            tx_hash: None,
            gas_used: None,
            gas_cost: None,
            error_message: None,
            block_number: None,
            created_at,
            submitted_at: None,
            confirmed_at: None,
        }
    }
}

/// Optional fields carried along with a status transition.
#[derive(Clone, Debug, Default)]
pub struct StatusFields {
    pub tx_hash: Option<H256>,
    pub gas_used: Option<U256>,
    pub gas_cost: Option<U256>,
    pub error_message: Option<String>,
    pub block_number: Option<u64>,
}

/// An on-chain submission of an ordered batch of user operations.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRecord {
    /// keccak256 of the member hashes concatenated in selection order
    pub bundle_hash: H256,
    pub tx_hash: Option<H256>,
    pub user_op_count: u32,
    pub total_gas_used: Option<U256>,
    pub total_gas_cost: Option<U256>,
    pub status: BundleStatus,
    pub block_number: Option<u64>,
    pub created_at: i64,
    pub submitted_at: Option<i64>,
    pub confirmed_at: Option<i64>,
}
