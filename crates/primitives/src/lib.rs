//! Pylon primitives: the basic types the bundler's components exchange.

pub mod constants;
mod record;
mod user_operation;
mod utils;
mod wallet;

pub use record::{BundleRecord, BundleStatus, StatusFields, UserOpStatus, UserOperationRecord};
pub use user_operation::{
    BundleTransactionReceipt, UserOperation, UserOperationGasEstimation, UserOperationHash,
    UserOperationReceipt, UserOperationRequest,
};
pub use utils::get_address;
pub use wallet::Wallet;
