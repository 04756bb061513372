//! Periodic bundle assembly: selection, submission and reconciliation of
//! user operation bundles against the EntryPoint.

mod executor;

pub use executor::{
    bundle_hash, BundleExecutor, BundleSummary, ExecutorConfig, ReceiptTimeoutPolicy, TickOutcome,
};
