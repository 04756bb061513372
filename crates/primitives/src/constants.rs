//! Constants shared across the bundler's components.

/// JSON-RPC error codes used by the bundler RPC surface.
pub mod rpc_error_codes {
    /// Malformed JSON-RPC envelope or empty batch
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Malformed params, including user operation format errors
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Bundler-reserved: validation, unsupported entry point, mempool policy
    pub const BUNDLER: i32 = -32500;
}

/// Configuration defaults.
pub mod defaults {
    pub const HTTP_PORT: u16 = 4337;
    pub const BUNDLE_INTERVAL_MS: u64 = 15_000;
    pub const MAX_BUNDLE_SIZE: usize = 10;
    /// Applied to the node's suggested max fee per gas, in percent
    pub const MAX_FEE_MULTIPLIER_PERCENT: u64 = 150;
    /// Ticks a submitted bundle may wait for its receipt before the timeout
    /// policy kicks in
    pub const RECEIPT_GRACE_TICKS: u32 = 5;
    /// How often `wait_for_receipt` polls the node
    pub const RECEIPT_POLL_INTERVAL_MS: u64 = 500;
}

/// Gas accounting constants for the conservative estimation fallback.
pub mod gas {
    /// Base cost of any transaction
    pub const TX_BASE_GAS: u64 = 21_000;
    /// Calldata cost per byte assumed by the conservative estimate
    pub const CALL_DATA_BYTE_GAS: u64 = 16;
    /// Default call gas limit when simulation cannot yield an exact value
    pub const DEFAULT_CALL_GAS_LIMIT: u64 = 100_000;
    /// Safety margin applied to estimates and bundle gas limits, in percent
    pub const ESTIMATE_MARGIN_PERCENT: u64 = 120;
}

/// Entry point metadata.
pub mod entry_point {
    /// Supported EntryPoint contract version
    pub const VERSION: &str = "0.6.0";
}
