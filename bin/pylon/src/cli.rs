use crate::utils::{parse_address, parse_timeout_policy};
use clap::Parser;
use ethers::types::Address;
use pylon_bundler::ReceiptTimeoutPolicy;
use pylon_primitives::constants::defaults;
use std::{
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
};

/// Bundler CLI args
#[derive(Debug, Clone, Parser)]
#[command(name = "pylon", about = "ERC-4337 account abstraction bundler", version)]
pub struct Opts {
    /// Ethereum execution client RPC endpoint.
    #[arg(long, default_value = "http://127.0.0.1:8545")]
    pub eth_client_address: String,

    /// EntryPoint contract address.
    #[arg(long, value_parser = parse_address)]
    pub entry_point: Address,

    /// Bundler signing key (hex private key).
    #[arg(long, env = "PYLON_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: String,

    /// Beneficiary address for gas refunds.
    ///
    /// By default, the signer address is used.
    #[arg(long, value_parser = parse_address)]
    pub beneficiary: Option<Address>,

    /// Expected chain id; startup aborts when the node reports another one.
    #[arg(long)]
    pub chain_id: u64,

    /// Path to the SQLite database file.
    #[arg(long, default_value = "pylon.db")]
    pub database_path: PathBuf,

    /// Sets the HTTP RPC address to listen on.
    #[arg(long = "http.addr", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub http_addr: IpAddr,

    /// Sets the HTTP RPC port to listen on.
    #[arg(long = "http.port", default_value_t = defaults::HTTP_PORT)]
    pub http_port: u16,

    /// Configures the allowed CORS domains.
    #[arg(long = "http.corsdomain", value_delimiter = ',', default_value = "*")]
    pub http_corsdomain: Vec<String>,

    /// The bundle interval in milliseconds.
    #[arg(long, default_value_t = defaults::BUNDLE_INTERVAL_MS)]
    pub bundle_interval_ms: u64,

    /// Maximum number of user operations per bundle.
    #[arg(long, default_value_t = defaults::MAX_BUNDLE_SIZE)]
    pub max_bundle_size: usize,

    /// Multiplier applied to the node-suggested max fee per gas.
    #[arg(long, default_value_t = 1.5)]
    pub max_fee_multiplier: f64,

    /// Bundle ticks to wait for a missing receipt before the timeout policy
    /// applies.
    #[arg(long = "receipt.grace-ticks", default_value_t = defaults::RECEIPT_GRACE_TICKS)]
    pub receipt_grace_ticks: u32,

    /// What happens to user operations whose bundle receipt never arrived:
    /// `requeue` makes them re-eligible, `fail` marks them failed.
    #[arg(long = "receipt.timeout-policy", default_value = "requeue", value_parser = parse_timeout_policy)]
    pub receipt_timeout_policy: ReceiptTimeoutPolicy,
}
