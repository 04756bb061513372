//! The bundler's JSON-RPC server: the ERC-4337 `eth` namespace plus the
//! `net`/`web3` helpers and the read-only operator endpoints.

mod error;
mod eth;
pub mod eth_api;
mod middleware;
mod net;
pub mod net_api;
mod rpc;
mod web3;
pub mod web3_api;

pub use error::JsonRpcError;
pub use eth::EthApiServerImpl;
pub use middleware::OperatorLayer;
pub use net::NetApiServerImpl;
pub use rpc::JsonRpcServer;
pub use web3::Web3ApiServerImpl;
