pub use crate::net::NetApiServerImpl;
use jsonrpsee::{core::RpcResult, proc_macros::rpc};

/// The `net` namespace RPC methods trait
#[rpc(server, namespace = "net")]
pub trait NetApi {
    /// The chain id as a decimal string.
    #[method(name = "version")]
    async fn version(&self) -> RpcResult<String>;
}
