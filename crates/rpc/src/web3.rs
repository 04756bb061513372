use crate::web3_api::Web3ApiServer;
use async_trait::async_trait;
use jsonrpsee::core::RpcResult;
use pylon_primitives::constants::entry_point;

pub struct Web3ApiServerImpl {}

#[async_trait]
impl Web3ApiServer for Web3ApiServerImpl {
    async fn client_version(&self) -> RpcResult<String> {
        Ok(format!(
            "pylon/{}/entrypoint-{}",
            env!("CARGO_PKG_VERSION"),
            entry_point::VERSION
        ))
    }
}
