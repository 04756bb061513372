use crate::net_api::NetApiServer;
use async_trait::async_trait;
use jsonrpsee::core::RpcResult;

pub struct NetApiServerImpl {
    pub chain_id: u64,
}

#[async_trait]
impl NetApiServer for NetApiServerImpl {
    async fn version(&self) -> RpcResult<String> {
        Ok(self.chain_id.to_string())
    }
}
