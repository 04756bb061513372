use ethers::types::U256;
use jsonrpsee::{
    http_client::{HttpClient, HttpClientBuilder},
    server::ServerHandle,
};
use pylon_contracts::{mock::MockChainService, ChainService};
use pylon_mempool::{Mempool, Store, UoPool};
use pylon_rpc::{
    eth_api::EthApiServer, net_api::NetApiServer, web3_api::Web3ApiServer, EthApiServerImpl,
    JsonRpcServer, NetApiServerImpl, OperatorLayer, Web3ApiServerImpl,
};
use pylon_primitives::{UserOperation, UserOperationRequest};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

pub const ENTRY_POINT: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";
pub const CHAIN_ID: u64 = 64_165;

pub struct TestServer {
    pub addr: SocketAddr,
    pub chain: Arc<MockChainService>,
    pub uopool: Arc<UoPool>,
    // dropping the handle stops the server
    pub handle: ServerHandle,
}

pub async fn start_server() -> TestServer {
    let chain = Arc::new(MockChainService::new(CHAIN_ID, ENTRY_POINT.parse().unwrap()));
    let store = Store::in_memory().await.unwrap();
    let mempool = Mempool::new(store.clone());
    let uopool = Arc::new(UoPool::new(
        chain.clone() as Arc<dyn ChainService>,
        mempool,
        store,
    ));

    let mut server = JsonRpcServer::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
        .with_cors(&["*".to_string()])
        .with_operator(OperatorLayer::new(uopool.clone()));
    server.add_methods(EthApiServerImpl { uopool: uopool.clone() }.into_rpc()).unwrap();
    server.add_methods(NetApiServerImpl { chain_id: CHAIN_ID }.into_rpc()).unwrap();
    server.add_methods(Web3ApiServerImpl {}.into_rpc()).unwrap();

    let (addr, handle) = server.start().await.unwrap();
    TestServer { addr, chain, uopool, handle }
}

pub fn client(addr: &SocketAddr) -> HttpClient {
    HttpClientBuilder::default().build(format!("http://{addr}")).unwrap()
}

pub fn request(sender: &str, nonce: u64) -> UserOperationRequest {
    UserOperationRequest::from(
        UserOperation::default()
            .sender(sender.parse().unwrap())
            .nonce(nonce.into())
            .max_fee_per_gas(U256::from(0x3b9aca00_u64)),
    )
}
