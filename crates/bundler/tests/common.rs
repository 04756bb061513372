use ethers::types::{Address, U256};
use pylon_bundler::{BundleExecutor, ExecutorConfig, ReceiptTimeoutPolicy};
use pylon_contracts::{mock::MockChainService, ChainService};
use pylon_mempool::{Mempool, Store};
use pylon_primitives::{UserOperation, UserOperationHash};
use std::{sync::Arc, time::Duration};

pub const ENTRY_POINT: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";
pub const BENEFICIARY: &str = "0x690B9A9E9aa1C9dB991C7721a92d351Db4FaC990";
pub const CHAIN_ID: u64 = 64_165;

pub struct TestContext {
    pub chain: Arc<MockChainService>,
    pub mempool: Mempool,
    pub store: Store,
    pub executor: Arc<BundleExecutor>,
}

pub fn config() -> ExecutorConfig {
    ExecutorConfig {
        beneficiary: BENEFICIARY.parse().unwrap(),
        bundle_interval: Duration::from_millis(10),
        max_bundle_size: 10,
        max_fee_multiplier_percent: 150,
        receipt_grace_ticks: 5,
        receipt_timeout_policy: ReceiptTimeoutPolicy::Requeue,
    }
}

pub async fn setup(config: ExecutorConfig) -> TestContext {
    let chain = Arc::new(MockChainService::new(CHAIN_ID, ENTRY_POINT.parse().unwrap()));
    let store = Store::in_memory().await.unwrap();
    let mempool = Mempool::new(store.clone());
    let executor = Arc::new(BundleExecutor::new(
        chain.clone() as Arc<dyn ChainService>,
        mempool.clone(),
        store.clone(),
        config,
    ));
    TestContext { chain, mempool, store, executor }
}

/// Admits an operation the way the RPC path would: hash from the chain
/// service, then into the mempool.
pub async fn admit(ctx: &TestContext, sender: Address, nonce: u64, max_fee: u64) -> UserOperationHash {
    let uo = UserOperation::default()
        .sender(sender)
        .nonce(nonce.into())
        .max_fee_per_gas(U256::from(max_fee))
        .max_priority_fee_per_gas(U256::from(max_fee / 2));
    let hash = ctx.chain.compute_user_op_hash(&uo).await.unwrap();
    ctx.mempool.add(uo, hash).await.unwrap();
    hash
}

pub fn addr(byte: u8) -> Address {
    Address::from([byte; 20])
}
