use crate::{ChainError, EntryPoint};
use async_trait::async_trait;
use ethers::{
    middleware::SignerMiddleware,
    providers::Middleware,
    signers::{LocalWallet, Signer},
    types::{
        transaction::eip2718::TypedTransaction, Address, BlockNumber, TransactionReceipt, H256,
        U256,
    },
};
use pylon_primitives::{constants::defaults, UserOperation, UserOperationHash, Wallet};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::trace;

/// EIP-1559 fee caps as suggested by the node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GasFees {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub base_fee_per_gas: Option<U256>,
}

/// Outcome of an EntryPoint validation simulation. Both variants are regular
/// results; only environmental failures surface as `ChainError`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimulationOutcome {
    Valid,
    Rejected {
        reason: String,
        /// Raw revert payload, when available
        data: Option<ethers::types::Bytes>,
    },
}

impl SimulationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, SimulationOutcome::Valid)
    }
}

/// The narrow chain interface the mempool, validator and executor consume.
/// All read-path operations are idempotent.
#[async_trait]
pub trait ChainService: Send + Sync {
    /// Chain id the service was constructed against
    fn chain_id(&self) -> u64;

    /// Address of the supported EntryPoint
    fn entry_point_address(&self) -> Address;

    /// The operation hash as computed by the EntryPoint
    async fn compute_user_op_hash(
        &self,
        uo: &UserOperation,
    ) -> Result<UserOperationHash, ChainError>;

    /// Current next-nonce for the sender under the given key
    async fn get_nonce(&self, sender: &Address, key: U256) -> Result<U256, ChainError>;

    /// Static-call `simulateValidation` and classify the revert
    async fn simulate_validation(&self, uo: &UserOperation)
        -> Result<SimulationOutcome, ChainError>;

    /// Node-suggested EIP-1559 fees
    async fn current_fees(&self) -> Result<GasFees, ChainError>;

    /// Gas estimate for a `handleOps` bundle
    async fn estimate_bundle_gas(
        &self,
        uos: &[UserOperation],
        beneficiary: Address,
    ) -> Result<U256, ChainError>;

    /// Sign and send the `handleOps` transaction; returns its hash without
    /// waiting for inclusion
    async fn submit_bundle(
        &self,
        uos: &[UserOperation],
        beneficiary: Address,
        gas_limit: U256,
        fees: GasFees,
    ) -> Result<H256, ChainError>;

    /// Poll for the transaction receipt; `None` when the timeout elapses
    async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        timeout: Duration,
    ) -> Result<Option<TransactionReceipt>, ChainError>;
}

/// Chain service over an Ethereum execution client with the bundler's signer.
#[derive(Clone)]
pub struct EthereumChain<M: Middleware + 'static> {
    client: Arc<SignerMiddleware<Arc<M>, LocalWallet>>,
    entry_point: EntryPoint<SignerMiddleware<Arc<M>, LocalWallet>>,
    chain_id: u64,
}

impl<M: Middleware + 'static> EthereumChain<M> {
    pub async fn new(
        eth_client: Arc<M>,
        entry_point_address: Address,
        wallet: Wallet,
    ) -> Result<Self, ChainError> {
        let chain_id = eth_client
            .get_chainid()
            .await
            .map_err(ChainError::provider)?
            .as_u64();
        let client = Arc::new(SignerMiddleware::new(eth_client, wallet.signer));
        let entry_point = EntryPoint::new(client.clone(), entry_point_address);
        Ok(Self { client, entry_point, chain_id })
    }

    /// Address the bundle transactions are sent from
    pub fn signer_address(&self) -> Address {
        self.client.signer().address()
    }

    fn prepare_handle_ops_tx(&self, uos: &[UserOperation], beneficiary: Address) -> TypedTransaction {
        let mut tx = self.entry_point.handle_ops_tx(uos, beneficiary);
        tx.set_from(self.signer_address());
        tx
    }
}

#[async_trait]
impl<M: Middleware + 'static> ChainService for EthereumChain<M> {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn entry_point_address(&self) -> Address {
        self.entry_point.address()
    }

    async fn compute_user_op_hash(
        &self,
        uo: &UserOperation,
    ) -> Result<UserOperationHash, ChainError> {
        self.entry_point.get_user_op_hash(uo).await.map(Into::into)
    }

    async fn get_nonce(&self, sender: &Address, key: U256) -> Result<U256, ChainError> {
        self.entry_point.get_nonce(sender, key).await
    }

    async fn simulate_validation(
        &self,
        uo: &UserOperation,
    ) -> Result<SimulationOutcome, ChainError> {
        self.entry_point.simulate_validation(uo).await
    }

    async fn current_fees(&self) -> Result<GasFees, ChainError> {
        let (max_fee_per_gas, max_priority_fee_per_gas) = self
            .client
            .estimate_eip1559_fees(None)
            .await
            .map_err(ChainError::provider)?;
        let base_fee_per_gas = self
            .client
            .get_block(BlockNumber::Latest)
            .await
            .map_err(ChainError::provider)?
            .and_then(|block| block.base_fee_per_gas);
        Ok(GasFees { max_fee_per_gas, max_priority_fee_per_gas, base_fee_per_gas })
    }

    async fn estimate_bundle_gas(
        &self,
        uos: &[UserOperation],
        beneficiary: Address,
    ) -> Result<U256, ChainError> {
        let tx = self.prepare_handle_ops_tx(uos, beneficiary);
        self.client.estimate_gas(&tx, None).await.map_err(|err| {
            match crate::error::middleware_revert_data::<SignerMiddleware<Arc<M>, LocalWallet>>(
                &err,
            ) {
                Some(data) => ChainError::from_revert_data(data),
                None => ChainError::provider(err),
            }
        })
    }

    async fn submit_bundle(
        &self,
        uos: &[UserOperation],
        beneficiary: Address,
        gas_limit: U256,
        fees: GasFees,
    ) -> Result<H256, ChainError> {
        let mut tx = self.prepare_handle_ops_tx(uos, beneficiary);

        let nonce = self
            .client
            .get_transaction_count(self.signer_address(), None)
            .await
            .map_err(ChainError::provider)?;
        tx.set_gas(gas_limit).set_nonce(nonce).set_chain_id(self.chain_id);
        match tx {
            TypedTransaction::Eip1559(ref mut inner) => {
                inner.max_fee_per_gas = Some(fees.max_fee_per_gas);
                inner.max_priority_fee_per_gas = Some(fees.max_priority_fee_per_gas);
            }
            _ => {
                tx.set_gas_price(fees.max_fee_per_gas);
            }
        }

        trace!("sending bundle transaction to the execution client: {tx:?}");

        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(ChainError::provider)?;
        Ok(pending.tx_hash())
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        timeout: Duration,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        let poll_interval = Duration::from_millis(defaults::RECEIPT_POLL_INTERVAL_MS);
        let deadline = Instant::now() + timeout;

        loop {
            let receipt = self
                .client
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(ChainError::provider)?;
            if receipt.is_some() {
                return Ok(receipt);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }
}
