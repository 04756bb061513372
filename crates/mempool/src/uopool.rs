use crate::{
    estimate_user_op_gas, Mempool, Store, UoPoolError, UserOpValidator,
};
use ethers::types::{Address, U256, U64};
use pylon_contracts::ChainService;
use pylon_primitives::{
    BundleTransactionReceipt, UserOpStatus, UserOperationGasEstimation, UserOperationHash,
    UserOperationReceipt, UserOperationRecord, UserOperationRequest,
};
use std::sync::Arc;
use tracing::info;

/// The backend service the RPC layer talks to: validation, admission and the
/// read paths over the store. One instance serves the single configured
/// EntryPoint.
#[derive(Clone)]
pub struct UoPool {
    chain: Arc<dyn ChainService>,
    validator: Arc<UserOpValidator>,
    mempool: Mempool,
    store: Store,
    entry_point: Address,
    chain_id: u64,
}

impl UoPool {
    pub fn new(chain: Arc<dyn ChainService>, mempool: Mempool, store: Store) -> Self {
        let entry_point = chain.entry_point_address();
        let chain_id = chain.chain_id();
        let validator = Arc::new(UserOpValidator::new(chain.clone()));
        Self { chain, validator, mempool, store, entry_point, chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn supported_entry_points(&self) -> Vec<String> {
        vec![format!("{:?}", self.entry_point)]
    }

    // Addresses are compared in their canonical (lowercased) form, which the
    // typed representation already is.
    fn check_entry_point(&self, entry_point: Address) -> Result<(), UoPoolError> {
        if entry_point != self.entry_point {
            return Err(UoPoolError::UnsupportedEntryPoint {
                given: entry_point,
                supported: self.entry_point,
            });
        }
        Ok(())
    }

    /// Validates and admits a user operation; returns its EntryPoint hash.
    pub async fn add_user_operation(
        &self,
        request: UserOperationRequest,
        entry_point: Address,
    ) -> Result<UserOperationHash, UoPoolError> {
        self.check_entry_point(entry_point)?;
        let (uo, hash) = self.validator.validate(&request).await?;
        self.mempool.add(uo, hash).await?;
        info!("{hash} admitted to the mempool");
        Ok(hash)
    }

    /// Format-checks the operation and returns conservative gas defaults.
    pub async fn estimate_user_operation_gas(
        &self,
        request: UserOperationRequest,
        entry_point: Address,
    ) -> Result<UserOperationGasEstimation, UoPoolError> {
        self.check_entry_point(entry_point)?;
        let uo = UserOpValidator::check_format(&request)?;
        Ok(estimate_user_op_gas(&uo))
    }

    pub async fn get_user_operation_by_hash(
        &self,
        hash: &UserOperationHash,
    ) -> Result<Option<UserOperationRecord>, UoPoolError> {
        Ok(self.store.get_user_op_by_hash(hash).await?)
    }

    /// Builds the receipt for an executed operation; `None` until the
    /// enclosing bundle transaction reached a terminal state.
    pub async fn get_user_operation_receipt(
        &self,
        hash: &UserOperationHash,
    ) -> Result<Option<UserOperationReceipt>, UoPoolError> {
        let Some(record) = self.store.get_user_op_by_hash(hash).await? else {
            return Ok(None);
        };
        match record.status {
            UserOpStatus::Confirmed | UserOpStatus::Failed => {
                Ok(Some(self.build_receipt(&record)))
            }
            _ => Ok(None),
        }
    }

    fn build_receipt(&self, record: &UserOperationRecord) -> UserOperationReceipt {
        let uo = &record.user_operation;
        let success = record.status == UserOpStatus::Confirmed;
        let gas_used = record.gas_used.unwrap_or_default();
        let gas_cost = record.gas_cost.unwrap_or_default();
        let effective_gas_price = if gas_used.is_zero() { U256::zero() } else { gas_cost / gas_used };

        UserOperationReceipt {
            user_op_hash: record.user_op_hash,
            entry_point: self.entry_point,
            sender: uo.sender,
            nonce: uo.nonce,
            paymaster: uo.paymaster(),
            actual_gas_cost: gas_cost,
            actual_gas_used: gas_used,
            success,
            reason: record.error_message.clone(),
            logs: vec![],
            receipt: BundleTransactionReceipt {
                transaction_hash: record.tx_hash.unwrap_or_default(),
                block_number: record.block_number.map(U64::from).unwrap_or_default(),
                from: Address::zero(),
                to: self.entry_point,
                cumulative_gas_used: gas_used,
                gas_used,
                logs: vec![],
                logs_bloom: "0x0".into(),
                status: if success { U64::one() } else { U64::zero() },
                effective_gas_price,
            },
        }
    }

    // Operator surface

    pub async fn pending_count(&self) -> usize {
        self.mempool.pending_count().await
    }

    pub async fn pending_hashes(&self) -> Vec<UserOperationHash> {
        self.mempool.pending_hashes().await
    }

    /// Stored records in the given status; also doubles as a liveness probe
    /// of the persistence layer for the health endpoint.
    pub async fn stored_count(&self, status: UserOpStatus) -> Result<i64, UoPoolError> {
        Ok(self.store.count_by_status(status).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Bytes, H256};
    use pylon_contracts::mock::MockChainService;
    use pylon_primitives::UserOperation;

    const ENTRY_POINT: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";

    async fn uopool() -> UoPool {
        let chain = Arc::new(MockChainService::new(64_165, ENTRY_POINT.parse().unwrap()));
        let store = Store::in_memory().await.unwrap();
        let mempool = Mempool::new(store.clone());
        UoPool::new(chain, mempool, store)
    }

    fn request(sender: &str, nonce: u64) -> UserOperationRequest {
        UserOperationRequest::from(
            UserOperation::default()
                .sender(sender.parse().unwrap())
                .nonce(nonce.into())
                .max_fee_per_gas(1_000_000_000u64.into()),
        )
    }

    #[tokio::test]
    async fn admission_happy_path() {
        let pool = uopool().await;
        let hash = pool
            .add_user_operation(
                request("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", 0),
                ENTRY_POINT.parse().unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(pool.pending_count().await, 1);
        let record = pool.get_user_operation_by_hash(&hash).await.unwrap().unwrap();
        assert_eq!(record.status, UserOpStatus::Pending);
    }

    #[tokio::test]
    async fn unsupported_entry_point_rejected() {
        let pool = uopool().await;
        let err = pool
            .add_user_operation(
                request("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", 0),
                "0xdeaddeaddeaddeaddeaddeaddeaddeaddeaddead".parse().unwrap(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Unsupported EntryPoint"));
        assert_eq!(pool.pending_count().await, 0);
    }

    #[tokio::test]
    async fn receipt_null_until_terminal() {
        let pool = uopool().await;
        let hash = pool
            .add_user_operation(
                request("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", 0),
                ENTRY_POINT.parse().unwrap(),
            )
            .await
            .unwrap();

        assert!(pool.get_user_operation_receipt(&hash).await.unwrap().is_none());

        pool.mempool().mark_submitted(&hash, H256::repeat_byte(7)).await.unwrap();
        assert!(pool.get_user_operation_receipt(&hash).await.unwrap().is_none());

        pool.mempool()
            .mark_confirmed(&hash, 0x5208.into(), 0xa410.into(), 0x10)
            .await
            .unwrap();
        let receipt = pool.get_user_operation_receipt(&hash).await.unwrap().unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.actual_gas_used, U256::from(0x5208));
        assert_eq!(receipt.receipt.transaction_hash, H256::repeat_byte(7));
        assert_eq!(receipt.receipt.status, U64::one());
        assert_eq!(receipt.receipt.block_number, U64::from(0x10));
        assert_eq!(receipt.receipt.effective_gas_price, U256::from(2));
    }

    #[tokio::test]
    async fn receipt_reports_paymaster_and_failure_reason() {
        let pool = uopool().await;
        let mut req = request("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", 0);
        req.paymaster_and_data = Some(Bytes::from(vec![0xcc; 24]));
        let hash = pool
            .add_user_operation(req, ENTRY_POINT.parse().unwrap())
            .await
            .unwrap();

        pool.mempool().mark_submitted(&hash, H256::repeat_byte(7)).await.unwrap();
        pool.mempool().mark_failed(&hash, "transaction-reverted").await.unwrap();

        let receipt = pool.get_user_operation_receipt(&hash).await.unwrap().unwrap();
        assert!(!receipt.success);
        assert_eq!(receipt.reason.as_deref(), Some("transaction-reverted"));
        assert_eq!(
            receipt.paymaster,
            Some("0xcccccccccccccccccccccccccccccccccccccccc".parse().unwrap())
        );
        assert_eq!(receipt.receipt.status, U64::zero());
    }

    #[tokio::test]
    async fn estimate_checks_entry_point_and_format() {
        let pool = uopool().await;
        let est = pool
            .estimate_user_operation_gas(
                request("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", 0),
                ENTRY_POINT.parse().unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(est.call_gas_limit, U256::from(100_000));

        let mut bad = request("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", 0);
        bad.signature = None;
        assert!(pool
            .estimate_user_operation_gas(bad, ENTRY_POINT.parse().unwrap())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn supported_entry_points_lowercased() {
        let pool = uopool().await;
        assert_eq!(
            pool.supported_entry_points(),
            vec!["0x5ff137d4b0fdcd49dca30c7cf57e578a026d2789".to_string()]
        );
    }
}
