//! Scriptable in-memory chain service for tests.

use crate::{ChainError, ChainService, GasFees, SimulationOutcome};
use async_trait::async_trait;
use ethers::{
    types::{Address, TransactionReceipt, H256, U256, U64},
    utils::keccak256,
};
use parking_lot::RwLock;
use pylon_primitives::{UserOperation, UserOperationHash};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    time::Duration,
};

/// A bundle submission recorded by the mock.
#[derive(Clone, Debug)]
pub struct SubmittedBundle {
    pub ops: Vec<UserOperation>,
    pub beneficiary: Address,
    pub gas_limit: U256,
    pub fees: GasFees,
    pub tx_hash: H256,
}

/// Chain service whose responses are scripted up front. Hashes are computed
/// locally with the same construction the EntryPoint uses, so they agree with
/// `UserOperation::hash`.
pub struct MockChainService {
    chain_id: u64,
    entry_point: Address,
    nonces: RwLock<HashMap<Address, U256>>,
    rejections: RwLock<HashMap<Address, String>>,
    hash_failures: RwLock<HashSet<Address>>,
    fees: RwLock<GasFees>,
    gas_estimate: RwLock<U256>,
    submit_failure: RwLock<Option<String>>,
    receipts: RwLock<VecDeque<Option<TransactionReceipt>>>,
    receipt_delay: RwLock<Duration>,
    submitted: RwLock<Vec<SubmittedBundle>>,
}

impl MockChainService {
    pub fn new(chain_id: u64, entry_point: Address) -> Self {
        Self {
            chain_id,
            entry_point,
            nonces: RwLock::new(HashMap::new()),
            rejections: RwLock::new(HashMap::new()),
            hash_failures: RwLock::new(HashSet::new()),
            fees: RwLock::new(GasFees {
                max_fee_per_gas: U256::from(2_000_000_000_u64),
                max_priority_fee_per_gas: U256::from(1_000_000_000_u64),
                base_fee_per_gas: Some(U256::from(1_000_000_000_u64)),
            }),
            gas_estimate: RwLock::new(U256::from(500_000_u64)),
            submit_failure: RwLock::new(None),
            receipts: RwLock::new(VecDeque::new()),
            receipt_delay: RwLock::new(Duration::ZERO),
            submitted: RwLock::new(Vec::new()),
        }
    }

    /// Sets the on-chain next-nonce for a sender.
    pub fn set_nonce(&self, sender: Address, nonce: U256) {
        self.nonces.write().insert(sender, nonce);
    }

    /// Makes simulation reject every operation from the sender.
    pub fn reject_simulation(&self, sender: Address, reason: &str) {
        self.rejections.write().insert(sender, reason.into());
    }

    /// Makes hash computation fail for the sender (chain unavailable).
    pub fn fail_hash_for(&self, sender: Address) {
        self.hash_failures.write().insert(sender);
    }

    pub fn set_gas_estimate(&self, estimate: U256) {
        *self.gas_estimate.write() = estimate;
    }

    pub fn set_fees(&self, fees: GasFees) {
        *self.fees.write() = fees;
    }

    /// Makes the next submissions fail with a provider error.
    pub fn fail_submit(&self, reason: &str) {
        *self.submit_failure.write() = Some(reason.into());
    }

    /// Queues the result of the next `wait_for_receipt` call; `None` means
    /// timeout. An empty queue also times out.
    pub fn push_receipt(&self, receipt: Option<TransactionReceipt>) {
        self.receipts.write().push_back(receipt);
    }

    /// Makes `wait_for_receipt` sleep before answering.
    pub fn set_receipt_delay(&self, delay: Duration) {
        *self.receipt_delay.write() = delay;
    }

    /// Every bundle submitted so far, in order.
    pub fn submitted(&self) -> Vec<SubmittedBundle> {
        self.submitted.read().clone()
    }
}

#[async_trait]
impl ChainService for MockChainService {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn entry_point_address(&self) -> Address {
        self.entry_point
    }

    async fn compute_user_op_hash(
        &self,
        uo: &UserOperation,
    ) -> Result<UserOperationHash, ChainError> {
        if self.hash_failures.read().contains(&uo.sender) {
            return Err(ChainError::Provider { inner: "chain unavailable".into() });
        }
        Ok(uo.hash(&self.entry_point, self.chain_id))
    }

    async fn get_nonce(&self, sender: &Address, _key: U256) -> Result<U256, ChainError> {
        Ok(self.nonces.read().get(sender).copied().unwrap_or_default())
    }

    async fn simulate_validation(
        &self,
        uo: &UserOperation,
    ) -> Result<SimulationOutcome, ChainError> {
        match self.rejections.read().get(&uo.sender) {
            Some(reason) => {
                Ok(SimulationOutcome::Rejected { reason: reason.clone(), data: None })
            }
            None => Ok(SimulationOutcome::Valid),
        }
    }

    async fn current_fees(&self) -> Result<GasFees, ChainError> {
        Ok(*self.fees.read())
    }

    async fn estimate_bundle_gas(
        &self,
        _uos: &[UserOperation],
        _beneficiary: Address,
    ) -> Result<U256, ChainError> {
        Ok(*self.gas_estimate.read())
    }

    async fn submit_bundle(
        &self,
        uos: &[UserOperation],
        beneficiary: Address,
        gas_limit: U256,
        fees: GasFees,
    ) -> Result<H256, ChainError> {
        if let Some(reason) = self.submit_failure.read().clone() {
            return Err(ChainError::Provider { inner: reason });
        }

        let mut submitted = self.submitted.write();
        let mut seed = Vec::with_capacity(32 * uos.len() + 8);
        for uo in uos {
            seed.extend_from_slice(uo.hash(&self.entry_point, self.chain_id).as_fixed_bytes());
        }
        seed.extend_from_slice(&(submitted.len() as u64).to_be_bytes());
        let tx_hash = H256::from(keccak256(seed));

        submitted.push(SubmittedBundle {
            ops: uos.to_vec(),
            beneficiary,
            gas_limit,
            fees,
            tx_hash,
        });
        Ok(tx_hash)
    }

    async fn wait_for_receipt(
        &self,
        _tx_hash: H256,
        _timeout: Duration,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        let delay = *self.receipt_delay.read();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.receipts.write().pop_front().flatten())
    }
}

/// A minimal receipt for scripted confirmations.
pub fn receipt(status: u64, gas_used: u64, block_number: u64, effective_gas_price: u64) -> TransactionReceipt {
    TransactionReceipt {
        status: Some(U64::from(status)),
        gas_used: Some(U256::from(gas_used)),
        block_number: Some(U64::from(block_number)),
        effective_gas_price: Some(U256::from(effective_gas_price)),
        ..Default::default()
    }
}
