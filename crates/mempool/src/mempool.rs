use crate::{MempoolError, Store, StoreError};
use chrono::Utc;
use ethers::types::{Address, H256, U256};
use metrics::{counter, gauge};
use pylon_primitives::{StatusFields, UserOpStatus, UserOperation, UserOperationHash, UserOperationRecord};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

const MEMPOOL_SIZE: &str = "pylon_mempool_size";
const MEMPOOL_ADDED: &str = "pylon_mempool_added";
const MEMPOOL_REJECTED: &str = "pylon_mempool_rejected";

/// A pooled user operation together with its hash, as handed to the executor.
#[derive(Clone, Debug)]
pub struct PooledUserOperation {
    pub hash: UserOperationHash,
    pub user_operation: UserOperation,
}

struct PoolEntry {
    uo: UserOperation,
    /// Admission order; the executor's stable sort ties on it
    seq: u64,
    /// Set once the operation left in a bundle; the entry stays visible but
    /// is no longer eligible for selection
    submitted: bool,
}

#[derive(Default)]
struct PoolInner {
    by_hash: HashMap<UserOperationHash, PoolEntry>,
    by_nonce: HashMap<Address, HashSet<U256>>,
    next_seq: u64,
}

impl PoolInner {
    fn insert(&mut self, hash: UserOperationHash, uo: UserOperation) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_nonce.entry(uo.sender).or_default().insert(uo.nonce);
        self.by_hash.insert(hash, PoolEntry { uo, seq, submitted: false });
    }

    fn evict(&mut self, hash: &UserOperationHash) -> Option<PoolEntry> {
        let entry = self.by_hash.remove(hash)?;
        if let Some(nonces) = self.by_nonce.get_mut(&entry.uo.sender) {
            nonces.remove(&entry.uo.nonce);
            if nonces.is_empty() {
                self.by_nonce.remove(&entry.uo.sender);
            }
        }
        Some(entry)
    }
}

/// In-memory projection of the pending set, synchronized to the store on
/// every mutation. One exclusive lock guards all state; for admission the
/// store insert happens inside the critical section, making the duplicate
/// checks atomic with the commit point.
#[derive(Clone)]
pub struct Mempool {
    inner: Arc<Mutex<PoolInner>>,
    store: Store,
}

impl Mempool {
    pub fn new(store: Store) -> Self {
        Self { inner: Arc::new(Mutex::new(PoolInner::default())), store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Rebuilds both maps from the store's pending set.
    pub async fn reload(&self) -> Result<usize, StoreError> {
        let pending = self.store.list_pending(-1).await?;
        let mut inner = self.inner.lock().await;
        inner.by_hash.clear();
        inner.by_nonce.clear();
        for record in pending {
            inner.insert(record.user_op_hash, record.user_operation);
        }
        let count = inner.by_hash.len();
        gauge!(MEMPOOL_SIZE).set(count as f64);
        info!("mempool reloaded with {count} pending user operations");
        Ok(count)
    }

    /// Admits a validated user operation. Rejects duplicates by hash and
    /// reused `(sender, nonce)` pairs before touching the store; the store
    /// insert is the commit point, so in-memory state is only updated after
    /// it succeeds.
    pub async fn add(
        &self,
        uo: UserOperation,
        hash: UserOperationHash,
    ) -> Result<(), MempoolError> {
        let mut inner = self.inner.lock().await;

        if inner.by_hash.contains_key(&hash) {
            counter!(MEMPOOL_REJECTED, "reason" => "duplicate-in-mempool").increment(1);
            return Err(MempoolError::DuplicateInMempool { hash });
        }
        if inner
            .by_nonce
            .get(&uo.sender)
            .map_or(false, |nonces| nonces.contains(&uo.nonce))
        {
            counter!(MEMPOOL_REJECTED, "reason" => "nonce-reused").increment(1);
            return Err(MempoolError::NonceReused { sender: uo.sender, nonce: uo.nonce });
        }

        let record = UserOperationRecord::new(hash, uo.clone(), Utc::now().timestamp_millis());
        self.store.save_user_op(&record).await?;

        inner.insert(hash, uo);
        counter!(MEMPOOL_ADDED).increment(1);
        gauge!(MEMPOOL_SIZE).increment(1f64);
        debug!("{hash} added to the mempool");
        Ok(())
    }

    pub async fn get(&self, hash: &UserOperationHash) -> Option<UserOperation> {
        self.inner.lock().await.by_hash.get(hash).map(|e| e.uo.clone())
    }

    pub async fn contains(&self, hash: &UserOperationHash) -> bool {
        self.inner.lock().await.by_hash.contains_key(hash)
    }

    /// Snapshot of the operations eligible for bundling, in admission order.
    /// Entries already out in a bundle are skipped.
    pub async fn get_all(&self) -> Vec<PooledUserOperation> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<(&UserOperationHash, &PoolEntry)> =
            inner.by_hash.iter().filter(|(_, e)| !e.submitted).collect();
        entries.sort_by_key(|(_, e)| e.seq);
        entries
            .into_iter()
            .map(|(hash, e)| PooledUserOperation { hash: *hash, user_operation: e.uo.clone() })
            .collect()
    }

    pub async fn get_by_sender(&self, sender: &Address) -> Vec<PooledUserOperation> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<(&UserOperationHash, &PoolEntry)> =
            inner.by_hash.iter().filter(|(_, e)| e.uo.sender == *sender).collect();
        entries.sort_by_key(|(_, e)| e.seq);
        entries
            .into_iter()
            .map(|(hash, e)| PooledUserOperation { hash: *hash, user_operation: e.uo.clone() })
            .collect()
    }

    /// Number of in-memory entries (pending plus in-flight submitted).
    pub async fn pending_count(&self) -> usize {
        self.inner.lock().await.by_hash.len()
    }

    pub async fn pending_hashes(&self) -> Vec<UserOperationHash> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<(&UserOperationHash, &PoolEntry)> = inner.by_hash.iter().collect();
        entries.sort_by_key(|(_, e)| e.seq);
        entries.into_iter().map(|(hash, _)| *hash).collect()
    }

    /// Write-through submitted transition. The entry stays in both maps so
    /// the `(sender, nonce)` pair remains reserved, but it drops out of
    /// bundle selection until it is confirmed, failed or requeued.
    pub async fn mark_submitted(
        &self,
        hash: &UserOperationHash,
        tx_hash: H256,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        self.store
            .update_user_op_status(
                hash,
                UserOpStatus::Submitted,
                StatusFields { tx_hash: Some(tx_hash), ..Default::default() },
            )
            .await?;
        if let Some(entry) = inner.by_hash.get_mut(hash) {
            entry.submitted = true;
        }
        Ok(())
    }

    /// Write-through confirmed transition; the entry leaves both maps.
    pub async fn mark_confirmed(
        &self,
        hash: &UserOperationHash,
        gas_used: U256,
        gas_cost: U256,
        block_number: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        self.store
            .update_user_op_status(
                hash,
                UserOpStatus::Confirmed,
                StatusFields {
                    gas_used: Some(gas_used),
                    gas_cost: Some(gas_cost),
                    block_number: Some(block_number),
                    ..Default::default()
                },
            )
            .await?;
        if inner.evict(hash).is_some() {
            gauge!(MEMPOOL_SIZE).decrement(1f64);
        }
        Ok(())
    }

    /// Write-through failed transition; the entry leaves both maps.
    pub async fn mark_failed(
        &self,
        hash: &UserOperationHash,
        error_message: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        self.store
            .update_user_op_status(
                hash,
                UserOpStatus::Failed,
                StatusFields { error_message: Some(error_message.into()), ..Default::default() },
            )
            .await?;
        if inner.evict(hash).is_some() {
            gauge!(MEMPOOL_SIZE).decrement(1f64);
        }
        Ok(())
    }

    /// Explicit eviction; the record is retained in the store as `removed`.
    pub async fn remove(&self, hash: &UserOperationHash) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        self.store
            .update_user_op_status(hash, UserOpStatus::Removed, StatusFields::default())
            .await?;
        if inner.evict(hash).is_some() {
            gauge!(MEMPOOL_SIZE).decrement(1f64);
        }
        Ok(())
    }

    /// Receipt-timeout policy: the operation returns to the eligible set.
    pub async fn requeue(&self, hash: &UserOperationHash) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        self.store.requeue_user_op(hash).await?;
        if let Some(entry) = inner.by_hash.get_mut(hash) {
            entry.submitted = false;
        }
        Ok(())
    }
}
