use chrono::Utc;
use ethers::{
    types::{Address, TransactionReceipt, H256, U256},
    utils::keccak256,
};
use metrics::counter;
use pylon_contracts::ChainService;
use pylon_mempool::{Mempool, Store};
use pylon_primitives::{
    constants::{defaults, gas},
    BundleRecord, BundleStatus, StatusFields, UserOperation, UserOperationHash,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

const BUNDLES_SUBMITTED: &str = "pylon_bundles_submitted";
const BUNDLES_CONFIRMED: &str = "pylon_bundles_confirmed";
const BUNDLES_FAILED: &str = "pylon_bundles_failed";

/// What to do with members of a bundle whose receipt never arrived within
/// the grace window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiptTimeoutPolicy {
    /// Move them back to pending; they become re-eligible for bundling
    Requeue,
    /// Mark them failed with reason `receipt-timeout`
    Fail,
}

#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Address credited with gas refunds from bundle execution
    pub beneficiary: Address,
    pub bundle_interval: Duration,
    pub max_bundle_size: usize,
    /// Applied to the node-suggested max fee per gas, in percent
    pub max_fee_multiplier_percent: u64,
    /// Ticks an in-flight bundle may wait before the timeout policy applies
    pub receipt_grace_ticks: u32,
    pub receipt_timeout_policy: ReceiptTimeoutPolicy,
}

impl ExecutorConfig {
    pub fn new(beneficiary: Address) -> Self {
        Self {
            beneficiary,
            bundle_interval: Duration::from_millis(defaults::BUNDLE_INTERVAL_MS),
            max_bundle_size: defaults::MAX_BUNDLE_SIZE,
            max_fee_multiplier_percent: defaults::MAX_FEE_MULTIPLIER_PERCENT,
            receipt_grace_ticks: defaults::RECEIPT_GRACE_TICKS,
            receipt_timeout_policy: ReceiptTimeoutPolicy::Requeue,
        }
    }
}

/// Result of a single executor tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The previous tick was still running; this one was dropped
    Busy,
    /// Nothing eligible to bundle
    Idle,
    /// A bundle went out
    Submitted(BundleSummary),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleSummary {
    pub bundle_hash: H256,
    pub tx_hash: H256,
    pub user_op_count: usize,
    /// `Submitted` when the receipt did not arrive within this tick
    pub status: BundleStatus,
}

struct InFlightBundle {
    bundle_hash: H256,
    tx_hash: H256,
    members: Vec<UserOperationHash>,
    ticks_waited: u32,
}

/// `bundleHash`: keccak256 of the member hashes concatenated in selection
/// order.
pub fn bundle_hash(hashes: &[UserOperationHash]) -> H256 {
    let mut data = Vec::with_capacity(32 * hashes.len());
    for hash in hashes {
        data.extend_from_slice(hash.as_fixed_bytes());
    }
    H256::from(keccak256(data))
}

/// Drains the mempool into revenue-ordered bundles on a fixed interval.
/// A tick that finds the previous one still running returns `Busy` and does
/// nothing; in-flight bundles whose receipts are late are re-polled each tick
/// until the grace window runs out.
pub struct BundleExecutor {
    chain: Arc<dyn ChainService>,
    mempool: Mempool,
    store: Store,
    config: ExecutorConfig,
    is_executing: AtomicBool,
    in_flight: Mutex<Vec<InFlightBundle>>,
}

impl BundleExecutor {
    pub fn new(
        chain: Arc<dyn ChainService>,
        mempool: Mempool,
        store: Store,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            chain,
            mempool,
            store,
            config,
            is_executing: AtomicBool::new(false),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Runs the executor until the shutdown signal flips.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = time::interval(self.config.bundle_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(err) = self.tick().await {
                            error!("bundle tick failed: {err:#}");
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("bundle executor stopping");
                        break;
                    }
                }
            }
        })
    }

    /// A single scheduling tick, guarded against reentry.
    pub async fn tick(&self) -> eyre::Result<TickOutcome> {
        if self
            .is_executing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("previous tick still executing, dropping this one");
            return Ok(TickOutcome::Busy);
        }

        let result = self.execute_tick().await;
        self.is_executing.store(false, Ordering::SeqCst);
        result
    }

    async fn execute_tick(&self) -> eyre::Result<TickOutcome> {
        self.reconcile_in_flight().await;

        // Snapshot, order by fee descending; the sort is stable so equal fees
        // keep their admission order.
        let mut candidates = self.mempool.get_all().await;
        candidates.sort_by(|a, b| {
            b.user_operation.max_fee_per_gas.cmp(&a.user_operation.max_fee_per_gas)
        });
        candidates.truncate(self.config.max_bundle_size);
        if candidates.is_empty() {
            return Ok(TickOutcome::Idle);
        }

        // Recompute hashes against the chain; a failing member is dropped
        // from this bundle only and stays in the pool.
        let mut ops: Vec<UserOperation> = Vec::with_capacity(candidates.len());
        let mut members: Vec<UserOperationHash> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self.chain.compute_user_op_hash(&candidate.user_operation).await {
                Ok(hash) => {
                    ops.push(candidate.user_operation);
                    members.push(hash);
                }
                Err(err) => {
                    warn!("dropping {} from this bundle: {err}", candidate.hash);
                }
            }
        }
        if ops.is_empty() {
            return Ok(TickOutcome::Idle);
        }

        let bundle_hash = bundle_hash(&members);

        // Anything failing up to the submission itself leaves the mempool
        // untouched and is retried next tick.
        let estimate = self.chain.estimate_bundle_gas(&ops, self.config.beneficiary).await?;
        let gas_limit = estimate * U256::from(gas::ESTIMATE_MARGIN_PERCENT) / U256::from(100);

        let mut fees = self.chain.current_fees().await?;
        fees.max_fee_per_gas = fees.max_fee_per_gas
            * U256::from(self.config.max_fee_multiplier_percent)
            / U256::from(100);

        let tx_hash = self
            .chain
            .submit_bundle(&ops, self.config.beneficiary, gas_limit, fees)
            .await?;
        counter!(BUNDLES_SUBMITTED).increment(1);
        info!("bundle {bundle_hash:?} with {} user operations submitted as {tx_hash:?}", ops.len());

        // The transaction is on the wire: from here on failures are logged
        // and the records stay `submitted` for the grace machinery.
        let now = Utc::now().timestamp_millis();
        let bundle = BundleRecord {
            bundle_hash,
            tx_hash: Some(tx_hash),
            user_op_count: ops.len() as u32,
            total_gas_used: None,
            total_gas_cost: None,
            status: BundleStatus::Submitted,
            block_number: None,
            created_at: now,
            submitted_at: Some(now),
            confirmed_at: None,
        };
        if let Err(err) = self.store.save_bundle(&bundle, &members).await {
            error!("failed to persist bundle {bundle_hash:?}: {err}");
        }
        for member in &members {
            if let Err(err) = self.mempool.mark_submitted(member, tx_hash).await {
                error!("failed to mark {member} submitted: {err}");
            }
        }

        let status = match self.chain.wait_for_receipt(tx_hash, self.config.bundle_interval).await
        {
            Ok(Some(receipt)) => self.finalize(bundle_hash, &members, &receipt).await,
            Ok(None) => {
                info!("no receipt for {tx_hash:?} yet, keeping bundle in flight");
                self.in_flight.lock().await.push(InFlightBundle {
                    bundle_hash,
                    tx_hash,
                    members: members.clone(),
                    ticks_waited: 0,
                });
                BundleStatus::Submitted
            }
            Err(err) => {
                warn!("receipt poll for {tx_hash:?} failed: {err}; keeping bundle in flight");
                self.in_flight.lock().await.push(InFlightBundle {
                    bundle_hash,
                    tx_hash,
                    members: members.clone(),
                    ticks_waited: 0,
                });
                BundleStatus::Submitted
            }
        };

        Ok(TickOutcome::Submitted(BundleSummary {
            bundle_hash,
            tx_hash,
            user_op_count: members.len(),
            status,
        }))
    }

    /// Applies a receipt to a bundle and its members.
    async fn finalize(
        &self,
        bundle_hash: H256,
        members: &[UserOperationHash],
        receipt: &TransactionReceipt,
    ) -> BundleStatus {
        let success = receipt.status == Some(1u64.into());
        let gas_used = receipt.gas_used.unwrap_or_default();
        let effective_gas_price = receipt.effective_gas_price.unwrap_or_default();
        let block_number = receipt.block_number.map(|b| b.as_u64()).unwrap_or_default();

        if success {
            // Per-member attribution: an even integer share of the bundle's
            // gas at the effective price.
            let share = gas_used / U256::from(members.len() as u64);
            let share_cost = share * effective_gas_price;
            for member in members {
                if let Err(err) =
                    self.mempool.mark_confirmed(member, share, share_cost, block_number).await
                {
                    error!("failed to mark {member} confirmed: {err}");
                }
            }
            if let Err(err) = self
                .store
                .update_bundle_status(
                    &bundle_hash,
                    BundleStatus::Confirmed,
                    StatusFields {
                        gas_used: Some(gas_used),
                        gas_cost: Some(gas_used * effective_gas_price),
                        block_number: Some(block_number),
                        ..Default::default()
                    },
                )
                .await
            {
                error!("failed to confirm bundle {bundle_hash:?}: {err}");
            }
            counter!(BUNDLES_CONFIRMED).increment(1);
            info!("bundle {bundle_hash:?} confirmed in block {block_number}");
            BundleStatus::Confirmed
        } else {
            for member in members {
                if let Err(err) = self.mempool.mark_failed(member, "transaction-reverted").await {
                    error!("failed to mark {member} failed: {err}");
                }
            }
            if let Err(err) = self
                .store
                .update_bundle_status(&bundle_hash, BundleStatus::Failed, StatusFields::default())
                .await
            {
                error!("failed to fail bundle {bundle_hash:?}: {err}");
            }
            counter!(BUNDLES_FAILED).increment(1);
            warn!("bundle {bundle_hash:?} reverted on chain");
            BundleStatus::Failed
        }
    }

    /// Re-polls bundles whose receipts were late. After the grace window the
    /// configured timeout policy applies.
    async fn reconcile_in_flight(&self) {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.is_empty() {
            return;
        }

        let mut remaining = Vec::with_capacity(in_flight.len());
        for mut bundle in in_flight.drain(..) {
            match self.chain.wait_for_receipt(bundle.tx_hash, Duration::ZERO).await {
                Ok(Some(receipt)) => {
                    self.finalize(bundle.bundle_hash, &bundle.members, &receipt).await;
                }
                Ok(None) => {
                    bundle.ticks_waited += 1;
                    if bundle.ticks_waited >= self.config.receipt_grace_ticks {
                        self.apply_timeout_policy(&bundle).await;
                    } else {
                        remaining.push(bundle);
                    }
                }
                Err(err) => {
                    // a transient poll failure does not consume grace
                    warn!("receipt poll for {:?} failed: {err}", bundle.tx_hash);
                    remaining.push(bundle);
                }
            }
        }
        *in_flight = remaining;
    }

    async fn apply_timeout_policy(&self, bundle: &InFlightBundle) {
        match self.config.receipt_timeout_policy {
            ReceiptTimeoutPolicy::Requeue => {
                info!(
                    "bundle {:?} timed out waiting for a receipt, requeueing {} user operations",
                    bundle.bundle_hash,
                    bundle.members.len()
                );
                for member in &bundle.members {
                    if let Err(err) = self.mempool.requeue(member).await {
                        error!("failed to requeue {member}: {err}");
                    }
                }
            }
            ReceiptTimeoutPolicy::Fail => {
                warn!(
                    "bundle {:?} timed out waiting for a receipt, failing {} user operations",
                    bundle.bundle_hash,
                    bundle.members.len()
                );
                for member in &bundle.members {
                    if let Err(err) = self.mempool.mark_failed(member, "receipt-timeout").await {
                        error!("failed to mark {member} failed: {err}");
                    }
                }
            }
        }
        if let Err(err) = self
            .store
            .update_bundle_status(&bundle.bundle_hash, BundleStatus::Failed, StatusFields::default())
            .await
        {
            error!("failed to fail bundle {:?}: {err}", bundle.bundle_hash);
        }
    }
}
