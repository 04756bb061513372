mod common;

use common::{addr, admit, config, setup, BENEFICIARY};
use ethers::types::U256;
use pylon_bundler::{bundle_hash, ReceiptTimeoutPolicy, TickOutcome};
use pylon_contracts::mock;
use pylon_primitives::{BundleStatus, UserOpStatus};
use std::time::Duration;

#[tokio::test]
async fn happy_path_confirms_bundle_and_members() {
    let ctx = setup(config()).await;
    let hash = admit(&ctx, addr(0xaa), 0, 0x3b9aca00).await;
    assert_eq!(ctx.mempool.pending_count().await, 1);

    ctx.chain.push_receipt(Some(mock::receipt(1, 0x5208, 0x10, 2)));
    let outcome = ctx.executor.tick().await.unwrap();

    let summary = match outcome {
        TickOutcome::Submitted(summary) => summary,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(summary.user_op_count, 1);
    assert_eq!(summary.status, BundleStatus::Confirmed);
    assert_eq!(summary.bundle_hash, bundle_hash(&[hash]));

    // member record is terminal and gone from the mempool
    assert_eq!(ctx.mempool.pending_count().await, 0);
    let record = ctx.store.get_user_op_by_hash(&hash).await.unwrap().unwrap();
    assert_eq!(record.status, UserOpStatus::Confirmed);
    assert_eq!(record.gas_used, Some(U256::from(0x5208)));
    assert_eq!(record.gas_cost, Some(U256::from(0x5208) * 2));
    assert_eq!(record.block_number, Some(0x10));
    assert_eq!(record.tx_hash, Some(summary.tx_hash));

    // bundle record carries the totals
    let bundle = ctx.store.get_bundle_by_hash(&summary.bundle_hash).await.unwrap().unwrap();
    assert_eq!(bundle.status, BundleStatus::Confirmed);
    assert_eq!(bundle.user_op_count, 1);
    assert_eq!(bundle.total_gas_used, Some(U256::from(0x5208)));
    assert_eq!(bundle.block_number, Some(0x10));
}

#[tokio::test]
async fn bundle_ordered_by_descending_fee() {
    let ctx = setup(config()).await;
    admit(&ctx, addr(0x01), 0, 0x10).await;
    admit(&ctx, addr(0x02), 0, 0x30).await;
    admit(&ctx, addr(0x03), 0, 0x20).await;

    ctx.chain.push_receipt(Some(mock::receipt(1, 300_000, 0x10, 2)));
    ctx.executor.tick().await.unwrap();

    let submitted = ctx.chain.submitted();
    assert_eq!(submitted.len(), 1);
    let fees: Vec<U256> = submitted[0].ops.iter().map(|uo| uo.max_fee_per_gas).collect();
    assert_eq!(fees, vec![U256::from(0x30), U256::from(0x20), U256::from(0x10)]);
}

#[tokio::test]
async fn equal_fees_preserve_admission_order() {
    let ctx = setup(config()).await;
    admit(&ctx, addr(0x01), 0, 0x20).await;
    admit(&ctx, addr(0x02), 0, 0x20).await;
    admit(&ctx, addr(0x03), 0, 0x30).await;

    ctx.chain.push_receipt(Some(mock::receipt(1, 300_000, 0x10, 2)));
    ctx.executor.tick().await.unwrap();

    let senders: Vec<_> =
        ctx.chain.submitted()[0].ops.iter().map(|uo| uo.sender).collect();
    assert_eq!(senders, vec![addr(0x03), addr(0x01), addr(0x02)]);
}

#[tokio::test]
async fn respects_max_bundle_size() {
    let mut cfg = config();
    cfg.max_bundle_size = 2;
    let ctx = setup(cfg).await;
    admit(&ctx, addr(0x01), 0, 0x10).await;
    admit(&ctx, addr(0x02), 0, 0x30).await;
    admit(&ctx, addr(0x03), 0, 0x20).await;

    ctx.chain.push_receipt(Some(mock::receipt(1, 200_000, 0x10, 2)));
    ctx.executor.tick().await.unwrap();

    let fees: Vec<U256> =
        ctx.chain.submitted()[0].ops.iter().map(|uo| uo.max_fee_per_gas).collect();
    assert_eq!(fees, vec![U256::from(0x30), U256::from(0x20)]);
    // the cheapest operation stays behind for the next bundle
    assert_eq!(ctx.mempool.get_all().await.len(), 1);
}

#[tokio::test]
async fn gas_limit_and_fee_caps_applied() {
    let ctx = setup(config()).await;
    admit(&ctx, addr(0xaa), 0, 0x3b9aca00).await;
    ctx.chain.set_gas_estimate(U256::from(100_000));
    ctx.chain.push_receipt(Some(mock::receipt(1, 90_000, 0x10, 2)));

    ctx.executor.tick().await.unwrap();

    let submitted = ctx.chain.submitted();
    assert_eq!(submitted[0].gas_limit, U256::from(120_000)); // estimate * 1.2
    // mock suggests 2 gwei; 1.5x multiplier
    assert_eq!(submitted[0].fees.max_fee_per_gas, U256::from(3_000_000_000_u64));
    assert_eq!(submitted[0].beneficiary, BENEFICIARY.parse().unwrap());
}

#[tokio::test]
async fn empty_mempool_is_idle() {
    let ctx = setup(config()).await;
    assert_eq!(ctx.executor.tick().await.unwrap(), TickOutcome::Idle);
    assert!(ctx.chain.submitted().is_empty());
}

#[tokio::test]
async fn reverted_bundle_fails_members() {
    let ctx = setup(config()).await;
    let hash = admit(&ctx, addr(0xaa), 0, 0x3b9aca00).await;

    ctx.chain.push_receipt(Some(mock::receipt(0, 0x5208, 0x10, 2)));
    let outcome = ctx.executor.tick().await.unwrap();

    match outcome {
        TickOutcome::Submitted(summary) => assert_eq!(summary.status, BundleStatus::Failed),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(ctx.mempool.pending_count().await, 0);
    let record = ctx.store.get_user_op_by_hash(&hash).await.unwrap().unwrap();
    assert_eq!(record.status, UserOpStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("transaction-reverted"));
}

#[tokio::test]
async fn submission_failure_leaves_mempool_untouched() {
    let ctx = setup(config()).await;
    admit(&ctx, addr(0xaa), 0, 0x3b9aca00).await;
    ctx.chain.fail_submit("connection refused");

    assert!(ctx.executor.tick().await.is_err());
    assert_eq!(ctx.mempool.get_all().await.len(), 1);
    assert_eq!(ctx.mempool.pending_count().await, 1);
}

#[tokio::test]
async fn hash_failure_drops_only_that_member() {
    let ctx = setup(config()).await;
    let kept = admit(&ctx, addr(0x01), 0, 0x30).await;
    admit(&ctx, addr(0x02), 0, 0x20).await;
    ctx.chain.fail_hash_for(addr(0x02));

    ctx.chain.push_receipt(Some(mock::receipt(1, 100_000, 0x10, 2)));
    let outcome = ctx.executor.tick().await.unwrap();

    match outcome {
        TickOutcome::Submitted(summary) => assert_eq!(summary.user_op_count, 1),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(ctx.chain.submitted()[0].ops[0].sender, addr(0x01));
    // the dropped operation is still pending and eligible
    assert_eq!(ctx.mempool.get_all().await.len(), 1);
    let record = ctx.store.get_user_op_by_hash(&kept).await.unwrap().unwrap();
    assert_eq!(record.status, UserOpStatus::Confirmed);
}

#[tokio::test]
async fn receipt_timeout_keeps_bundle_in_flight_without_resubmission() {
    let ctx = setup(config()).await;
    let hash = admit(&ctx, addr(0xaa), 0, 0x3b9aca00).await;

    // no receipt queued: the wait times out
    let outcome = ctx.executor.tick().await.unwrap();
    match outcome {
        TickOutcome::Submitted(summary) => assert_eq!(summary.status, BundleStatus::Submitted),
        other => panic!("unexpected outcome: {other:?}"),
    }
    let record = ctx.store.get_user_op_by_hash(&hash).await.unwrap().unwrap();
    assert_eq!(record.status, UserOpStatus::Submitted);

    // the next tick does not re-submit the in-flight operation
    assert_eq!(ctx.executor.tick().await.unwrap(), TickOutcome::Idle);
    assert_eq!(ctx.chain.submitted().len(), 1);
}

#[tokio::test]
async fn late_receipt_confirms_during_grace_window() {
    let ctx = setup(config()).await;
    let hash = admit(&ctx, addr(0xaa), 0, 0x3b9aca00).await;

    ctx.executor.tick().await.unwrap(); // times out, goes in flight
    ctx.chain.push_receipt(Some(mock::receipt(1, 0x5208, 0x22, 3)));
    assert_eq!(ctx.executor.tick().await.unwrap(), TickOutcome::Idle);

    let record = ctx.store.get_user_op_by_hash(&hash).await.unwrap().unwrap();
    assert_eq!(record.status, UserOpStatus::Confirmed);
    assert_eq!(record.block_number, Some(0x22));
    assert_eq!(ctx.mempool.pending_count().await, 0);
}

#[tokio::test]
async fn requeue_policy_makes_members_eligible_again() {
    let mut cfg = config();
    cfg.receipt_grace_ticks = 2;
    let ctx = setup(cfg).await;
    let hash = admit(&ctx, addr(0xaa), 0, 0x3b9aca00).await;

    ctx.executor.tick().await.unwrap(); // submit #1, receipt times out
    assert_eq!(ctx.executor.tick().await.unwrap(), TickOutcome::Idle); // grace 1/2

    // grace exhausted: the operation is requeued and immediately re-bundled
    let outcome = ctx.executor.tick().await.unwrap();
    match outcome {
        TickOutcome::Submitted(summary) => assert_eq!(summary.user_op_count, 1),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(ctx.chain.submitted().len(), 2);

    let record = ctx.store.get_user_op_by_hash(&hash).await.unwrap().unwrap();
    assert_eq!(record.status, UserOpStatus::Submitted);
}

#[tokio::test]
async fn fail_policy_marks_members_receipt_timeout() {
    let mut cfg = config();
    cfg.receipt_grace_ticks = 1;
    cfg.receipt_timeout_policy = ReceiptTimeoutPolicy::Fail;
    let ctx = setup(cfg).await;
    let hash = admit(&ctx, addr(0xaa), 0, 0x3b9aca00).await;

    ctx.executor.tick().await.unwrap(); // submit, receipt times out
    assert_eq!(ctx.executor.tick().await.unwrap(), TickOutcome::Idle); // policy applies

    let record = ctx.store.get_user_op_by_hash(&hash).await.unwrap().unwrap();
    assert_eq!(record.status, UserOpStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("receipt-timeout"));
    assert_eq!(ctx.mempool.pending_count().await, 0);
    assert_eq!(ctx.chain.submitted().len(), 1);
}

#[tokio::test]
async fn overlapping_tick_is_dropped() {
    let ctx = setup(config()).await;
    admit(&ctx, addr(0xaa), 0, 0x3b9aca00).await;
    ctx.chain.set_receipt_delay(Duration::from_millis(200));
    ctx.chain.push_receipt(Some(mock::receipt(1, 0x5208, 0x10, 2)));

    let executor = ctx.executor.clone();
    let slow = tokio::spawn(async move { executor.tick().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(ctx.executor.tick().await.unwrap(), TickOutcome::Busy);
    assert!(matches!(slow.await.unwrap().unwrap(), TickOutcome::Submitted(_)));
}
