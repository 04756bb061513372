use crate::StoreError;
use chrono::Utc;
use ethers::types::{Address, H256, U256};
use pylon_primitives::{
    BundleRecord, BundleStatus, StatusFields, UserOpStatus, UserOperation, UserOperationHash,
    UserOperationRecord,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, SqlitePool,
};
use std::{path::Path, str::FromStr};

// Idempotent schema; applied on every startup.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS user_operations (
        user_op_hash TEXT PRIMARY KEY,
        sender TEXT NOT NULL,
        nonce TEXT NOT NULL,
        init_code TEXT NOT NULL,
        call_data TEXT NOT NULL,
        call_gas_limit TEXT NOT NULL,
        verification_gas_limit TEXT NOT NULL,
        pre_verification_gas TEXT NOT NULL,
        max_fee_per_gas TEXT NOT NULL,
        max_priority_fee_per_gas TEXT NOT NULL,
        paymaster_and_data TEXT NOT NULL,
        signature TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        tx_hash TEXT,
        gas_used TEXT,
        gas_cost TEXT,
        error_message TEXT,
        block_number INTEGER,
        created_at INTEGER NOT NULL,
        submitted_at INTEGER,
        confirmed_at INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_user_operations_status ON user_operations (status)",
    "CREATE INDEX IF NOT EXISTS idx_user_operations_sender ON user_operations (sender)",
    "CREATE TABLE IF NOT EXISTS bundles (
        bundle_hash TEXT PRIMARY KEY,
        tx_hash TEXT,
        user_op_count INTEGER NOT NULL,
        total_gas_used TEXT,
        total_gas_cost TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        block_number INTEGER,
        created_at INTEGER NOT NULL,
        submitted_at INTEGER,
        confirmed_at INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS bundle_user_operations (
        bundle_hash TEXT NOT NULL,
        user_op_hash TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (bundle_hash, user_op_hash)
    )",
];

/// Durable record store over SQLite. Status transitions are guarded in the
/// WHERE clause, so an update against the wrong current status silently
/// no-ops and monotonicity holds under concurrent writers.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (and creates, if needed) the database at the given path.
    pub async fn connect(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// An in-memory database for tests. A single connection keeps it alive.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Atomic insert of a freshly admitted record; a hash collision surfaces
    /// as [`StoreError::DuplicateHash`].
    pub async fn save_user_op(&self, record: &UserOperationRecord) -> Result<(), StoreError> {
        let uo = &record.user_operation;
        let res = sqlx::query(
            "INSERT INTO user_operations (
                user_op_hash, sender, nonce, init_code, call_data,
                call_gas_limit, verification_gas_limit, pre_verification_gas,
                max_fee_per_gas, max_priority_fee_per_gas, paymaster_and_data,
                signature, status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(hash_hex(&record.user_op_hash))
        .bind(format!("{:?}", uo.sender))
        .bind(u256_hex(uo.nonce))
        .bind(uo.init_code.to_string())
        .bind(uo.call_data.to_string())
        .bind(u256_hex(uo.call_gas_limit))
        .bind(u256_hex(uo.verification_gas_limit))
        .bind(u256_hex(uo.pre_verification_gas))
        .bind(u256_hex(uo.max_fee_per_gas))
        .bind(u256_hex(uo.max_priority_fee_per_gas))
        .bind(uo.paymaster_and_data.to_string())
        .bind(uo.signature.to_string())
        .bind(record.status.as_str())
        .bind(record.created_at)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateHash)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Applies a status transition. The WHERE clause enforces the state
    /// machine; an absent hash or an ineligible current status no-ops.
    pub async fn update_user_op_status(
        &self,
        hash: &UserOperationHash,
        new_status: UserOpStatus,
        fields: StatusFields,
    ) -> Result<(), StoreError> {
        let now = Utc::now().timestamp_millis();
        let hash = hash_hex(hash);

        let query = match new_status {
            UserOpStatus::Submitted => sqlx::query(
                "UPDATE user_operations
                 SET status = 'submitted', tx_hash = ?, submitted_at = ?
                 WHERE user_op_hash = ? AND status = 'pending'",
            )
            .bind(fields.tx_hash.map(|h| format!("{h:?}")))
            .bind(now)
            .bind(hash),
            UserOpStatus::Confirmed => sqlx::query(
                "UPDATE user_operations
                 SET status = 'confirmed', gas_used = ?, gas_cost = ?,
                     block_number = ?, confirmed_at = ?
                 WHERE user_op_hash = ? AND status = 'submitted'",
            )
            .bind(fields.gas_used.map(u256_hex))
            .bind(fields.gas_cost.map(u256_hex))
            .bind(fields.block_number.map(|n| n as i64))
            .bind(now)
            .bind(hash),
            UserOpStatus::Failed => sqlx::query(
                "UPDATE user_operations
                 SET status = 'failed', error_message = ?, confirmed_at = ?
                 WHERE user_op_hash = ? AND status = 'submitted'",
            )
            .bind(fields.error_message)
            .bind(now)
            .bind(hash),
            UserOpStatus::Removed => sqlx::query(
                "UPDATE user_operations
                 SET status = 'removed'
                 WHERE user_op_hash = ? AND status = 'pending'",
            )
            .bind(hash),
            // re-pending is only reachable through `requeue_user_op`
            UserOpStatus::Pending => return Ok(()),
        };

        query.execute(&self.pool).await?;
        Ok(())
    }

    /// The one sanctioned back-transition: a submitted operation whose
    /// receipt never arrived returns to the pending set.
    pub async fn requeue_user_op(&self, hash: &UserOperationHash) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE user_operations
             SET status = 'pending', tx_hash = NULL, submitted_at = NULL
             WHERE user_op_hash = ? AND status = 'submitted'",
        )
        .bind(hash_hex(hash))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_user_op_by_hash(
        &self,
        hash: &UserOperationHash,
    ) -> Result<Option<UserOperationRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM user_operations WHERE user_op_hash = ?")
            .bind(hash_hex(hash))
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_user_op_record(&r)).transpose()
    }

    /// Pending records in admission order. A negative limit means no limit.
    pub async fn list_pending(&self, limit: i64) -> Result<Vec<UserOperationRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM user_operations WHERE status = 'pending'
             ORDER BY created_at ASC, rowid ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_user_op_record).collect()
    }

    pub async fn count_by_status(&self, status: UserOpStatus) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM user_operations WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n"))
    }

    /// Persists a bundle and its ordered membership in one transaction.
    pub async fn save_bundle(
        &self,
        bundle: &BundleRecord,
        members: &[UserOperationHash],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO bundles (
                bundle_hash, tx_hash, user_op_count, total_gas_used,
                total_gas_cost, status, block_number, created_at, submitted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(format!("{:?}", bundle.bundle_hash))
        .bind(bundle.tx_hash.map(|h| format!("{h:?}")))
        .bind(bundle.user_op_count as i64)
        .bind(bundle.total_gas_used.map(u256_hex))
        .bind(bundle.total_gas_cost.map(u256_hex))
        .bind(bundle.status.as_str())
        .bind(bundle.block_number.map(|n| n as i64))
        .bind(bundle.created_at)
        .bind(bundle.submitted_at)
        .execute(&mut *tx)
        .await?;

        for (position, hash) in members.iter().enumerate() {
            sqlx::query(
                "INSERT INTO bundle_user_operations (bundle_hash, user_op_hash, position)
                 VALUES (?, ?, ?)",
            )
            .bind(format!("{:?}", bundle.bundle_hash))
            .bind(hash_hex(hash))
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Bundle transitions follow the same guarded-UPDATE pattern; only
    /// `submitted -> {confirmed, failed}` can occur after persistence.
    pub async fn update_bundle_status(
        &self,
        bundle_hash: &H256,
        new_status: BundleStatus,
        fields: StatusFields,
    ) -> Result<(), StoreError> {
        let now = Utc::now().timestamp_millis();
        let hash = format!("{bundle_hash:?}");

        let query = match new_status {
            BundleStatus::Confirmed => sqlx::query(
                "UPDATE bundles
                 SET status = 'confirmed', total_gas_used = ?, total_gas_cost = ?,
                     block_number = ?, confirmed_at = ?
                 WHERE bundle_hash = ? AND status = 'submitted'",
            )
            .bind(fields.gas_used.map(u256_hex))
            .bind(fields.gas_cost.map(u256_hex))
            .bind(fields.block_number.map(|n| n as i64))
            .bind(now)
            .bind(hash),
            BundleStatus::Failed => sqlx::query(
                "UPDATE bundles
                 SET status = 'failed', confirmed_at = ?
                 WHERE bundle_hash = ? AND status = 'submitted'",
            )
            .bind(now)
            .bind(hash),
            BundleStatus::Submitted => sqlx::query(
                "UPDATE bundles
                 SET status = 'submitted', tx_hash = ?, submitted_at = ?
                 WHERE bundle_hash = ? AND status = 'pending'",
            )
            .bind(fields.tx_hash.map(|h| format!("{h:?}")))
            .bind(now)
            .bind(hash),
            BundleStatus::Pending => return Ok(()),
        };

        query.execute(&self.pool).await?;
        Ok(())
    }

    pub async fn get_bundle_by_hash(
        &self,
        bundle_hash: &H256,
    ) -> Result<Option<BundleRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM bundles WHERE bundle_hash = ?")
            .bind(format!("{bundle_hash:?}"))
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_bundle_record(&r)).transpose()
    }
}

fn hash_hex(hash: &UserOperationHash) -> String {
    format!("{:?}", hash.0)
}

fn u256_hex(value: U256) -> String {
    format!("{value:#x}")
}

fn parse_u256(s: &str) -> Result<U256, StoreError> {
    U256::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| StoreError::Corrupt { inner: format!("bad uint {s}: {e}") })
}

fn parse_h256(s: &str) -> Result<H256, StoreError> {
    H256::from_str(s).map_err(|e| StoreError::Corrupt { inner: format!("bad hash {s}: {e}") })
}

fn parse_bytes(s: &str) -> Result<ethers::types::Bytes, StoreError> {
    ethers::types::Bytes::from_str(s)
        .map_err(|e| StoreError::Corrupt { inner: format!("bad bytes {s}: {e}") })
}

fn row_to_user_op_record(row: &SqliteRow) -> Result<UserOperationRecord, StoreError> {
    let status: String = row.get("status");
    let status = status
        .parse::<UserOpStatus>()
        .map_err(|e| StoreError::Corrupt { inner: e.to_string() })?;

    let sender: String = row.get("sender");
    let sender = Address::from_str(&sender)
        .map_err(|e| StoreError::Corrupt { inner: format!("bad address {sender}: {e}") })?;

    let user_operation = UserOperation {
        sender,
        nonce: parse_u256(&row.get::<String, _>("nonce"))?,
        init_code: parse_bytes(&row.get::<String, _>("init_code"))?,
        call_data: parse_bytes(&row.get::<String, _>("call_data"))?,
        call_gas_limit: parse_u256(&row.get::<String, _>("call_gas_limit"))?,
        verification_gas_limit: parse_u256(&row.get::<String, _>("verification_gas_limit"))?,
        pre_verification_gas: parse_u256(&row.get::<String, _>("pre_verification_gas"))?,
        max_fee_per_gas: parse_u256(&row.get::<String, _>("max_fee_per_gas"))?,
        max_priority_fee_per_gas: parse_u256(&row.get::<String, _>("max_priority_fee_per_gas"))?,
        paymaster_and_data: parse_bytes(&row.get::<String, _>("paymaster_and_data"))?,
        signature: parse_bytes(&row.get::<String, _>("signature"))?,
    };

    Ok(UserOperationRecord {
        user_op_hash: parse_h256(&row.get::<String, _>("user_op_hash"))?.into(),
        user_operation,
        status,
        tx_hash: row
            .get::<Option<String>, _>("tx_hash")
            .map(|s| parse_h256(&s))
            .transpose()?,
        gas_used: row
            .get::<Option<String>, _>("gas_used")
            .map(|s| parse_u256(&s))
            .transpose()?,
        gas_cost: row
            .get::<Option<String>, _>("gas_cost")
            .map(|s| parse_u256(&s))
            .transpose()?,
        error_message: row.get("error_message"),
        block_number: row.get::<Option<i64>, _>("block_number").map(|n| n as u64),
        created_at: row.get("created_at"),
        submitted_at: row.get("submitted_at"),
        confirmed_at: row.get("confirmed_at"),
    })
}

fn row_to_bundle_record(row: &SqliteRow) -> Result<BundleRecord, StoreError> {
    let status: String = row.get("status");
    let status = status
        .parse::<BundleStatus>()
        .map_err(|e| StoreError::Corrupt { inner: e.to_string() })?;

    Ok(BundleRecord {
        bundle_hash: parse_h256(&row.get::<String, _>("bundle_hash"))?,
        tx_hash: row
            .get::<Option<String>, _>("tx_hash")
            .map(|s| parse_h256(&s))
            .transpose()?,
        user_op_count: row.get::<i64, _>("user_op_count") as u32,
        total_gas_used: row
            .get::<Option<String>, _>("total_gas_used")
            .map(|s| parse_u256(&s))
            .transpose()?,
        total_gas_cost: row
            .get::<Option<String>, _>("total_gas_cost")
            .map(|s| parse_u256(&s))
            .transpose()?,
        status,
        block_number: row.get::<Option<i64>, _>("block_number").map(|n| n as u64),
        created_at: row.get("created_at"),
        submitted_at: row.get("submitted_at"),
        confirmed_at: row.get("confirmed_at"),
    })
}
