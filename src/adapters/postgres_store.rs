//! Postgres implementations of the record store and user directory ports.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{TransactionRecord, TxStatus};
use crate::ports::{ConfirmationUpdate, RecordStore, StoreError, StoreResult, UserDirectory};

const SELECT_COLUMNS: &str = r#"
    id, tx_hash, from_user_id, to_user_id, from_address, to_address,
    amount, memo, payment_link_id, status, block_number, gas_used,
    gas_price, network, created_at, updated_at
"#;

/// Postgres-backed transaction record store.
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn insert(&self, record: &TransactionRecord) -> StoreResult<TransactionRecord> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions (
                id, tx_hash, from_user_id, to_user_id, from_address, to_address,
                amount, memo, payment_link_id, status, block_number, gas_used,
                gas_price, network, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {}
            "#,
            SELECT_COLUMNS
        ))
        .bind(record.id)
        .bind(&record.tx_hash)
        .bind(record.from_user_id)
        .bind(record.to_user_id)
        .bind(&record.from_address)
        .bind(&record.to_address)
        .bind(&record.amount)
        .bind(&record.memo)
        .bind(record.payment_link_id)
        .bind(record.status.as_str())
        .bind(record.block_number)
        .bind(record.gas_used)
        .bind(record.gas_price)
        .bind(&record.network)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn insert_deposit(
        &self,
        record: &TransactionRecord,
    ) -> StoreResult<Option<TransactionRecord>> {
        // ON CONFLICT absorbs the race where a duplicate event inserts the
        // same hash first.
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions (
                id, tx_hash, from_user_id, to_user_id, from_address, to_address,
                amount, memo, payment_link_id, status, block_number, gas_used,
                gas_price, network, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (tx_hash) DO NOTHING
            RETURNING {}
            "#,
            SELECT_COLUMNS
        ))
        .bind(record.id)
        .bind(&record.tx_hash)
        .bind(record.from_user_id)
        .bind(record.to_user_id)
        .bind(&record.from_address)
        .bind(&record.to_address)
        .bind(&record.amount)
        .bind(&record.memo)
        .bind(record.payment_link_id)
        .bind(record.status.as_str())
        .bind(record.block_number)
        .bind(record.gas_used)
        .bind(record.gas_price)
        .bind(&record.network)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn get(&self, id: Uuid) -> StoreResult<TransactionRecord> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(id.to_string()))?
            .into_domain()
    }

    async fn find_by_hash(&self, tx_hash: &str) -> StoreResult<Option<TransactionRecord>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE tx_hash = $1",
            SELECT_COLUMNS
        ))
        .bind(tx_hash.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn select_pending(&self, network: &str) -> StoreResult<Vec<TransactionRecord>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE status = 'pending' AND network = $1
            ORDER BY created_at ASC
            "#,
            SELECT_COLUMNS
        ))
        .bind(network)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TxStatus,
        confirmation: Option<&ConfirmationUpdate>,
    ) -> StoreResult<bool> {
        if !status.is_terminal() {
            return Err(StoreError::InvalidTransition(status));
        }

        // Conditional on the row still being pending: losing writers see
        // zero rows updated instead of reverting a terminal status.
        let updated = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2,
                block_number = COALESCE($3, block_number),
                gas_used = COALESCE($4, gas_used),
                gas_price = COALESCE($5, gas_price),
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(confirmation.map(|c| c.block_number))
        .bind(confirmation.and_then(|c| c.gas_used))
        .bind(confirmation.and_then(|c| c.gas_price))
        .fetch_optional(&self.pool)
        .await?;

        Ok(updated.is_some())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<TransactionRecord>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE from_user_id = $1 OR to_user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }
}

/// Postgres-backed user directory.
#[derive(Clone)]
pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn lookup_by_address(&self, address: &str) -> StoreResult<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM users WHERE wallet_address = $1 AND is_active = TRUE",
        )
        .bind(address.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }
}

/// Internal row type for sqlx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    tx_hash: Option<String>,
    from_user_id: Option<Uuid>,
    to_user_id: Option<Uuid>,
    from_address: String,
    to_address: String,
    amount: BigDecimal,
    memo: Option<String>,
    payment_link_id: Option<Uuid>,
    status: String,
    block_number: Option<i64>,
    gas_used: Option<i64>,
    gas_price: Option<i64>,
    network: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> StoreResult<TransactionRecord> {
        let status = self
            .status
            .parse::<TxStatus>()
            .map_err(StoreError::Corrupt)?;

        Ok(TransactionRecord {
            id: self.id,
            tx_hash: self.tx_hash,
            from_user_id: self.from_user_id,
            to_user_id: self.to_user_id,
            from_address: self.from_address,
            to_address: self.to_address,
            amount: self.amount,
            memo: self.memo,
            payment_link_id: self.payment_link_id,
            status,
            block_number: self.block_number,
            gas_used: self.gas_used,
            gas_price: self.gas_price,
            network: self.network,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
