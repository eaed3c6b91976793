//! Store ledger repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use bazaar_core::{OrderId, Page, PageRequest, StoreId, TransactionId, TransactionKind};

use super::RepositoryError;
use crate::models::transaction::{LedgerSummary, NewTransaction, Transaction, TransactionFilter};

const TRANSACTION_COLUMNS: &str = "id, store_id, order_id, kind, amount, description, created_at";

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i32,
    store_id: i32,
    order_id: Option<i32>,
    kind: TransactionKind,
    amount: Decimal,
    description: String,
    created_at: DateTime<Utc>,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Self {
            id: TransactionId::new(row.id),
            store_id: StoreId::new(row.store_id),
            order_id: row.order_id.map(OrderId::new),
            kind: row.kind,
            amount: row.amount,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    gross_sales: Decimal,
    refunds: Decimal,
    fees: Decimal,
    payouts: Decimal,
    balance: Decimal,
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, store_id: StoreId, filter: TransactionFilter) {
    qb.push(" WHERE store_id = ").push_bind(store_id);
    if let Some(kind) = filter.kind {
        qb.push(" AND kind = ").push_bind(kind);
    }
    if let Some(from) = filter.from {
        qb.push(" AND created_at >= ").push_bind(from).push("::date");
    }
    if let Some(to) = filter.to {
        qb.push(" AND created_at < (").push_bind(to).push("::date + 1)");
    }
}

/// Repository for ledger database operations.
pub struct TransactionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TransactionRepository<'a> {
    /// Create a new transaction repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List a store's ledger entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        store_id: StoreId,
        filter: TransactionFilter,
        page: PageRequest,
    ) -> Result<Page<Transaction>, RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM bazaar.transaction");
        push_filters(&mut count, store_id, filter);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {TRANSACTION_COLUMNS} FROM bazaar.transaction"
        ));
        push_filters(&mut select, store_id, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select
            .build_query_as::<TransactionRow>()
            .fetch_all(self.pool)
            .await?;

        Ok(Page::new(
            rows.into_iter().map(Transaction::from).collect(),
            page,
            total,
        ))
    }

    /// Ledger totals of a store.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn summary(&self, store_id: StoreId) -> Result<LedgerSummary, RepositoryError> {
        summary(self.pool, store_id).await
    }

    /// Record a payout of `amount` if the store's balance covers it.
    ///
    /// The store row is locked so concurrent payouts cannot overdraw.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if `amount` exceeds the balance,
    /// or `RepositoryError::NotFound` if the store does not exist.
    pub async fn record_payout(
        &self,
        store_id: StoreId,
        amount: Decimal,
    ) -> Result<Transaction, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query_scalar::<_, i32>("SELECT id FROM bazaar.store WHERE id = $1 FOR UPDATE")
            .bind(store_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let balance = summary(&mut *tx, store_id).await?.balance;
        if amount > balance {
            return Err(RepositoryError::Conflict(format!(
                "payout exceeds available balance of {balance}"
            )));
        }

        let transaction = insert(&mut tx, &NewTransaction::payout(store_id, amount)).await?;
        tx.commit().await?;
        Ok(transaction)
    }
}

async fn summary<'e, E>(executor: E, store_id: StoreId) -> Result<LedgerSummary, RepositoryError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    // Debits are stored negative and reported as positive magnitudes.
    let row = sqlx::query_as::<_, SummaryRow>(
        r"
        SELECT
            COALESCE(SUM(amount) FILTER (WHERE kind = 'sale'), 0) AS gross_sales,
            COALESCE(-SUM(amount) FILTER (WHERE kind = 'refund'), 0) AS refunds,
            COALESCE(-SUM(amount) FILTER (WHERE kind = 'fee'), 0) AS fees,
            COALESCE(-SUM(amount) FILTER (WHERE kind = 'payout'), 0) AS payouts,
            COALESCE(SUM(amount), 0) AS balance
        FROM bazaar.transaction
        WHERE store_id = $1
        ",
    )
    .bind(store_id)
    .fetch_one(executor)
    .await?;

    Ok(LedgerSummary {
        gross_sales: row.gross_sales,
        refunds: row.refunds,
        fees: row.fees,
        payouts: row.payouts,
        balance: row.balance,
    })
}

/// Write one ledger entry.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert(
    conn: &mut PgConnection,
    entry: &NewTransaction,
) -> Result<Transaction, RepositoryError> {
    let sql = format!(
        r"
        INSERT INTO bazaar.transaction (store_id, order_id, kind, amount, description)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {TRANSACTION_COLUMNS}
        "
    );
    let row = sqlx::query_as::<_, TransactionRow>(&sql)
        .bind(entry.store_id)
        .bind(entry.order_id)
        .bind(entry.kind)
        .bind(entry.amount)
        .bind(&entry.description)
        .fetch_one(&mut *conn)
        .await?;
    Ok(Transaction::from(row))
}
