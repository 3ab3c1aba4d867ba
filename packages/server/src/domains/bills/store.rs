//! Bill storage backends.
//!
//! `BillStore` is deliberately dumb: lookup, insert, update, filtered query.
//! Upsert semantics, batching and statistics live in `BillRepository`.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::models::{Bill, BillFilter};

#[async_trait]
pub trait BillStore: Send + Sync {
    /// Create the bills table and indexes if they do not exist.
    async fn ensure_schema(&self) -> Result<()>;

    async fn find_by_key(&self, source: &str, bill_number: &str) -> Result<Option<Bill>>;

    async fn insert(&self, bill: &Bill) -> Result<()>;

    async fn update(&self, bill: &Bill) -> Result<()>;

    /// Bills matching `filter`, most recent activity first.
    async fn query(&self, filter: &BillFilter) -> Result<Vec<Bill>>;

    async fn ping(&self) -> Result<()>;
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS bills (
        id UUID PRIMARY KEY,
        source TEXT NOT NULL,
        bill_number TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'Unknown',
        sponsor TEXT NOT NULL DEFAULT '',
        introduced_date TIMESTAMPTZ,
        last_activity_date TIMESTAMPTZ NOT NULL,
        readings JSONB NOT NULL DEFAULT '[]',
        committee TEXT NOT NULL DEFAULT '',
        vote_results JSONB NOT NULL DEFAULT '{}',
        source_url TEXT,
        related_links JSONB NOT NULL DEFAULT '[]',
        details_scraped_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    // Not unique: concurrent upserts of one key may both insert.
    "CREATE INDEX IF NOT EXISTS idx_bills_source_number ON bills (source, bill_number)",
    "CREATE INDEX IF NOT EXISTS idx_bills_last_activity ON bills (last_activity_date DESC)",
];

/// Escape `%`, `_` and `\` for use inside an ILIKE pattern.
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

pub struct PostgresBillStore {
    pool: PgPool,
}

impl PostgresBillStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillStore for PostgresBillStore {
    async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn find_by_key(&self, source: &str, bill_number: &str) -> Result<Option<Bill>> {
        sqlx::query_as::<_, Bill>(
            r#"
            SELECT * FROM bills
            WHERE source = $1 AND bill_number = $2
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(source)
        .bind(bill_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn insert(&self, bill: &Bill) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bills (
                id, source, bill_number, title, description, status, sponsor,
                introduced_date, last_activity_date, readings, committee, vote_results,
                source_url, related_links, details_scraped_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(bill.id)
        .bind(&bill.source)
        .bind(&bill.bill_number)
        .bind(&bill.title)
        .bind(&bill.description)
        .bind(&bill.status)
        .bind(&bill.sponsor)
        .bind(bill.introduced_date)
        .bind(bill.last_activity_date)
        .bind(&bill.readings)
        .bind(&bill.committee)
        .bind(&bill.vote_results)
        .bind(&bill.source_url)
        .bind(&bill.related_links)
        .bind(bill.details_scraped_at)
        .bind(bill.created_at)
        .bind(bill.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, bill: &Bill) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE bills
            SET title = $2,
                description = $3,
                status = $4,
                sponsor = $5,
                introduced_date = $6,
                last_activity_date = $7,
                readings = $8,
                committee = $9,
                vote_results = $10,
                source_url = $11,
                related_links = $12,
                details_scraped_at = $13,
                updated_at = $14
            WHERE id = $1
            "#,
        )
        .bind(bill.id)
        .bind(&bill.title)
        .bind(&bill.description)
        .bind(&bill.status)
        .bind(&bill.sponsor)
        .bind(bill.introduced_date)
        .bind(bill.last_activity_date)
        .bind(&bill.readings)
        .bind(&bill.committee)
        .bind(&bill.vote_results)
        .bind(&bill.source_url)
        .bind(&bill.related_links)
        .bind(bill.details_scraped_at)
        .bind(bill.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(&self, filter: &BillFilter) -> Result<Vec<Bill>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM bills WHERE TRUE");

        if let Some(source) = &filter.source {
            query.push(" AND source = ").push_bind(source.clone());
        }
        if let Some(status) = &filter.status {
            query.push(" AND status = ").push_bind(status.clone());
        }
        if let Some(text) = &filter.text {
            let pattern = like_pattern(text);
            query
                .push(" AND (title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if filter.needs_details {
            query.push(" AND details_scraped_at IS NULL AND jsonb_array_length(related_links) > 0");
        }

        query
            .push(" ORDER BY last_activity_date DESC, bill_number LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        query
            .build_query_as::<Bill>()
            .fetch_all(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
