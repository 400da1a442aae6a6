use {
    crate::domain::{
        error::PipelineError,
        id::OrderRef,
        ledger::{LedgerEntry, NewLedgerEntry},
    },
    chrono::{DateTime, Utc},
};

pub async fn insert_ledger_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    entry: &NewLedgerEntry,
) -> Result<(), PipelineError> {
    sqlx::query("INSERT INTO ledger (order_ref, kind, message) VALUES ($1, $2, $3)")
        .bind(entry.order_ref.as_ref().map(|r| r.as_str()))
        .bind(entry.kind.as_str())
        .bind(&entry.message)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct LedgerRow {
    seq: i64,
    order_ref: Option<String>,
    kind: String,
    message: String,
    created_at: DateTime<Utc>,
}

pub async fn entries_for(
    pool: &sqlx::PgPool,
    order_ref: &OrderRef,
) -> Result<Vec<LedgerEntry>, PipelineError> {
    let rows: Vec<LedgerRow> = sqlx::query_as(
        "SELECT seq, order_ref, kind, message, created_at FROM ledger WHERE order_ref = $1 ORDER BY seq",
    )
    .bind(order_ref.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| LedgerEntry {
            seq: r.seq,
            order_ref: r.order_ref,
            kind: r.kind,
            message: r.message,
            created_at: r.created_at,
        })
        .collect())
}
