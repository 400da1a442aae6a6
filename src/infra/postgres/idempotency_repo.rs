use {
    crate::domain::{
        error::PipelineError,
        idempotency::{IdempotencyRecord, KeyState},
        settlement::SettlementStatus,
    },
    chrono::{DateTime, Utc},
};

#[derive(sqlx::FromRow)]
struct KeyRow {
    key: String,
    state: String,
    outcome: Option<String>,
    acquired_at: DateTime<Utc>,
    consumed_at: Option<DateTime<Utc>>,
}

impl TryFrom<KeyRow> for IdempotencyRecord {
    type Error = PipelineError;

    fn try_from(row: KeyRow) -> Result<Self, Self::Error> {
        Ok(Self {
            key: row.key,
            state: KeyState::try_from(row.state.as_str())?,
            outcome: row
                .outcome
                .as_deref()
                .map(SettlementStatus::try_from)
                .transpose()?,
            acquired_at: row.acquired_at,
            consumed_at: row.consumed_at,
        })
    }
}

/// Returns `true` if the key was free and is now held in-flight.
pub async fn insert_in_flight(pool: &sqlx::PgPool, key: &str) -> Result<bool, PipelineError> {
    let inserted: Option<bool> = sqlx::query_scalar(
        r#"
        INSERT INTO idempotency_keys (key, state)
        VALUES ($1, 'IN_FLIGHT')
        ON CONFLICT (key) DO NOTHING
        RETURNING true
        "#,
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;

    Ok(inserted.is_some())
}

pub async fn find(pool: &sqlx::PgPool, key: &str) -> Result<Option<IdempotencyRecord>, PipelineError> {
    let row: Option<KeyRow> = sqlx::query_as(
        "SELECT key, state, outcome, acquired_at, consumed_at FROM idempotency_keys WHERE key = $1",
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;

    row.map(IdempotencyRecord::try_from).transpose()
}

/// Mark consumed with its outcome. Upserts so the reconciler can record
/// outcomes for keys lost in a crash.
pub async fn mark_consumed(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    key: &str,
    outcome: SettlementStatus,
) -> Result<(), PipelineError> {
    sqlx::query(
        r#"
        INSERT INTO idempotency_keys (key, state, outcome, consumed_at)
        VALUES ($1, 'CONSUMED', $2, now())
        ON CONFLICT (key) DO UPDATE
        SET state = 'CONSUMED', outcome = EXCLUDED.outcome, consumed_at = now()
        "#,
    )
    .bind(key)
    .bind(outcome.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn delete(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    key: &str,
) -> Result<bool, PipelineError> {
    let result = sqlx::query("DELETE FROM idempotency_keys WHERE key = $1")
        .bind(key)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected() > 0)
}
