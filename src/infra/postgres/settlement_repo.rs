use {
    crate::domain::{
        error::PipelineError,
        id::OrderRef,
        settlement::{NewSettlementAttempt, SettlementAttempt, SettlementStatus},
    },
    chrono::{DateTime, Utc},
    uuid::Uuid,
};

pub async fn insert_attempt(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    attempt: &NewSettlementAttempt,
) -> Result<(), PipelineError> {
    let result = sqlx::query(
        r#"
        INSERT INTO settlement_attempts
            (id, order_id, aggregator_txn_id, correlation_id, status, raw_payload)
        SELECT $1, o.id, $2, $3, $4, $5
        FROM orders o
        WHERE o.external_id = $6
        "#,
    )
    .bind(attempt.id)
    .bind(attempt.aggregator_txn_id.as_deref())
    .bind(&attempt.correlation_id)
    .bind(attempt.status.as_str())
    .bind(&attempt.raw_payload)
    .bind(attempt.order_ref.as_str())
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(PipelineError::OrderNotFound(attempt.order_ref.to_string()));
    }
    Ok(())
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: Uuid,
    order_id: Uuid,
    aggregator_txn_id: Option<String>,
    correlation_id: String,
    status: String,
    raw_payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

pub async fn attempts_for(
    pool: &sqlx::PgPool,
    order_ref: &OrderRef,
) -> Result<Vec<SettlementAttempt>, PipelineError> {
    let rows: Vec<AttemptRow> = sqlx::query_as(
        r#"
        SELECT a.id, a.order_id, a.aggregator_txn_id, a.correlation_id, a.status,
               a.raw_payload, a.created_at
        FROM settlement_attempts a
        JOIN orders o ON o.id = a.order_id
        WHERE o.external_id = $1
        ORDER BY a.created_at
        "#,
    )
    .bind(order_ref.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            Ok(SettlementAttempt {
                id: r.id,
                order_id: r.order_id,
                aggregator_txn_id: r.aggregator_txn_id,
                correlation_id: r.correlation_id,
                status: SettlementStatus::try_from(r.status.as_str())?,
                raw_payload: r.raw_payload,
                created_at: r.created_at,
            })
        })
        .collect()
}
