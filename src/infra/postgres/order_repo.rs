use {
    crate::domain::{
        error::PipelineError,
        id::{GatewayOrderRef, OrderRef},
        money::MinorUnits,
        order::{NewOrder, Order, OrderStatus},
        payment::{NewPayment, Payment, PaymentRecordStatus},
    },
    chrono::{DateTime, Utc},
    uuid::Uuid,
};

const ORDER_COLUMNS: &str = "id, external_id, customer_ref, amount, bill_category, status, \
                             gateway_order_ref, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    external_id: String,
    customer_ref: String,
    amount: i64,
    bill_category: String,
    status: String,
    gateway_order_ref: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = PipelineError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            order_ref: OrderRef::new(row.external_id)?,
            customer_ref: row.customer_ref,
            amount: MinorUnits::new(row.amount)?,
            bill_category: row.bill_category,
            status: OrderStatus::try_from(row.status.as_str())?,
            gateway_order_ref: row.gateway_order_ref.map(GatewayOrderRef::new).transpose()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Insert a new order. Returns `None` if the external id is already taken.
pub async fn insert_order(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    order: &NewOrder,
) -> Result<Option<Order>, PipelineError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
        r#"
        INSERT INTO orders (id, external_id, customer_ref, amount, bill_category, status)
        VALUES ($1, $2, $3, $4, $5, 'CREATED')
        ON CONFLICT (external_id) DO NOTHING
        RETURNING {ORDER_COLUMNS}
        "#
    ))
    .bind(Uuid::now_v7())
    .bind(order.order_ref.as_str())
    .bind(&order.customer_ref)
    .bind(order.amount.get())
    .bind(&order.bill_category)
    .fetch_optional(&mut **tx)
    .await?;

    row.map(Order::try_from).transpose()
}

pub async fn find_by_ref(
    pool: &sqlx::PgPool,
    order_ref: &OrderRef,
) -> Result<Option<Order>, PipelineError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE external_id = $1"
    ))
    .bind(order_ref.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(Order::try_from).transpose()
}

pub async fn find_by_gateway_ref(
    pool: &sqlx::PgPool,
    gateway_ref: &GatewayOrderRef,
) -> Result<Option<Order>, PipelineError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE gateway_order_ref = $1"
    ))
    .bind(gateway_ref.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(Order::try_from).transpose()
}

/// Conditional status write: succeeds only while the row is still in one of
/// `allowed`. Postgres re-checks the predicate under the row lock, so two
/// writers racing on the same order cannot both win.
pub async fn compare_and_set_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    order_ref: &OrderRef,
    allowed: &[OrderStatus],
    to: OrderStatus,
    gateway_ref: Option<&GatewayOrderRef>,
) -> Result<Option<Order>, PipelineError> {
    let allowed: Vec<String> = allowed.iter().map(|s| s.as_str().to_string()).collect();
    let row: Option<OrderRow> = sqlx::query_as(&format!(
        r#"
        UPDATE orders
        SET status = $1,
            gateway_order_ref = COALESCE($2, gateway_order_ref),
            updated_at = now()
        WHERE external_id = $3 AND status = ANY($4)
        RETURNING {ORDER_COLUMNS}
        "#
    ))
    .bind(to.as_str())
    .bind(gateway_ref.map(|r| r.as_str()))
    .bind(order_ref.as_str())
    .bind(&allowed)
    .fetch_optional(&mut **tx)
    .await?;

    row.map(Order::try_from).transpose()
}

pub async fn current_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    order_ref: &OrderRef,
) -> Result<Option<OrderStatus>, PipelineError> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM orders WHERE external_id = $1")
            .bind(order_ref.as_str())
            .fetch_optional(&mut **tx)
            .await?;

    status.as_deref().map(OrderStatus::try_from).transpose()
}

pub async fn in_status_since(
    pool: &sqlx::PgPool,
    status: OrderStatus,
    older_than: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Order>, PipelineError> {
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
        r#"
        SELECT {ORDER_COLUMNS} FROM orders
        WHERE status = $1 AND updated_at < $2
        ORDER BY updated_at
        LIMIT $3
        "#
    ))
    .bind(status.as_str())
    .bind(older_than)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Order::try_from).collect()
}

pub async fn insert_payment(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    order_id: Uuid,
    payment: &NewPayment,
) -> Result<(), PipelineError> {
    sqlx::query(
        r#"
        INSERT INTO payments (id, order_id, payment_ref, method, status, amount, raw_payload)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(payment.id)
    .bind(order_id)
    .bind(payment.payment_ref.as_str())
    .bind(payment.method.as_deref())
    .bind(payment.status.as_str())
    .bind(payment.amount.map(|a| a.get()))
    .bind(&payment.raw_payload)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    payment_ref: String,
    method: Option<String>,
    status: String,
    amount: Option<i64>,
    raw_payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

pub async fn payments_for(
    pool: &sqlx::PgPool,
    order_ref: &OrderRef,
) -> Result<Vec<Payment>, PipelineError> {
    let rows: Vec<PaymentRow> = sqlx::query_as(
        r#"
        SELECT p.id, p.order_id, p.payment_ref, p.method, p.status, p.amount,
               p.raw_payload, p.created_at
        FROM payments p
        JOIN orders o ON o.id = p.order_id
        WHERE o.external_id = $1
        ORDER BY p.created_at
        "#,
    )
    .bind(order_ref.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            Ok(Payment {
                id: r.id,
                order_id: r.order_id,
                payment_ref: r.payment_ref,
                method: r.method,
                status: PaymentRecordStatus::try_from(r.status.as_str())?,
                amount: r.amount,
                raw_payload: r.raw_payload,
                created_at: r.created_at,
            })
        })
        .collect()
}
