pub mod errors;

use {
    crate::{
        AppState,
        adapters::{aggregator, orders, payu, razorpay},
    },
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    tower_http::trace::TraceLayer,
};

/// Gateway and aggregator payloads are a few KB.
const BODY_LIMIT: usize = 64 * 1024;

pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/orders", post(orders::create_order_handler))
        .route("/orders/{order_ref}", get(orders::order_status_handler))
        .route(
            "/orders/{order_ref}/settlement/replay",
            post(orders::replay_settlement_handler),
        )
        .route(
            "/payments/verify",
            post(razorpay::webhook::checkout_verify_handler),
        )
        .route(
            "/webhook/gateway",
            post(razorpay::webhook::gateway_webhook_handler),
        )
        .route(
            "/webhook/settlement",
            post(aggregator::webhook::settlement_webhook_handler),
        );

    if state.payu.is_some() {
        app = app
            .route("/generatePayment", post(payu::generate_payment_handler))
            .route("/payment/payu/verify", post(payu::payu_verify_handler))
            .route("/payment/payu/success", post(payu::payu_return_handler))
            .route("/payment/payu/failure", post(payu::payu_return_handler));
    }

    app.layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
