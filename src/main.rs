use {
    billpay_recon::{
        AppState,
        adapters::{aggregator::HttpAggregator, razorpay::RazorpayClient},
        config::{Config, LogFormat, StoreKind},
        domain::ports::{OrderStore, SettlementAggregator},
        infra::{memory::InMemoryStore, postgres::PgStore},
        services::{
            pipeline::{PipelineSecrets, WebhookPipeline},
            reconciler::{Reconciler, run_reconciler},
            settlement::{SettlementParams, SettlementTrigger},
        },
        transport::http::router,
    },
    sqlx::postgres::PgPoolOptions,
    std::sync::Arc,
    tokio::{signal, sync::watch},
    tracing_subscriber::EnvFilter,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let store: Arc<dyn OrderStore> = match config.store {
        StoreKind::Postgres => {
            let url = config
                .database
                .url
                .as_deref()
                .ok_or("DATABASE_URL must be set for the postgres store")?;
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .acquire_timeout(config.database.acquire_timeout)
                .connect(url)
                .await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        StoreKind::Memory => {
            tracing::warn!("using in-memory store, state is lost on restart");
            Arc::new(InMemoryStore::new())
        }
    };

    let aggregator: Arc<dyn SettlementAggregator> =
        Arc::new(HttpAggregator::new(&config.aggregator));
    let gateway = Arc::new(RazorpayClient::new(&config.gateway));

    let trigger = SettlementTrigger::new(
        store.clone(),
        aggregator.clone(),
        SettlementParams {
            aggregator_id: config.aggregator.aggregator_id.clone(),
            biller_code: config.aggregator.biller_code.clone(),
            hash_salt: config.aggregator.hash_salt.clone(),
        },
    );
    let pipeline = WebhookPipeline::new(
        store.clone(),
        gateway,
        trigger,
        PipelineSecrets {
            gateway_webhook: config.gateway.webhook_secret.clone(),
            settlement_webhook: config.webhooks.settlement_secret.clone(),
            payu_salt: config.payu.as_ref().map(|p| p.salt.clone()),
        },
    );
    if config.webhooks.settlement_secret.is_none() {
        tracing::warn!("SETTLEMENT_WEBHOOK_SECRET not set, settlement callbacks are unauthenticated");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = Arc::new(Reconciler::new(
        store,
        aggregator,
        config.reconciler.grace,
        config.reconciler.batch,
    ));
    let reconciler_task = tokio::spawn(run_reconciler(
        reconciler,
        config.reconciler.interval,
        shutdown_rx,
    ));

    let state = AppState {
        pipeline: Arc::new(pipeline),
        webhooks: config.webhooks.clone(),
        payu: config.payu.clone(),
        admin_token: config.admin_token.clone(),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on {}", config.bind_addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = reconciler_task.await {
        tracing::error!(error = %e, "reconciler task panicked");
    }
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Plain => builder.init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
