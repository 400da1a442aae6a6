//! Explicit configuration, read once at startup and handed to each
//! collaborator when it is constructed.

use {
    std::{env, str::FromStr, time::Duration},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Plain,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub store: StoreKind,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub aggregator: AggregatorConfig,
    /// Hosted-checkout rail; `None` unless `PAYU_MERCHANT_KEY` is set.
    pub payu: Option<PayuConfig>,
    pub webhooks: WebhookConfig,
    pub reconciler: ReconcilerConfig,
    /// Bearer token for operator routes; those routes refuse every call without it.
    pub admin_token: Option<String>,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub base_url: String,
    pub api_key: String,
    pub aggregator_id: String,
    pub biller_code: String,
    pub hash_salt: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PayuConfig {
    /// Where the payer's browser posts the signed checkout form.
    pub action_url: String,
    pub merchant_key: String,
    pub salt: String,
    pub success_url: String,
    pub failure_url: String,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Budget for verify + persist inside the HTTP request.
    pub verify_timeout: Duration,
    /// Budget for the background settlement task started by a capture.
    pub settlement_budget: Duration,
    /// When set, settlement callbacks must carry a valid signature.
    pub settlement_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub interval: Duration,
    pub grace: Duration,
    pub batch: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let store = match optional("STORE").as_deref() {
            None | Some("postgres") => StoreKind::Postgres,
            Some("memory") => StoreKind::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "STORE",
                    value: other.to_string(),
                });
            }
        };

        let database = DatabaseConfig {
            url: match store {
                StoreKind::Postgres => Some(required("DATABASE_URL")?),
                StoreKind::Memory => optional("DATABASE_URL"),
            },
            max_connections: parsed("DB_MAX_CONNECTIONS", 20)?,
            acquire_timeout: Duration::from_secs(parsed("DB_ACQUIRE_TIMEOUT_SECS", 3)?),
        };

        let gateway = GatewayConfig {
            base_url: optional("RAZORPAY_BASE_URL")
                .unwrap_or_else(|| "https://api.razorpay.com".to_string()),
            key_id: required("RAZORPAY_KEY_ID")?,
            key_secret: required("RAZORPAY_KEY_SECRET")?,
            webhook_secret: required("RAZORPAY_WEBHOOK_SECRET")?,
            timeout: Duration::from_millis(parsed("RAZORPAY_TIMEOUT_MS", 10_000)?),
        };

        let aggregator = AggregatorConfig {
            base_url: required("BBPS_BASE_URL")?,
            api_key: required("BBPS_API_KEY")?,
            aggregator_id: required("BBPS_AGGREGATOR_ID")?,
            biller_code: required("BILLER_CODE")?,
            hash_salt: required("BBPS_HASH_SALT")?,
            timeout: Duration::from_millis(parsed("BBPS_TIMEOUT_MS", 20_000)?),
        };

        let payu = match optional("PAYU_MERCHANT_KEY") {
            None => None,
            Some(merchant_key) => Some(PayuConfig {
                action_url: optional("PAYU_BASE_URL")
                    .unwrap_or_else(|| "https://secure.payu.in/_payment".to_string()),
                merchant_key,
                salt: required("PAYU_SALT")?,
                success_url: required("PAYU_SUCCESS_URL")?,
                failure_url: required("PAYU_FAILURE_URL")?,
            }),
        };

        let webhooks = WebhookConfig {
            verify_timeout: Duration::from_millis(parsed("WEBHOOK_TIMEOUT_MS", 5_000)?),
            settlement_budget: Duration::from_millis(parsed("SETTLEMENT_BUDGET_MS", 45_000)?),
            settlement_secret: optional("SETTLEMENT_WEBHOOK_SECRET"),
        };

        let reconciler = ReconcilerConfig {
            interval: Duration::from_secs(parsed("RECONCILE_INTERVAL_SECS", 60)?),
            grace: Duration::from_secs(parsed("RECONCILE_GRACE_SECS", 300)?),
            batch: parsed("RECONCILE_BATCH", 50)?,
        };

        let log_format = match optional("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            None | Some("plain") => LogFormat::Plain,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            store,
            database,
            gateway,
            aggregator,
            payu,
            webhooks,
            reconciler,
            admin_token: optional("ADMIN_API_TOKEN"),
            log_format,
        })
    }
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw,
        }),
    }
}
