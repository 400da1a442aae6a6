pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;
pub mod signature;
pub mod transport;

use {
    config::{PayuConfig, WebhookConfig},
    services::pipeline::WebhookPipeline,
    std::sync::Arc,
};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<WebhookPipeline>,
    pub webhooks: WebhookConfig,
    /// Hosted-checkout routes are mounted only when this is set.
    pub payu: Option<PayuConfig>,
    pub admin_token: Option<String>,
}
