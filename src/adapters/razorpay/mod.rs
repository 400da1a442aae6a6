pub mod webhook;

use {
    crate::{
        config::GatewayConfig,
        domain::{
            error::PipelineError,
            id::{GatewayOrderRef, OrderRef},
            money::MinorUnits,
            ports::GatewayClient,
        },
        signature,
    },
    serde::Deserialize,
    std::{future::Future, pin::Pin},
};

/// Razorpay orders API plus its checkout signature primitive.
pub struct RazorpayClient {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    timeout: std::time::Duration,
}

#[derive(Deserialize)]
struct CreatedOrder {
    id: String,
}

impl RazorpayClient {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            timeout: config.timeout,
        }
    }

    async fn create_order_inner(
        &self,
        amount: MinorUnits,
        receipt: &OrderRef,
    ) -> Result<GatewayOrderRef, PipelineError> {
        let body = serde_json::json!({
            "amount": amount.get(),
            "currency": "INR",
            "receipt": receipt.as_str(),
            "payment_capture": 1,
        });

        let resp = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| PipelineError::Gateway(format!("razorpay create order: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Gateway(format!(
                "razorpay create order returned {status}: {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        let created: CreatedOrder = resp
            .json()
            .await
            .map_err(|e| PipelineError::Gateway(format!("razorpay order body: {e}")))?;
        GatewayOrderRef::new(created.id)
    }
}

impl GatewayClient for RazorpayClient {
    fn create_gateway_order(
        &self,
        amount: MinorUnits,
        receipt: &OrderRef,
    ) -> Pin<Box<dyn Future<Output = Result<GatewayOrderRef, PipelineError>> + Send + '_>> {
        let receipt = receipt.clone();
        Box::pin(async move { self.create_order_inner(amount, &receipt).await })
    }

    fn verify_checkout_signature(
        &self,
        gateway_order_ref: &str,
        payment_ref: &str,
        claimed: &str,
    ) -> bool {
        signature::verify_checkout(gateway_order_ref, payment_ref, claimed, &self.key_secret)
    }

    fn public_key_id(&self) -> &str {
        &self.key_id
    }
}
