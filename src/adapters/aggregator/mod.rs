pub mod webhook;

use {
    crate::{
        config::AggregatorConfig,
        domain::{
            error::PipelineError,
            id::OrderRef,
            ports::SettlementAggregator,
            settlement::{AggregatorReply, SettlementRequest, SettlementStatus},
        },
    },
    reqwest::StatusCode,
    std::{future::Future, pin::Pin},
};

/// HTTP client for the biller-settlement aggregator.
pub struct HttpAggregator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    biller_code: String,
    timeout: std::time::Duration,
}

impl HttpAggregator {
    pub fn new(config: &AggregatorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            biller_code: config.biller_code.clone(),
            timeout: config.timeout,
        }
    }

    async fn submit_inner(&self, request: &SettlementRequest, idempotency_key: &str) -> AggregatorReply {
        let url = format!("{}/v1/{}/pay", self.base_url, self.biller_code);
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header("X-Idempotency-Key", idempotency_key)
            .json(request)
            .timeout(self.timeout)
            .send()
            .await;

        match resp {
            Ok(r) => {
                let code = r.status().as_u16();
                let text = r.text().await.unwrap_or_default();
                let body = serde_json::from_str(&text)
                    .unwrap_or_else(|_| serde_json::json!({ "raw": text }));
                AggregatorReply {
                    http_status: Some(code),
                    body,
                    transport_error: None,
                }
            }
            Err(e) if e.is_timeout() => AggregatorReply::transport_failure("aggregator timeout"),
            Err(e) => AggregatorReply::transport_failure(e.to_string()),
        }
    }

    async fn query_status_inner(
        &self,
        order_ref: &OrderRef,
    ) -> Result<Option<SettlementStatus>, PipelineError> {
        let url = format!(
            "{}/v1/{}/status/{}",
            self.base_url, self.biller_code, order_ref
        );
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| PipelineError::Gateway(format!("aggregator status query: {e}")))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(PipelineError::Gateway(format!(
                "aggregator status query returned {}",
                resp.status()
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PipelineError::Gateway(format!("aggregator status body: {e}")))?;
        Ok(body
            .get("status")
            .and_then(|v| v.as_str())
            .map(SettlementStatus::from_reported))
    }
}

impl SettlementAggregator for HttpAggregator {
    fn submit(
        &self,
        request: &SettlementRequest,
        idempotency_key: &str,
    ) -> Pin<Box<dyn Future<Output = AggregatorReply> + Send + '_>> {
        let request = request.clone();
        let key = idempotency_key.to_string();
        Box::pin(async move { self.submit_inner(&request, &key).await })
    }

    fn query_status(
        &self,
        order_ref: &OrderRef,
    ) -> Pin<Box<dyn Future<Output = Result<Option<SettlementStatus>, PipelineError>> + Send + '_>>
    {
        let order_ref = order_ref.clone();
        Box::pin(async move { self.query_status_inner(&order_ref).await })
    }
}
