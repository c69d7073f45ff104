use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::wire::{AddRequest, AddResponse, OrdersRequest, OrdersResponse, StatusEntry};
use super::{
    ProviderError, ProviderGateway, ProviderGatewayFactory, SubmitOrder, SubmitReply,
};
use crate::catalog::Provider;
use crate::core_types::{PROVIDER_ORDER_UNSET, ProviderId, ProviderOrderId};

/// reqwest-backed provider client
pub struct HttpProvider {
    client: reqwest::Client,
    provider_id: ProviderId,
    url: String,
    api_key: String,
}

impl HttpProvider {
    pub fn new(client: reqwest::Client, provider: &Provider) -> Self {
        Self {
            client,
            provider_id: provider.provider_id,
            url: provider.url.clone(),
            api_key: provider.api_key.clone(),
        }
    }

    async fn post<B, R>(&self, action: &'static str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Transport(e.to_string())
            }
        })?;
        debug!(
            provider_id = self.provider_id,
            action,
            http_status = status.as_u16(),
            body_len = bytes.len(),
            "Provider response"
        );

        // Providers report business errors with non-2xx codes and a JSON body,
        // so try the body before giving up on the status.
        match serde_json::from_slice::<R>(&bytes) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => Err(ProviderError::Status(status.as_u16())),
            Err(e) => Err(ProviderError::Decode(e.to_string())),
        }
    }
}

#[async_trait]
impl ProviderGateway for HttpProvider {
    async fn submit(&self, order: &SubmitOrder) -> Result<SubmitReply, ProviderError> {
        let body = AddRequest {
            key: &self.api_key,
            action: "add",
            service: order.provider_service_id.to_string(),
            link: &order.link,
            quantity: order.quantity,
        };
        let reply: AddResponse = self.post("add", &body).await?;

        Ok(match reply.error {
            Some(error) if !error.is_empty() => SubmitReply::Error(error),
            _ if reply.order != PROVIDER_ORDER_UNSET => SubmitReply::Accepted(reply.order),
            _ => SubmitReply::Error(
                reply
                    .status
                    .unwrap_or_else(|| "provider returned no order id".to_string()),
            ),
        })
    }

    async fn order_statuses(
        &self,
        ids: &[ProviderOrderId],
    ) -> Result<Vec<StatusEntry>, ProviderError> {
        let orders = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let body = OrdersRequest {
            key: &self.api_key,
            action: "orders",
            orders,
        };
        let reply: OrdersResponse = self.post("orders", &body).await?;
        reply.into_entries().map_err(ProviderError::Rejected)
    }
}

/// Shares one connection pool across all providers
pub struct HttpProviderFactory {
    client: reqwest::Client,
}

impl HttpProviderFactory {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ProviderError::Transport(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self { client })
    }
}

impl ProviderGatewayFactory for HttpProviderFactory {
    fn gateway(&self, provider: &Provider) -> Arc<dyn ProviderGateway> {
        Arc::new(HttpProvider::new(self.client.clone(), provider))
    }
}
