//! Provider Gateway
//!
//! Stateless client for one upstream provider (base URL + API key). Two
//! operations: submit an order and fetch the status of many orders at once.

pub mod http;
pub mod wire;

pub use http::{HttpProvider, HttpProviderFactory};
pub use wire::StatusEntry;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::catalog::Provider;
use crate::core_types::ProviderOrderId;

#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Provider request failed: {0}")]
    Transport(String),

    #[error("Provider request timed out")]
    Timeout,

    #[error("Provider returned HTTP {0}")]
    Status(u16),

    #[error("Invalid provider response: {0}")]
    Decode(String),

    #[error("Provider rejected request: {0}")]
    Rejected(String),
}

impl ProviderError {
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::Transport(_) => "PROVIDER_TRANSPORT",
            ProviderError::Timeout => "PROVIDER_TIMEOUT",
            ProviderError::Status(_) => "PROVIDER_HTTP_STATUS",
            ProviderError::Decode(_) => "PROVIDER_DECODE",
            ProviderError::Rejected(_) => "PROVIDER_REJECTED",
        }
    }
}

/// Order as sent upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOrder {
    /// Service number on the provider side
    pub provider_service_id: i64,
    pub link: String,
    pub quantity: i64,
}

/// Provider reply to `add`; exactly one of the two is meaningful
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitReply {
    Accepted(ProviderOrderId),
    Error(String),
}

#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn submit(&self, order: &SubmitOrder) -> Result<SubmitReply, ProviderError>;

    /// One request for all `ids`; callers chunk to the provider's batch limit.
    async fn order_statuses(
        &self,
        ids: &[ProviderOrderId],
    ) -> Result<Vec<StatusEntry>, ProviderError>;
}

/// Builds a gateway for a catalog provider
pub trait ProviderGatewayFactory: Send + Sync {
    fn gateway(&self, provider: &Provider) -> Arc<dyn ProviderGateway>;
}

/// Scriptable provider for tests
#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::core_types::ProviderId;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
    use std::time::Duration;

    pub struct MockProvider {
        statuses: Mutex<HashMap<ProviderOrderId, StatusEntry>>,
        submit_reply: Mutex<Option<Result<SubmitReply, ProviderError>>>,
        next_order_id: AtomicI64,
        delay: Mutex<Duration>,
        fail_status: AtomicBool,
        submit_count: AtomicUsize,
        status_batches: Mutex<Vec<Vec<ProviderOrderId>>>,
        submitted: Mutex<Vec<SubmitOrder>>,
    }

    impl MockProvider {
        /// Accepts submissions, assigning ids from `first_order_id` upward
        pub fn new(first_order_id: ProviderOrderId) -> Self {
            Self {
                statuses: Mutex::new(HashMap::new()),
                submit_reply: Mutex::new(None),
                next_order_id: AtomicI64::new(first_order_id),
                delay: Mutex::new(Duration::ZERO),
                fail_status: AtomicBool::new(false),
                submit_count: AtomicUsize::new(0),
                status_batches: Mutex::new(Vec::new()),
                submitted: Mutex::new(Vec::new()),
            }
        }

        pub fn set_status(&self, order: ProviderOrderId, status: &str, start_counter: i64, remains: i64) {
            self.statuses.lock().unwrap().insert(
                order,
                StatusEntry {
                    status: status.to_string(),
                    start_counter,
                    remains,
                    charge: None,
                    order,
                    error: None,
                },
            );
        }

        pub fn set_status_error(&self, order: ProviderOrderId, error: &str) {
            self.statuses.lock().unwrap().insert(
                order,
                StatusEntry {
                    order,
                    error: Some(error.to_string()),
                    ..Default::default()
                },
            );
        }

        /// Fixed reply for every submit instead of sequential ids
        pub fn set_submit_reply(&self, reply: Result<SubmitReply, ProviderError>) {
            *self.submit_reply.lock().unwrap() = Some(reply);
        }

        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock().unwrap() = delay;
        }

        pub fn set_fail_status(&self, fail: bool) {
            self.fail_status.store(fail, Ordering::SeqCst);
        }

        pub fn submit_count(&self) -> usize {
            self.submit_count.load(Ordering::SeqCst)
        }

        pub fn submitted(&self) -> Vec<SubmitOrder> {
            self.submitted.lock().unwrap().clone()
        }

        pub fn status_batches(&self) -> Vec<Vec<ProviderOrderId>> {
            self.status_batches.lock().unwrap().clone()
        }

        async fn pause(&self) {
            let delay = *self.delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    #[async_trait]
    impl ProviderGateway for MockProvider {
        async fn submit(&self, order: &SubmitOrder) -> Result<SubmitReply, ProviderError> {
            self.submit_count.fetch_add(1, Ordering::SeqCst);
            self.submitted.lock().unwrap().push(order.clone());
            self.pause().await;

            if let Some(reply) = self.submit_reply.lock().unwrap().clone() {
                return reply;
            }
            Ok(SubmitReply::Accepted(
                self.next_order_id.fetch_add(1, Ordering::SeqCst),
            ))
        }

        async fn order_statuses(
            &self,
            ids: &[ProviderOrderId],
        ) -> Result<Vec<StatusEntry>, ProviderError> {
            self.status_batches.lock().unwrap().push(ids.to_vec());
            self.pause().await;

            if self.fail_status.load(Ordering::SeqCst) {
                return Err(ProviderError::Transport("mock connection refused".into()));
            }
            let statuses = self.statuses.lock().unwrap();
            Ok(ids.iter().filter_map(|id| statuses.get(id).cloned()).collect())
        }
    }

    /// Hands out pre-registered mocks by provider id
    #[derive(Default)]
    pub struct MockProviderFactory {
        providers: Mutex<HashMap<ProviderId, Arc<MockProvider>>>,
    }

    impl MockProviderFactory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn register(&self, provider_id: ProviderId, provider: Arc<MockProvider>) {
            self.providers.lock().unwrap().insert(provider_id, provider);
        }

        pub fn get(&self, provider_id: ProviderId) -> Arc<MockProvider> {
            self.providers
                .lock()
                .unwrap()
                .entry(provider_id)
                .or_insert_with(|| Arc::new(MockProvider::new(1)))
                .clone()
        }
    }

    impl ProviderGatewayFactory for MockProviderFactory {
        fn gateway(&self, provider: &Provider) -> Arc<dyn ProviderGateway> {
            self.get(provider.provider_id)
        }
    }
}

#[cfg(test)]
pub use mock::{MockProvider, MockProviderFactory};
