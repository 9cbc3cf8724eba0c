//! The call seam between a rotation manager and its upstreams

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TrellisResult;
use crate::http::{ApiClient, ApiHealth, ApiRequest};

/// Something a rotation endpoint can send requests to
#[async_trait]
pub trait ApiCaller: Send + Sync {
    fn name(&self) -> &str;

    async fn call(&self, request: &ApiRequest) -> TrellisResult<Value>;

    async fn health_check(&self) -> ApiHealth;
}

#[async_trait]
impl ApiCaller for ApiClient {
    fn name(&self) -> &str {
        self.api_name()
    }

    async fn call(&self, request: &ApiRequest) -> TrellisResult<Value> {
        self.execute(request).await
    }

    async fn health_check(&self) -> ApiHealth {
        ApiClient::health_check(self).await
    }
}
