//! Rotation manager tests

mod strategy;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use super::ApiCaller;
use crate::error::{TrellisError, TrellisResult};
use crate::http::{ApiHealth, ApiRequest, HealthStatus};

/// Upstream stand-in that replays scripted outcomes, then repeats a fallback
pub(super) struct ScriptedCaller {
    name: String,
    script: Mutex<VecDeque<TrellisResult<Value>>>,
    fallback: TrellisResult<Value>,
    delay: Duration,
    calls: AtomicU32,
}

impl ScriptedCaller {
    pub fn ok(name: &str) -> Arc<Self> {
        Self::build(name, Ok(json!({ "served_by": name })))
    }

    pub fn failing(name: &str, error: TrellisError) -> Arc<Self> {
        Self::build(name, Err(error))
    }

    pub fn slow(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::plain(name, Ok(json!({ "served_by": name })))
        })
    }

    /// Returns `script` in order, then succeeds
    pub fn scripted(name: &str, script: Vec<TrellisResult<Value>>) -> Arc<Self> {
        let caller = Self::plain(name, Ok(json!({ "served_by": name })));
        *caller.script.lock() = script.into();
        Arc::new(caller)
    }

    fn build(name: &str, fallback: TrellisResult<Value>) -> Arc<Self> {
        Arc::new(Self::plain(name, fallback))
    }

    fn plain(name: &str, fallback: TrellisResult<Value>) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApiCaller for ScriptedCaller {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, _request: &ApiRequest) -> TrellisResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    async fn health_check(&self) -> ApiHealth {
        let status = if self.fallback.is_ok() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        ApiHealth::new(&self.name, status)
    }
}

pub(super) fn server_error(api: &str) -> TrellisError {
    TrellisError::external_api_status(api, 503, "upstream unavailable")
}

pub(super) fn request() -> ApiRequest {
    ApiRequest::get("/identify")
}
