//! Tiered, endpoint-aware request throttling on top of the sliding window

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::limiter::SlidingWindowLimiter;
use super::matcher::PathMatcher;
use super::types::{CallerTier, RateLimitDecision, RateSpec, RequestContext, UsageInfo, WindowResult};
use crate::error::{TrellisError, TrellisResult};

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);
const DAY: Duration = Duration::from_secs(86_400);

const fn rate(limit: u32, window: Duration) -> RateSpec {
    RateSpec { limit, window }
}

/// A per-path override of the tier defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointLimit {
    /// Exact path, path prefix, or a pattern containing `*`
    pub pattern: String,
    pub rate: RateSpec,
}

impl EndpointLimit {
    pub fn new(pattern: impl Into<String>, rate: RateSpec) -> Self {
        Self {
            pattern: pattern.into(),
            rate,
        }
    }
}

/// `[rate_limit]` configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicyConfig {
    pub enabled: bool,
    /// Anonymous and regular users
    pub global: RateSpec,
    pub premium: RateSpec,
    pub admin: RateSpec,
    /// Extra requests tolerated once the primary window is full; 0 disables
    pub burst_limit: u32,
    #[serde(with = "humantime_serde")]
    pub burst_window: Duration,
    pub key_prefix: String,
    pub burst_prefix: String,
    /// Checked in order after exact matches
    pub endpoints: Vec<EndpointLimit>,
    /// feature -> audience (`free_user`, `premium_user`, `admin`, `all_users`, ...) -> rate
    pub features: BTreeMap<String, BTreeMap<String, RateSpec>>,
}

impl Default for RateLimitPolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global: rate(100, MINUTE),
            premium: rate(500, MINUTE),
            admin: rate(1000, MINUTE),
            burst_limit: 10,
            burst_window: MINUTE,
            key_prefix: "rate_limit:".to_string(),
            burst_prefix: "burst_limit:".to_string(),
            endpoints: default_endpoints(),
            features: default_features(),
        }
    }
}

fn default_endpoints() -> Vec<EndpointLimit> {
    [
        ("/api/v1/auth/login", 5),
        ("/api/v1/auth/register", 3),
        ("/api/v1/auth/refresh", 10),
        ("/api/v1/auth/forgot-password", 3),
        ("/api/v1/plants/identify", 10),
        ("/api/v1/ai/chat", 30),
        ("/api/v1/ai/recommendations", 20),
        ("/api/v1/plants/photos", 20),
        ("/api/v1/growth/photos", 20),
        ("/api/v1/community/posts", 15),
        ("/api/v1/community/comments", 30),
        ("/api/v1/payments/process", 5),
        ("/api/v1/subscriptions/create", 2),
    ]
    .into_iter()
    .map(|(path, per_minute)| EndpointLimit::new(path, rate(per_minute, MINUTE)))
    .collect()
}

fn default_features() -> BTreeMap<String, BTreeMap<String, RateSpec>> {
    let table: [(&str, &[(&str, RateSpec)]); 6] = [
        (
            "api_calls",
            &[
                ("free_user", rate(1000, HOUR)),
                ("premium_user", rate(5000, HOUR)),
                ("admin", rate(10_000, HOUR)),
            ],
        ),
        (
            "plant_identification",
            &[("free_user", rate(10, DAY)), ("premium_user", rate(100, DAY))],
        ),
        (
            "ai_chat",
            &[("free_user", rate(20, HOUR)), ("premium_user", rate(200, HOUR))],
        ),
        ("file_upload", &[("all_users", rate(50, HOUR))]),
        ("auth_attempts", &[("by_ip", rate(10, MINUTE))]),
        ("password_reset", &[("by_email", rate(3, HOUR))]),
    ];

    table
        .iter()
        .map(|(feature, audiences)| {
            let audiences = audiences
                .iter()
                .map(|(audience, spec)| (audience.to_string(), *spec))
                .collect();
            (feature.to_string(), audiences)
        })
        .collect()
}

/// Inbound request throttling: tier defaults, endpoint overrides and burst allowance
#[derive(Debug)]
pub struct RateLimitPolicy {
    config: RateLimitPolicyConfig,
    exact: HashMap<String, RateSpec>,
    patterns: Vec<(PathMatcher, RateSpec)>,
    limiter: SlidingWindowLimiter,
}

impl RateLimitPolicy {
    /// Compile endpoint patterns; fails on a pattern that is not a valid regex
    pub fn new(config: RateLimitPolicyConfig, limiter: SlidingWindowLimiter) -> TrellisResult<Self> {
        let mut exact = HashMap::new();
        let mut patterns = Vec::with_capacity(config.endpoints.len());
        for endpoint in &config.endpoints {
            if !endpoint.pattern.contains('*') {
                exact.entry(endpoint.pattern.clone()).or_insert(endpoint.rate);
            }
            patterns.push((PathMatcher::compile(&endpoint.pattern)?, endpoint.rate));
        }

        tracing::debug!(
            endpoints = config.endpoints.len(),
            features = config.features.len(),
            burst_limit = config.burst_limit,
            "rate limit policy compiled"
        );

        Ok(Self {
            config,
            exact,
            patterns,
            limiter,
        })
    }

    /// Policy over a fresh in-memory store
    pub fn in_memory(config: RateLimitPolicyConfig) -> TrellisResult<Self> {
        Self::new(config, SlidingWindowLimiter::in_memory())
    }

    pub fn config(&self) -> &RateLimitPolicyConfig {
        &self.config
    }

    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }

    /// Default limit for a caller tier
    pub fn tier_limit(&self, tier: CallerTier) -> RateSpec {
        match tier {
            CallerTier::Anonymous | CallerTier::User => self.config.global,
            CallerTier::Premium => self.config.premium,
            CallerTier::Admin => self.config.admin,
        }
    }

    /// Override for a path: exact match first, then patterns in config order
    pub fn endpoint_limit(&self, path: &str) -> Option<RateSpec> {
        if let Some(spec) = self.exact.get(path) {
            return Some(*spec);
        }
        self.patterns
            .iter()
            .find(|(matcher, _)| matcher.matches(path))
            .map(|(_, spec)| *spec)
    }

    /// Counter key and limit that apply to a request
    pub fn resolve(&self, ctx: &RequestContext) -> (String, RateSpec) {
        let subject = ctx.subject();
        let method = ctx.method.to_ascii_uppercase();
        match self.endpoint_limit(&ctx.path) {
            Some(spec) => (
                format!(
                    "{}{}:endpoint:{}:{}",
                    self.config.key_prefix, subject, ctx.path, method
                ),
                spec,
            ),
            None => (
                format!("{}{}:global:{}", self.config.key_prefix, subject, method),
                self.tier_limit(ctx.tier),
            ),
        }
    }

    /// Decide whether an inbound request may proceed, recording it if so
    #[instrument(skip(self, ctx), fields(method = %ctx.method, path = %ctx.path))]
    pub async fn check(&self, ctx: &RequestContext) -> RateLimitDecision {
        let (key, spec) = self.resolve(ctx);
        if !self.config.enabled {
            return RateLimitDecision {
                allowed: true,
                key,
                limit: spec.limit,
                remaining: u64::from(spec.limit),
                current_count: 0,
                reset_time: Utc::now(),
                window: spec.window,
                burst_used: false,
                degraded: false,
            };
        }

        let decision = self.decide(key, spec).await;
        if !decision.allowed {
            tracing::warn!(
                key = %decision.key,
                limit = decision.limit,
                window_secs = decision.window.as_secs(),
                "rate limit exceeded"
            );
        }
        decision
    }

    /// Like [`check`](Self::check) but returns the denial as an error
    pub async fn enforce(&self, ctx: &RequestContext) -> TrellisResult<RateLimitDecision> {
        let decision = self.check(ctx).await;
        if decision.allowed {
            Ok(decision)
        } else {
            Err(decision.to_error())
        }
    }

    async fn decide(&self, key: String, spec: RateSpec) -> RateLimitDecision {
        let primary = self
            .limiter
            .check_and_increment(&key, spec.limit, spec.window)
            .await;
        if primary.allowed || self.config.burst_limit == 0 {
            return Self::decision(key, spec, &primary, false);
        }

        let burst_key = format!("{}{}", self.config.burst_prefix, key);
        let burst = self
            .limiter
            .check_and_increment(&burst_key, self.config.burst_limit, self.config.burst_window)
            .await;
        if !burst.allowed {
            return Self::decision(key, spec, &primary, false);
        }

        // Burst admitted the request; the primary window still sees it
        let current_count = match self.limiter.record(&key, spec.window).await {
            Ok(counted) => counted.count,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to record burst request in primary window");
                primary.current_count + 1
            }
        };
        let admitted = WindowResult {
            allowed: true,
            current_count,
            remaining: 0,
            degraded: burst.degraded,
            ..primary
        };
        tracing::debug!(key = %key, burst_count = burst.current_count, "burst allowance used");
        Self::decision(key, spec, &admitted, true)
    }

    fn decision(key: String, spec: RateSpec, window: &WindowResult, burst_used: bool) -> RateLimitDecision {
        RateLimitDecision {
            allowed: window.allowed,
            key,
            limit: spec.limit,
            remaining: window.remaining,
            current_count: window.current_count,
            reset_time: window.reset_time,
            window: spec.window,
            burst_used,
            degraded: window.degraded,
        }
    }

    /// Apply a per-feature limit using the tier's entry, then `all_users`.
    ///
    /// Returns `None` when the feature has no limit for this caller.
    pub async fn check_feature(
        &self,
        subject: &str,
        feature: &str,
        tier: CallerTier,
    ) -> Option<RateLimitDecision> {
        let audiences = self.config.features.get(feature)?;
        let audience = [tier.feature_key(), "all_users"]
            .into_iter()
            .find(|a| audiences.contains_key(*a));
        match audience {
            Some(audience) => self.check_feature_for(subject, feature, audience).await,
            None => {
                tracing::debug!(feature, tier = %tier, "no feature limit configured");
                None
            }
        }
    }

    /// Apply a per-feature limit for an explicit audience such as `by_ip`
    pub async fn check_feature_for(
        &self,
        subject: &str,
        feature: &str,
        audience: &str,
    ) -> Option<RateLimitDecision> {
        let spec = *self.config.features.get(feature)?.get(audience)?;
        let key = self.feature_key(subject, feature);
        let window = self
            .limiter
            .check_and_increment(&key, spec.limit, spec.window)
            .await;
        if !window.allowed {
            tracing::warn!(subject, feature, audience, limit = spec.limit, "feature limit exceeded");
        }
        Some(Self::decision(key, spec, &window, false))
    }

    fn feature_key(&self, subject: &str, feature: &str) -> String {
        format!("{}{}:feature:{}", self.config.key_prefix, subject, feature)
    }

    /// Usage of the primary window that applies to a request
    pub async fn usage(&self, ctx: &RequestContext) -> TrellisResult<UsageInfo> {
        let (key, spec) = self.resolve(ctx);
        self.limiter.usage(&key, spec.window).await
    }

    /// Clear both the primary and burst counters for a request's key
    pub async fn reset(&self, ctx: &RequestContext) -> TrellisResult<bool> {
        let (key, _) = self.resolve(ctx);
        let primary = self.limiter.reset(&key).await?;
        let burst = self
            .limiter
            .reset(&format!("{}{}", self.config.burst_prefix, key))
            .await?;
        Ok(primary || burst)
    }
}

/// Check every pattern compiles and every window is supported
pub(crate) fn validate_config(config: &RateLimitPolicyConfig) -> TrellisResult<()> {
    for endpoint in &config.endpoints {
        PathMatcher::compile(&endpoint.pattern)?;
    }
    if config.burst_limit > 0 && config.burst_window.is_zero() {
        return Err(TrellisError::config_with_context(
            "burst_window must be non-zero when burst_limit is set",
            "rate_limit",
        ));
    }
    if config.burst_window < SECOND && !config.burst_window.is_zero() {
        return Err(TrellisError::config_with_context(
            "burst_window must be at least one second",
            "rate_limit",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_with(endpoints: Vec<EndpointLimit>) -> RateLimitPolicy {
        RateLimitPolicy::in_memory(RateLimitPolicyConfig {
            endpoints,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_matching_precedence() {
        let policy = policy_with(vec![
            EndpointLimit::new("/api/v1/plants/*/photos", rate(7, MINUTE)),
            EndpointLimit::new("/api/v1/plants", rate(11, MINUTE)),
            EndpointLimit::new("/api/v1/plants/identify", rate(3, MINUTE)),
        ]);

        // Exact beats an earlier prefix
        assert_eq!(policy.endpoint_limit("/api/v1/plants/identify"), Some(rate(3, MINUTE)));
        // Wildcard listed first wins over the prefix
        assert_eq!(policy.endpoint_limit("/api/v1/plants/42/photos"), Some(rate(7, MINUTE)));
        // Prefix needs a path separator after the pattern
        assert_eq!(policy.endpoint_limit("/api/v1/plants/42"), Some(rate(11, MINUTE)));
        assert_eq!(policy.endpoint_limit("/api/v1/plantsxyz"), None);
        // Wildcards are anchored
        assert_eq!(policy.endpoint_limit("/api/v1/plants/42/photos/9"), Some(rate(11, MINUTE)));
    }

    #[test]
    fn test_resolve_keys_and_tiers() {
        let policy = policy_with(vec![EndpointLimit::new("/api/v1/auth/login", rate(5, MINUTE))]);

        let ctx = RequestContext::new("post", "/api/v1/auth/login").with_peer_addr("10.1.1.1");
        let (key, spec) = policy.resolve(&ctx);
        assert_eq!(key, "rate_limit:ip:10.1.1.1:endpoint:/api/v1/auth/login:POST");
        assert_eq!(spec.limit, 5);

        let ctx = RequestContext::new("GET", "/api/v1/garden").with_user("u1", CallerTier::Premium);
        let (key, spec) = policy.resolve(&ctx);
        assert_eq!(key, "rate_limit:user:u1:global:GET");
        assert_eq!(spec, rate(500, MINUTE));

        let admin = RequestContext::new("GET", "/x").with_user("root", CallerTier::Admin);
        assert_eq!(policy.resolve(&admin).1.limit, 1000);
        let user = RequestContext::new("GET", "/x").with_user("u2", CallerTier::User);
        assert_eq!(policy.resolve(&user).1.limit, 100);
    }

    #[test]
    fn test_wildcard_escapes_regex_metacharacters() {
        let policy = policy_with(vec![EndpointLimit::new("/api/(v*)/search", rate(1, MINUTE))]);
        assert_eq!(policy.endpoint_limit("/api/(v2)/search"), Some(rate(1, MINUTE)));
        assert_eq!(policy.endpoint_limit("/api/v2/search"), None);
    }

    #[test]
    fn test_default_tables() {
        let config = RateLimitPolicyConfig::default();
        assert_eq!(config.endpoints.len(), 13);
        assert_eq!(config.features["plant_identification"]["free_user"], rate(10, DAY));
        assert_eq!(config.features["auth_attempts"]["by_ip"].window, MINUTE);
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.burst_window, MINUTE);
        assert_eq!(rate(1, SECOND).to_string(), "1/second");
    }
}
