//! Rate limit data types

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{TrellisError, TrellisResult};

const RATE_FORMAT_HINT: &str = "expected '<count>/<second|minute|hour|day>', e.g. '100/minute'";

/// A request budget over a fixed-length sliding window, written as `"100/minute"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RateSpec {
    pub limit: u32,
    pub window: Duration,
}

impl RateSpec {
    /// Build a spec, rejecting a zero limit or an unsupported window
    pub fn new(limit: u32, window: Duration) -> TrellisResult<Self> {
        if limit == 0 {
            return Err(TrellisError::config_with_context(
                "rate limit must be greater than 0",
                RATE_FORMAT_HINT,
            ));
        }
        if window_unit(window).is_none() {
            return Err(TrellisError::config_with_context(
                format!("unsupported rate limit window of {}s", window.as_secs()),
                RATE_FORMAT_HINT,
            ));
        }
        Ok(Self { limit, window })
    }

    pub fn per_second(limit: u32) -> TrellisResult<Self> {
        Self::new(limit, Duration::from_secs(1))
    }

    pub fn per_minute(limit: u32) -> TrellisResult<Self> {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn per_hour(limit: u32) -> TrellisResult<Self> {
        Self::new(limit, Duration::from_secs(3600))
    }

    pub fn per_day(limit: u32) -> TrellisResult<Self> {
        Self::new(limit, Duration::from_secs(86_400))
    }

    /// Window length in whole seconds
    pub fn window_secs(&self) -> u64 {
        self.window.as_secs()
    }
}

fn window_unit(window: Duration) -> Option<&'static str> {
    match window.as_secs() {
        1 => Some("second"),
        60 => Some("minute"),
        3600 => Some("hour"),
        86_400 => Some("day"),
        _ => None,
    }
}

impl FromStr for RateSpec {
    type Err = TrellisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| {
            TrellisError::config_with_context(
                format!("invalid rate limit '{}': {}", s, reason),
                RATE_FORMAT_HINT,
            )
        };

        let normalized = s.trim().to_ascii_lowercase();
        let (count, unit) = normalized
            .split_once('/')
            .ok_or_else(|| invalid("missing '/'"))?;

        let limit: u32 = count
            .trim()
            .parse()
            .map_err(|_| invalid("count is not a positive integer"))?;

        let unit = unit.trim();
        let unit = unit.strip_suffix('s').unwrap_or(unit);
        let seconds = match unit {
            "second" => 1,
            "minute" => 60,
            "hour" => 3600,
            "day" => 86_400,
            _ => return Err(invalid("unknown period")),
        };

        Self::new(limit, Duration::from_secs(seconds)).map_err(|_| invalid("count must be > 0"))
    }
}

impl TryFrom<String> for RateSpec {
    type Error = TrellisError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RateSpec> for String {
    fn from(spec: RateSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for RateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match window_unit(self.window) {
            Some(unit) => write!(f, "{}/{}", self.limit, unit),
            None => write!(f, "{}/{}s", self.limit, self.window.as_secs()),
        }
    }
}

/// Outcome of one atomic check-and-increment against a window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowResult {
    pub allowed: bool,
    /// Entries in the window after this decision
    pub current_count: u64,
    pub remaining: u64,
    /// When the oldest surviving entry leaves the window
    pub reset_time: DateTime<Utc>,
    /// Set when the counter store failed and the request was let through
    pub degraded: bool,
}

/// Current state of a key without recording a request
#[derive(Debug, Clone, Serialize)]
pub struct UsageInfo {
    pub key: String,
    pub current_count: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub reset_time: DateTime<Utc>,
}

/// Caller privilege level used to select a default limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerTier {
    #[default]
    Anonymous,
    User,
    Premium,
    Admin,
}

impl CallerTier {
    /// Tier key used in per-feature limit tables
    pub fn feature_key(&self) -> &'static str {
        match self {
            Self::Anonymous | Self::User => "free_user",
            Self::Premium => "premium_user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for CallerTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::User => write!(f, "user"),
            Self::Premium => write!(f, "premium"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Who a request is counted against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    User(String),
    Ip(String),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{}", id),
            Self::Ip(addr) => write!(f, "ip:{}", addr),
        }
    }
}

/// The parts of an inbound request the limiter needs
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub user_id: Option<String>,
    pub tier: CallerTier,
    /// Header names are matched case-insensitively
    pub headers: HashMap<String, String>,
    pub peer_addr: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Mark the request as authenticated
    pub fn with_user(mut self, user_id: impl Into<String>, tier: CallerTier) -> Self {
        self.user_id = Some(user_id.into());
        self.tier = tier;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_peer_addr(mut self, addr: impl Into<String>) -> Self {
        self.peer_addr = Some(addr.into());
        self
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer
    pub fn client_ip(&self) -> String {
        if let Some(first) = self
            .header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return first.to_string();
        }
        if let Some(real_ip) = self.header("x-real-ip") {
            return real_ip.to_string();
        }
        self.peer_addr
            .clone()
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Authenticated identity wins over the client address
    pub fn subject(&self) -> Subject {
        match &self.user_id {
            Some(id) => Subject::User(id.clone()),
            None => Subject::Ip(self.client_ip()),
        }
    }
}

/// Allow/deny decision for an inbound request
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub key: String,
    pub limit: u32,
    pub remaining: u64,
    pub current_count: u64,
    pub reset_time: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub burst_used: bool,
    /// Set when the counter store failed and the request was let through
    pub degraded: bool,
}

impl RateLimitDecision {
    /// Seconds until the window frees a slot, never below 1
    pub fn retry_after_secs(&self) -> u64 {
        let secs = (self.reset_time - Utc::now()).num_milliseconds().max(0) as u64;
        secs.div_ceil(1000).max(1)
    }

    /// Response headers describing this decision
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-Rate-Limit-Limit", self.limit.to_string()),
            ("X-Rate-Limit-Remaining", self.remaining.to_string()),
            ("X-Rate-Limit-Reset", self.reset_time.timestamp().to_string()),
            ("X-Rate-Limit-Window", self.window.as_secs().to_string()),
        ];
        if self.burst_used {
            headers.push(("X-Rate-Limit-Burst-Used", "true".to_string()));
        }
        if !self.allowed {
            headers.push(("Retry-After", self.retry_after_secs().to_string()));
        }
        headers
    }

    /// JSON body for a 429 response
    pub fn denial_body(&self) -> Value {
        json!({
            "error": {
                "code": "RATE_LIMIT_EXCEEDED",
                "message": format!(
                    "Rate limit of {} requests per {} seconds exceeded",
                    self.limit,
                    self.window.as_secs()
                ),
                "details": {
                    "limit": self.limit,
                    "window_seconds": self.window.as_secs(),
                    "current_usage": self.current_count,
                    "reset_time": self.reset_time.to_rfc3339(),
                    "retry_after_seconds": self.retry_after_secs(),
                },
                "timestamp": Utc::now().to_rfc3339(),
            }
        })
    }

    /// Convert a denial into the error callers propagate
    pub fn to_error(&self) -> TrellisError {
        TrellisError::rate_limited_until(
            self.key.clone(),
            format!("{} requests per {}s", self.limit, self.window.as_secs()),
            self.reset_time,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate_spec_forms() {
        let spec: RateSpec = "100/minute".parse().unwrap();
        assert_eq!(spec.limit, 100);
        assert_eq!(spec.window, Duration::from_secs(60));

        let spec: RateSpec = "  10/Days ".parse().unwrap();
        assert_eq!(spec.window, Duration::from_secs(86_400));

        let spec: RateSpec = "3/hours".parse().unwrap();
        assert_eq!(spec.to_string(), "3/hour");
    }

    #[test]
    fn test_parse_rate_spec_rejects_garbage() {
        for bad in ["", "100", "0/minute", "-1/minute", "ten/minute", "5/fortnight", "5/month"] {
            let err = bad.parse::<RateSpec>().unwrap_err();
            assert!(
                matches!(err, TrellisError::Config { .. }),
                "{:?} should fail with a config error",
                bad
            );
        }
    }

    #[test]
    fn test_rate_spec_deserializes_from_string() {
        #[derive(Deserialize)]
        struct Holder {
            rate: RateSpec,
        }

        let holder: Holder = toml::from_str("rate = \"5/minute\"").unwrap();
        assert_eq!(holder.rate, RateSpec::per_minute(5).unwrap());

        assert!(toml::from_str::<Holder>("rate = \"5 per minute\"").is_err());
    }

    #[test]
    fn test_client_ip_resolution_order() {
        let ctx = RequestContext::new("get", "/x")
            .with_header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
            .with_header("X-Real-IP", "198.51.100.2")
            .with_peer_addr("127.0.0.1");
        assert_eq!(ctx.client_ip(), "203.0.113.7");
        assert_eq!(ctx.method, "GET");

        let ctx = RequestContext::new("GET", "/x")
            .with_header("x-real-ip", "198.51.100.2")
            .with_peer_addr("127.0.0.1");
        assert_eq!(ctx.client_ip(), "198.51.100.2");

        let ctx = RequestContext::new("GET", "/x").with_peer_addr("127.0.0.1");
        assert_eq!(ctx.subject(), Subject::Ip("127.0.0.1".into()));

        assert_eq!(RequestContext::new("GET", "/x").client_ip(), "unknown");
    }

    #[test]
    fn test_user_subject_wins() {
        let ctx = RequestContext::new("POST", "/x")
            .with_header("X-Forwarded-For", "203.0.113.7")
            .with_user("42", CallerTier::Premium);
        assert_eq!(ctx.subject().to_string(), "user:42");
    }

    #[test]
    fn test_denial_headers_and_body() {
        let decision = RateLimitDecision {
            allowed: false,
            key: "rate_limit:ip:1.2.3.4:global:GET".into(),
            limit: 5,
            remaining: 0,
            current_count: 5,
            reset_time: Utc::now() + chrono::Duration::seconds(30),
            window: Duration::from_secs(60),
            burst_used: false,
            degraded: false,
        };

        let headers: HashMap<_, _> = decision.headers().into_iter().collect();
        assert_eq!(headers["X-Rate-Limit-Limit"], "5");
        assert_eq!(headers["X-Rate-Limit-Remaining"], "0");
        assert_eq!(headers["X-Rate-Limit-Window"], "60");
        assert!(!headers.contains_key("X-Rate-Limit-Burst-Used"));
        let retry: u64 = headers["Retry-After"].parse().unwrap();
        assert!((29..=30).contains(&retry));

        let body = decision.denial_body();
        assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(body["error"]["details"]["limit"], 5);
        assert_eq!(body["error"]["details"]["window_seconds"], 60);
        assert_eq!(body["error"]["details"]["current_usage"], 5);

        let err = decision.to_error();
        assert!(matches!(err, TrellisError::RateLimitExceeded { retry_after: Some(_), .. }));
    }

    #[test]
    fn test_retry_after_never_below_one() {
        let decision = RateLimitDecision {
            allowed: false,
            key: "k".into(),
            limit: 1,
            remaining: 0,
            current_count: 1,
            reset_time: Utc::now() - chrono::Duration::seconds(5),
            window: Duration::from_secs(1),
            burst_used: true,
            degraded: false,
        };
        assert_eq!(decision.retry_after_secs(), 1);
        assert!(
            decision
                .headers()
                .iter()
                .any(|(name, value)| *name == "X-Rate-Limit-Burst-Used" && value == "true")
        );
    }
}
