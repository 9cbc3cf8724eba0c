//! Credential placement per upstream provider

use reqwest::RequestBuilder;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Where an API key goes on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// `?appid=<key>`
    QueryParam(&'static str),
    /// `<header>: <key>`
    Header(&'static str),
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `x-api-key: <key>` plus a pinned `anthropic-version`
    Anthropic,
}

impl AuthScheme {
    /// Pick the scheme from the provider name
    pub fn for_api(api_name: &str) -> Self {
        let name = api_name.to_ascii_lowercase();
        if name.contains("openweather") {
            Self::QueryParam("appid")
        } else if name.contains("plantnet") {
            Self::Header("Api-Key")
        } else if name.contains("openai") {
            Self::Bearer
        } else if name.contains("anthropic") || name.contains("claude") {
            Self::Anthropic
        } else {
            Self::Bearer
        }
    }

    pub fn apply(&self, builder: RequestBuilder, key: &str) -> RequestBuilder {
        match self {
            Self::QueryParam(param) => builder.query(&[(*param, key)]),
            Self::Header(name) => builder.header(*name, key),
            Self::Bearer => builder.bearer_auth(key),
            Self::Anthropic => builder
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION),
        }
    }
}
