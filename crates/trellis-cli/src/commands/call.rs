//! `trellis call`
//!
//! Sends one request through a rotation group. The response is printed
//! together with the rotation counters and the circuit snapshots, also when
//! every endpoint failed.

use anyhow::{Context, bail};
use serde_json::{Value, json};
use trellis_core::rotation::RotationManager;
use trellis_core::{ApiRequest, TrellisConfig};

use crate::args::CallArgs;

pub async fn execute(args: &CallArgs, config: &TrellisConfig) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;

    let group = config
        .rotation_group(&args.group)
        .with_context(|| format!("no rotation group named '{}'", args.group))?;
    let registry = config.registry();
    let manager = RotationManager::from_config(group, registry.clone())
        .with_context(|| format!("building rotation group '{}'", args.group))?;

    let request = build_request(args)?;
    let result = manager.call_with_rotation(&request, args.max_attempts).await;

    let report = json!({
        "result": result.as_ref().ok(),
        "error": result.as_ref().err().map(|e| e.to_string()),
        "stats": manager.stats(),
        "circuits": registry.all_metrics(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    result
        .map(|_| ())
        .with_context(|| format!("call through '{}' failed", args.group))
}

fn build_request(args: &CallArgs) -> anyhow::Result<ApiRequest> {
    let body: Option<Value> = args
        .body
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()
        .context("--body is not valid JSON")?;

    let mut request = match args.method.to_ascii_uppercase().as_str() {
        "GET" => ApiRequest::get(&args.path),
        "DELETE" => ApiRequest::delete(&args.path),
        "POST" => ApiRequest::post(&args.path, body.clone().unwrap_or(Value::Null)),
        "PUT" => ApiRequest::put(&args.path, body.clone().unwrap_or(Value::Null)),
        other => bail!("unsupported method '{}'", other),
    };
    if let Some(body) = body {
        request = request.body(body);
    }
    for (key, value) in &args.query {
        request = request.query(key, value);
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{Cli, Commands};
    use clap::Parser;

    fn parse(extra: &[&str]) -> CallArgs {
        let mut argv = vec!["trellis", "call", "--group", "weather", "--path", "/forecast"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Call(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_build_get_request_with_query() {
        let request = build_request(&parse(&["--query", "q=lyon", "--query", "units=metric"])).unwrap();
        assert_eq!(request.method.as_str(), "GET");
        assert_eq!(request.path, "/forecast");
        assert_eq!(request.query.len(), 2);
        assert!(request.body.is_none());
    }

    #[test]
    fn test_build_post_request_with_body() {
        let request = build_request(&parse(&["--method", "post", "--body", r#"{"city":"lyon"}"#])).unwrap();
        assert_eq!(request.method.as_str(), "POST");
        assert_eq!(request.body, Some(json!({"city": "lyon"})));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(build_request(&parse(&["--method", "PATCH"])).is_err());
        assert!(build_request(&parse(&["--method", "POST", "--body", "{oops"])).is_err());
    }

    #[tokio::test]
    async fn test_unknown_group_is_an_error() {
        let err = execute(&parse(&[]), &TrellisConfig::default()).await.unwrap_err();
        assert!(err.to_string().contains("no rotation group named 'weather'"));
    }
}
