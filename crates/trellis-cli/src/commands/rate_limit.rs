//! `trellis rate-limit`
//!
//! Replays `--calls` requests from one caller against a fresh in-memory
//! limiter and prints every decision.

use anyhow::Context;
use trellis_core::{
    CallerTier, RateLimitDecision, RateLimitPolicy, RateLimitPolicyConfig, RateSpec,
    RequestContext, TrellisConfig,
};

use crate::args::RateLimitArgs;

pub async fn execute(args: &RateLimitArgs, config: &TrellisConfig) -> anyhow::Result<()> {
    let policy_config = policy_config(args, config)?;
    let policy = RateLimitPolicy::in_memory(policy_config).context("building rate limit policy")?;
    let ctx = request_context(args);

    let (key, spec) = policy.resolve(&ctx);
    println!("key={} limit={}", key, spec);

    let mut shown_denial = false;
    for call in 1..=args.calls {
        let decision = policy.check(&ctx).await;
        println!("{}", describe(call, &decision));

        if !decision.allowed && !shown_denial {
            shown_denial = true;
            println!("{}", serde_json::to_string_pretty(&decision.denial_body())?);
        }
    }

    let usage = policy.usage(&ctx).await.context("reading window usage")?;
    println!(
        "window usage: {} requests, resets at {}",
        usage.current_count,
        usage.reset_time.to_rfc3339()
    );
    Ok(())
}

/// `--rate` replaces the default for the selected tier; `--burst` replaces the burst allowance
fn policy_config(args: &RateLimitArgs, config: &TrellisConfig) -> anyhow::Result<RateLimitPolicyConfig> {
    let rate: RateSpec = args
        .rate
        .parse()
        .with_context(|| format!("invalid --rate '{}'", args.rate))?;

    let mut policy = config.rate_limit.clone();
    policy.enabled = true;
    policy.burst_limit = args.burst;
    match tier(args) {
        CallerTier::Anonymous | CallerTier::User => policy.global = rate,
        CallerTier::Premium => policy.premium = rate,
        CallerTier::Admin => policy.admin = rate,
    }
    Ok(policy)
}

fn tier(args: &RateLimitArgs) -> CallerTier {
    if args.user.is_some() {
        args.tier.into()
    } else {
        CallerTier::Anonymous
    }
}

fn request_context(args: &RateLimitArgs) -> RequestContext {
    let ctx = RequestContext::new(args.method.clone(), args.path.clone());
    match (&args.user, &args.ip) {
        (Some(user), _) => ctx.with_user(user.clone(), tier(args)),
        (None, Some(ip)) => ctx.with_peer_addr(ip.clone()),
        (None, None) => ctx.with_peer_addr("127.0.0.1"),
    }
}

fn describe(call: u32, decision: &RateLimitDecision) -> String {
    let mut line = format!(
        "#{:<3} {} remaining={} count={}",
        call,
        if decision.allowed { "allowed" } else { "denied " },
        decision.remaining,
        decision.current_count
    );
    if decision.burst_used {
        line.push_str(" burst");
    }
    if decision.degraded {
        line.push_str(" degraded");
    }
    if !decision.allowed {
        line.push_str(&format!(" retry_after={}s", decision.retry_after_secs()));
    }
    line
}
