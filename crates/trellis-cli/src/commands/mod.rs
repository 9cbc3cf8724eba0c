//! CLI commands

pub mod call;
pub mod probe;
pub mod rate_limit;
pub mod validate;
