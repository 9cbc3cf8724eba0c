//! Trellis
//!
//! Facade crate re-exporting [`trellis_core`]. Application code depends on
//! this crate; the workspace integration tests in `tests/` exercise the full
//! limiter, rotation, breaker and client chain through it.

pub use trellis_core::*;
