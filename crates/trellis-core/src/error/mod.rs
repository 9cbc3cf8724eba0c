//! Error types for Trellis
//!
//! Every fallible operation in the crate returns [`TrellisResult`]. Errors
//! implement [`UnifiedError`] for codes and HTTP statuses, and
//! [`ClassifyFailure`] so circuit breakers can tell upstream failures apart
//! from local ones.

mod classification;
mod constructors;
mod conversions;
mod types;
mod unified_error;

pub use classification::{ClassifyFailure, FailureType};
pub use types::{TrellisError, TrellisResult, UnifiedError};
