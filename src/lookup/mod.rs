//! Outbound lookups: the retrying client, the shared rate limiter, the
//! waterfall combinator and the HTTP transport they run over.

pub mod client;
pub mod http;
pub mod rate_limit;
pub mod waterfall;

use crate::core::models::{LookupResult, WorkUnit};
use async_trait::async_trait;

pub use client::{
    classify_status, Backoff, CallOutcome, Caller, LookupClient, LookupService, RemoteResponse,
    RetryPolicy, Sleeper, StatusClass, TokioSleeper, TransportError,
};
pub use http::{HttpTransport, RequestSpec, Transport};
pub use rate_limit::RateLimiter;
pub use waterfall::{Waterfall, WaterfallStep, CONFIDENCE_FIELD};

/// Anything the scheduler can run for a work unit.
///
/// Implementations must be safe to call from many workers at once.
#[async_trait]
pub trait Lookup: Send + Sync {
    async fn lookup(&self, unit: &WorkUnit) -> LookupResult;
}
