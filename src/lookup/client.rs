//! Timeout, retry and backoff around single outbound calls.

use super::rate_limit::RateLimiter;
use super::Lookup;
use crate::core::models::{FailureKind, LookupResult, WorkUnit};

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Raw status and body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: String,
}

impl RemoteResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Failure below the HTTP layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request could not be sent: {0}")]
    Request(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Timeout | TransportError::Connect(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    NotFound,
    Transient,
    Permanent,
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        404 => StatusClass::NotFound,
        408 | 429 | 500..=599 => StatusClass::Transient,
        _ => StatusClass::Permanent,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Exponential backoff as an explicit state machine: attempts made so far
/// and the delay to wait before the next one.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts_made: u32,
    next_delay: Duration,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts_made: 0,
            next_delay: policy.base_delay,
        }
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    /// Registers a failed attempt. Returns the wait before the next attempt,
    /// or `None` once the attempt budget is spent.
    pub fn on_failure(&mut self) -> Option<Duration> {
        self.attempts_made += 1;
        if self.attempts_made >= self.policy.max_attempts {
            return None;
        }
        let delay = self.next_delay.min(self.policy.max_delay);
        self.next_delay = self
            .next_delay
            .saturating_mul(2)
            .min(self.policy.max_delay);
        Some(delay)
    }
}

/// Sleep abstraction so retry timing can be observed without real delays.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Result of a call after retries, before the body is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// A 2xx response.
    Completed(RemoteResponse),
    NotFound(String),
    Failed { kind: FailureKind, detail: String },
}

impl CallOutcome {
    /// Maps a completed response through `interpret`; other outcomes map directly.
    pub fn into_lookup_result(self, interpret: impl FnOnce(RemoteResponse) -> LookupResult) -> LookupResult {
        match self {
            CallOutcome::Completed(response) => interpret(response),
            CallOutcome::NotFound(detail) => LookupResult::not_found_with(detail),
            CallOutcome::Failed { kind, detail } => LookupResult::Failed { kind, detail },
        }
    }
}

fn snippet(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// Runs one logical call with rate limiting, a per-attempt timeout and
/// exponential backoff on transient failures.
#[derive(Clone)]
pub struct Caller {
    policy: RetryPolicy,
    timeout: Duration,
    limiter: Arc<RateLimiter>,
    sleeper: Arc<dyn Sleeper>,
}

impl Caller {
    pub fn new(policy: RetryPolicy, timeout: Duration, limiter: Arc<RateLimiter>) -> Self {
        Self {
            policy,
            timeout,
            limiter,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Executes `op` until it yields a conclusive answer or attempts run out.
    pub async fn execute<F, Fut>(&self, label: &str, op: F) -> CallOutcome
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<RemoteResponse, TransportError>>,
    {
        let mut backoff = Backoff::new(self.policy);
        loop {
            self.limiter.acquire().await;
            let attempt = backoff.attempts_made() + 1;

            let transient_detail = match tokio::time::timeout(self.timeout, op()).await {
                Err(_) => format!("timed out after {:?}", self.timeout),
                Ok(Err(e)) if e.is_transient() => e.to_string(),
                Ok(Err(e)) => {
                    tracing::warn!(target: "lookup", "[{}] Attempt {} failed permanently: {}", label, attempt, e);
                    return CallOutcome::Failed {
                        kind: FailureKind::Permanent,
                        detail: e.to_string(),
                    };
                }
                Ok(Ok(response)) => match classify_status(response.status) {
                    StatusClass::Success => {
                        tracing::trace!(target: "lookup", "[{}] Attempt {} succeeded (HTTP {})", label, attempt, response.status);
                        return CallOutcome::Completed(response);
                    }
                    StatusClass::NotFound => {
                        return CallOutcome::NotFound(format!("HTTP 404 from {}", label));
                    }
                    StatusClass::Permanent => {
                        tracing::warn!(target: "lookup", "[{}] HTTP {} is not retryable", label, response.status);
                        return CallOutcome::Failed {
                            kind: FailureKind::Permanent,
                            detail: format!("HTTP {}: {}", response.status, snippet(&response.body)),
                        };
                    }
                    StatusClass::Transient => format!("HTTP {}", response.status),
                },
            };

            match backoff.on_failure() {
                Some(delay) => {
                    tracing::debug!(target: "lookup",
                        "[{}] Attempt {}/{} transient failure ({}). Retrying in {:?}",
                        label, attempt, self.policy.max_attempts, transient_detail, delay);
                    self.sleeper.sleep(delay).await;
                }
                None => {
                    tracing::warn!(target: "lookup",
                        "[{}] Giving up after {} attempts: {}", label, attempt, transient_detail);
                    return CallOutcome::Failed {
                        kind: FailureKind::Transient,
                        detail: format!("{} (after {} attempts)", transient_detail, attempt),
                    };
                }
            }
        }
    }
}

/// One remote service exposed as a lookup: how to call it for a unit and
/// how to read its 2xx body.
#[async_trait]
pub trait LookupService: Send + Sync {
    fn name(&self) -> &str;

    async fn call(&self, unit: &WorkUnit) -> std::result::Result<RemoteResponse, TransportError>;

    /// Reads a 2xx body. Malformed bodies become permanent failures.
    fn interpret(&self, unit: &WorkUnit, body: &str) -> LookupResult;
}

/// A [`LookupService`] wrapped in the timeout/retry contract.
pub struct LookupClient<S> {
    service: S,
    caller: Caller,
}

impl<S: LookupService> LookupClient<S> {
    pub fn new(service: S, caller: Caller) -> Self {
        Self { service, caller }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub async fn invoke(&self, unit: &WorkUnit) -> LookupResult {
        let label = format!("{} {}", self.service.name(), unit.label());
        let service = &self.service;
        self.caller
            .execute(&label, move || service.call(unit))
            .await
            .into_lookup_result(|response| service.interpret(unit, &response.body))
    }
}

#[async_trait]
impl<S: LookupService> Lookup for LookupClient<S> {
    async fn lookup(&self, unit: &WorkUnit) -> LookupResult {
        self.invoke(unit).await
    }
}
