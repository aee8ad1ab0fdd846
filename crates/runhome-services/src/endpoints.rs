//! Ordered endpoint lists with an explicit fallback policy.

use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use reqwest::StatusCode;
use runhome_core::{JourneyError, SourceError};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EndpointPolicy {
    /// Always start from the first endpoint.
    TryInOrder,
    /// Start from whichever endpoint answered last, wrapping around.
    #[default]
    StickToLastSuccessful,
}

impl FromStr for EndpointPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in_order" | "try_in_order" | "ordered" => Ok(EndpointPolicy::TryInOrder),
            "sticky" | "stick_to_last_successful" => Ok(EndpointPolicy::StickToLastSuccessful),
            other => Err(format!("unknown endpoint policy '{other}'")),
        }
    }
}

/// Why one endpoint attempt failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Worth trying the next endpoint (timeouts, connection errors, 5xx).
    #[error("{0}")]
    Retryable(String),
    /// The request itself is wrong; other endpoints will say the same.
    #[error("{0}")]
    Fatal(String),
}

impl AttemptError {
    pub fn from_status(status: StatusCode, what: &str) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            AttemptError::RateLimited(format!("{what} HTTP {status}"))
        } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            AttemptError::Retryable(format!("{what} HTTP {status}"))
        } else {
            AttemptError::Fatal(format!("{what} HTTP {status}"))
        }
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            AttemptError::Retryable(format!("request timed out: {err}"))
        } else if err.is_decode() {
            AttemptError::Retryable(format!("invalid response: {err}"))
        } else {
            AttemptError::Retryable(err.to_string())
        }
    }
}

/// Every endpoint failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FallbackError {
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    Unavailable(String),
}

impl From<FallbackError> for SourceError {
    fn from(err: FallbackError) -> Self {
        match err {
            FallbackError::RateLimited(msg) => SourceError::RateLimited(msg),
            FallbackError::Unavailable(msg) => SourceError::Unavailable(msg),
        }
    }
}

impl From<FallbackError> for JourneyError {
    fn from(err: FallbackError) -> Self {
        match err {
            FallbackError::RateLimited(_) => JourneyError::RateLimited,
            FallbackError::Unavailable(msg) => JourneyError::Unavailable(msg),
        }
    }
}

#[derive(Debug)]
pub struct EndpointSet {
    endpoints: Vec<String>,
    policy: EndpointPolicy,
    preferred: AtomicUsize,
}

impl EndpointSet {
    pub fn new(endpoints: Vec<String>, policy: EndpointPolicy) -> Self {
        Self {
            endpoints: endpoints
                .into_iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
            policy,
            preferred: AtomicUsize::new(0),
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub fn policy(&self) -> EndpointPolicy {
        self.policy
    }

    /// Indices in the order the next call should try them.
    pub fn attempt_order(&self) -> Vec<usize> {
        let len = self.endpoints.len();
        let start = match self.policy {
            EndpointPolicy::TryInOrder => 0,
            EndpointPolicy::StickToLastSuccessful => self.preferred.load(Ordering::Relaxed),
        };
        (0..len).map(|offset| (start + offset) % len.max(1)).collect()
    }

    pub fn record_success(&self, index: usize) {
        if index < self.endpoints.len() {
            self.preferred.store(index, Ordering::Relaxed);
        }
    }

    pub fn preferred(&self) -> usize {
        self.preferred.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.preferred.store(0, Ordering::Relaxed);
    }

    /// Run `call` against each endpoint in policy order until one succeeds.
    ///
    /// Throttled and retryable failures move on to the next endpoint; a fatal failure stops
    /// immediately. The combined error is `RateLimited` when any endpoint throttled.
    pub async fn try_each<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T, FallbackError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        if self.endpoints.is_empty() {
            return Err(FallbackError::Unavailable(format!("no {what} endpoints configured")));
        }

        let mut throttled = false;
        let mut last_err = String::new();
        for index in self.attempt_order() {
            let endpoint = self.endpoints[index].clone();
            match call(endpoint.clone()).await {
                Ok(value) => {
                    if index != self.preferred() {
                        tracing::info!("Switched {} endpoint to {}", what, endpoint);
                    }
                    self.record_success(index);
                    return Ok(value);
                }
                Err(AttemptError::RateLimited(msg)) => {
                    tracing::warn!("{} endpoint {} rate-limited: {}", what, endpoint, msg);
                    throttled = true;
                    last_err = msg;
                }
                Err(AttemptError::Retryable(msg)) => {
                    tracing::warn!("{} endpoint {} failed: {}", what, endpoint, msg);
                    last_err = msg;
                }
                Err(AttemptError::Fatal(msg)) => {
                    tracing::warn!("{} endpoint {} rejected request: {}", what, endpoint, msg);
                    return Err(FallbackError::Unavailable(msg));
                }
            }
        }

        if throttled {
            Err(FallbackError::RateLimited(format!(
                "{what} is currently rate-limiting requests; try again shortly"
            )))
        } else {
            Err(FallbackError::Unavailable(format!(
                "all {what} endpoints failed: {last_err}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn set(policy: EndpointPolicy) -> EndpointSet {
        EndpointSet::new(
            vec!["https://a".to_string(), "https://b".to_string(), "https://c".to_string()],
            policy,
        )
    }

    #[test]
    fn sticky_order_starts_at_last_success() {
        let endpoints = set(EndpointPolicy::StickToLastSuccessful);
        assert_eq!(endpoints.attempt_order(), vec![0, 1, 2]);
        endpoints.record_success(1);
        assert_eq!(endpoints.attempt_order(), vec![1, 2, 0]);
        endpoints.reset();
        assert_eq!(endpoints.attempt_order(), vec![0, 1, 2]);
    }

    #[test]
    fn in_order_ignores_history() {
        let endpoints = set(EndpointPolicy::TryInOrder);
        endpoints.record_success(2);
        assert_eq!(endpoints.attempt_order(), vec![0, 1, 2]);
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("sticky".parse(), Ok(EndpointPolicy::StickToLastSuccessful));
        assert_eq!("in_order".parse(), Ok(EndpointPolicy::TryInOrder));
        assert!("random".parse::<EndpointPolicy>().is_err());
    }

    #[tokio::test]
    async fn falls_back_past_gateway_timeout() {
        let endpoints = set(EndpointPolicy::StickToLastSuccessful);
        let seen = Mutex::new(Vec::new());
        let result = endpoints
            .try_each("Overpass", |url| {
                seen.lock().unwrap().push(url.clone());
                async move {
                    if url == "https://a" {
                        Err(AttemptError::from_status(StatusCode::GATEWAY_TIMEOUT, "Overpass"))
                    } else {
                        Ok(url)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok("https://b".to_string()));
        assert_eq!(*seen.lock().unwrap(), vec!["https://a", "https://b"]);
        assert_eq!(endpoints.preferred(), 1);
    }

    #[tokio::test]
    async fn throttling_anywhere_reports_rate_limited() {
        let endpoints = set(EndpointPolicy::TryInOrder);
        let result: Result<(), _> = endpoints
            .try_each("Overpass", |url| async move {
                if url == "https://a" {
                    Err(AttemptError::from_status(StatusCode::TOO_MANY_REQUESTS, "Overpass"))
                } else {
                    Err(AttemptError::Retryable("connection refused".to_string()))
                }
            })
            .await;
        assert!(matches!(result, Err(FallbackError::RateLimited(_))));
    }

    #[tokio::test]
    async fn fatal_error_stops_immediately() {
        let endpoints = set(EndpointPolicy::TryInOrder);
        let calls = Mutex::new(0);
        let result: Result<(), _> = endpoints
            .try_each("transit", |_url| {
                *calls.lock().unwrap() += 1;
                async { Err(AttemptError::from_status(StatusCode::BAD_REQUEST, "transit")) }
            })
            .await;
        assert!(matches!(result, Err(FallbackError::Unavailable(_))));
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
