use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use url::Url;

use crate::error::HookError;
use crate::signing::{sign_body, SignatureHeaders};
use crate::transport::Transport;
use crate::types::Destination;

/// Query parameter overriding the per-attempt timeout, in seconds.
pub const TIMEOUT_PARAM: &str = "timeout";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-attempt timeout unless the destination sets `timeout`.
    pub timeout: Duration,

    /// Attempts per delivery, including the first one.
    pub max_attempts: u32,

    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub retry_jitter_ms: u64,

    /// Optional secret for HMAC signing of the body.
    pub secret: Option<Vec<u8>>,

    /// Whether to bind a timestamp into signatures.
    pub include_timestamp: bool,

    pub signature_header: String,
    pub timestamp_header: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            retry_base_ms: 100,
            retry_max_ms: 5_000,
            retry_jitter_ms: 50,
            secret: None,
            include_timestamp: true,
            signature_header: "X-Hook-Signature".to_string(),
            timestamp_header: "X-Hook-Timestamp".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_retry_policy(mut self, base_ms: u64, max_ms: u64, jitter_ms: u64) -> Self {
        self.retry_base_ms = base_ms;
        self.retry_max_ms = max_ms;
        self.retry_jitter_ms = jitter_ms;
        self
    }

    pub fn with_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_timestamped_signatures(mut self, include: bool) -> Self {
        self.include_timestamp = include;
        self
    }
}

/// POSTs payloads as JSON to `http`/`https` destinations.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpConfig,
}

enum AttemptError {
    Retryable(String),
    Permanent(String),
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn attempt(
        &self,
        url: &Url,
        body: &[u8],
        headers: &SignatureHeaders,
        timeout: Duration,
    ) -> Result<(), AttemptError> {
        let mut request = self
            .client
            .post(url.clone())
            .timeout(timeout)
            .header("Content-Type", "application/json")
            .body(body.to_vec());

        if let Some((name, value)) = &headers.signature {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some((name, value)) = &headers.timestamp {
            request = request.header(name.as_str(), value.as_str());
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) if resp.status().is_client_error() => {
                Err(AttemptError::Permanent(format!("{url} answered {}", resp.status())))
            }
            Ok(resp) => Err(AttemptError::Retryable(format!("{url} answered {}", resp.status()))),
            Err(err) if err.is_timeout() => {
                Err(AttemptError::Retryable(format!("request to {url} timed out after {timeout:?}")))
            }
            Err(err) => Err(AttemptError::Retryable(format!("request to {url} failed: {err}"))),
        }
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.config.retry_base_ms.max(1);
        let max = self.config.retry_max_ms.max(base);
        let pow = 2u64.saturating_pow(attempt.saturating_sub(1));
        let exp = base.saturating_mul(pow).min(max);
        let jitter = if self.config.retry_jitter_ms == 0 {
            0
        } else {
            fastrand::u64(0..=self.config.retry_jitter_ms)
        };
        Duration::from_millis(exp + jitter)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(HttpConfig::default())
    }
}

/// Per-attempt timeout for `destination`.
fn request_timeout(destination: &Destination, default: Duration) -> Result<Duration, HookError> {
    match destination.query_param(TIMEOUT_PARAM) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|err| HookError::send(format!("invalid timeout {raw:?}: {err}"))),
    }
}

/// Destination URL without the parameters consumed by this transport.
fn outgoing_url(destination: &Destination) -> Url {
    let mut url = destination.url().clone();
    if destination.query_param(TIMEOUT_PARAM).is_none() {
        return url;
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != TIMEOUT_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url
}

#[async_trait]
impl Transport for HttpTransport {
    fn validate(&self, destination: &Destination) -> Result<(), HookError> {
        if destination.host().is_none() {
            return Err(HookError::validation("missing host"));
        }
        Ok(())
    }

    async fn init(&self, _cancel: &CancellationToken, _destination: &Destination) -> Result<(), HookError> {
        Ok(())
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        payload: &Value,
        destination: &Destination,
    ) -> Result<(), HookError> {
        let timeout = request_timeout(destination, self.config.timeout)?;
        let url = outgoing_url(destination);
        let body = serde_json::to_vec(payload).map_err(|err| HookError::PayloadNotSerializable {
            message: err.to_string(),
        })?;
        let headers = sign_body(
            self.config.secret.as_deref(),
            &body,
            self.config.include_timestamp,
            &self.config.signature_header,
            &self.config.timestamp_header,
        );

        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(HookError::send(format!("delivery to {url} cancelled"))),
                result = self.attempt(&url, &body, &headers, timeout) => result,
            };

            match result {
                Ok(()) => return Ok(()),
                Err(AttemptError::Permanent(message)) => return Err(HookError::send(message)),
                Err(AttemptError::Retryable(message)) => {
                    warn!(attempt, max_attempts, error = %message, "delivery attempt failed");
                    last_error = message;
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(HookError::send(format!("delivery to {url} cancelled"))),
                    _ = tokio::time::sleep(self.retry_delay(attempt)) => {}
                }
            }
        }

        Err(HookError::send(format!(
            "all attempts failed ({max_attempts}): {last_error}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_param_overrides_default() {
        let dest = Destination::parse("http://localhost:1234?timeout=120").unwrap();
        assert_eq!(request_timeout(&dest, Duration::from_secs(5)).unwrap(), Duration::from_secs(120));

        let dest = Destination::parse("http://localhost:1234").unwrap();
        assert_eq!(request_timeout(&dest, Duration::from_secs(5)).unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn bad_timeout_is_a_send_error() {
        let dest = Destination::parse("http://localhost:1234?timeout=s0").unwrap();
        let err = request_timeout(&dest, Duration::from_secs(5)).unwrap_err();
        assert!(err.to_string().contains("invalid timeout"));
    }

    #[test]
    fn timeout_param_is_stripped_from_request_url() {
        let dest = Destination::parse("http://localhost:1234/hook?timeout=3&id=7").unwrap();
        assert_eq!(outgoing_url(&dest).as_str(), "http://localhost:1234/hook?id=7");

        let dest = Destination::parse("http://localhost:1234/hook?timeout=3").unwrap();
        assert_eq!(outgoing_url(&dest).as_str(), "http://localhost:1234/hook");

        let dest = Destination::parse("http://localhost:1234/hook?id={a}").unwrap();
        assert_eq!(outgoing_url(&dest).as_str(), dest.as_str());
    }

    #[test]
    fn retry_delay_grows_and_caps() {
        let transport = HttpTransport::new(HttpConfig::default().with_retry_policy(100, 250, 0));
        assert_eq!(transport.retry_delay(1), Duration::from_millis(100));
        assert_eq!(transport.retry_delay(2), Duration::from_millis(200));
        assert_eq!(transport.retry_delay(3), Duration::from_millis(250));
    }

    #[test]
    fn validate_accepts_plain_http() {
        let transport = HttpTransport::default();
        let dest = Destination::parse("http://localhost:1234").unwrap();
        assert!(transport.validate(&dest).is_ok());
    }
}
