//! Completion notifications to the orchestrator.
//!
//! `POST <completion endpoint>` with `{"taskId": n}`. Any 2xx is success;
//! every other status and every transport error is a failure. Retries are
//! governed by [`RetryPolicy`], which defaults to a single attempt.

use crate::completion::CompletionEvent;
use crate::errors::{DaemonError, DaemonResult};
use async_trait::async_trait;
use conductor_core::{OrchestratorConfig, RetryConfig};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Delivers completion events to the system of record.
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn notify(&self, event: &CompletionEvent) -> DaemonResult<()>;
}

/// HTTP notifier backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpCompletionNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCompletionNotifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> DaemonResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &OrchestratorConfig) -> DaemonResult<Self> {
        Self::new(
            config.completion_url(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionNotifier for HttpCompletionNotifier {
    async fn notify(&self, event: &CompletionEvent) -> DaemonResult<()> {
        debug!(task_id = event.task_id, endpoint = %self.endpoint, "Posting completion");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "taskId": event.task_id }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DaemonError::NotificationRejected {
                task_id: event.task_id,
                status: status.as_u16(),
            })
        }
    }
}

/// How many times to attempt a notification and how long to wait between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay before attempt `attempt + 1`, doubling from the initial backoff.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Deliver one event under the given policy, returning the last error.
pub async fn deliver(
    notifier: &dyn CompletionNotifier,
    event: &CompletionEvent,
    policy: &RetryPolicy,
) -> DaemonResult<()> {
    let mut attempt = 1;
    loop {
        match notifier.notify(event).await {
            Ok(()) => {
                info!(
                    project_id = event.project_id,
                    task_id = event.task_id,
                    attempt,
                    "Completion notification delivered"
                );
                return Ok(());
            }
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.backoff_for(attempt);
                warn!(
                    project_id = event.project_id,
                    task_id = event.task_id,
                    attempt,
                    error = %e,
                    "Completion notification failed; retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Flaky {
        failures_left: Mutex<u32>,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl CompletionNotifier for Flaky {
        async fn notify(&self, event: &CompletionEvent) -> DaemonResult<()> {
            *self.calls.lock() += 1;
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                return Err(DaemonError::NotificationRejected {
                    task_id: event.task_id,
                    status: 503,
                });
            }
            Ok(())
        }
    }

    fn flaky(failures: u32) -> Flaky {
        Flaky {
            failures_left: Mutex::new(failures),
            calls: Mutex::new(0),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(350));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(350));
    }

    #[test]
    fn test_default_policy_is_single_attempt() {
        assert_eq!(RetryPolicy::default().max_attempts, 1);
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let notifier = flaky(1);
        let event = CompletionEvent::new(3, 1);
        let result = deliver(&notifier, &event, &RetryPolicy::none()).await;
        assert!(result.is_err());
        assert_eq!(*notifier.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let notifier = flaky(2);
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        };
        let event = CompletionEvent::new(3, 1);
        deliver(&notifier, &event, &policy).await.unwrap();
        assert_eq!(*notifier.calls.lock(), 3);
    }

    #[tokio::test]
    async fn test_http_notifier_connection_refused_is_error() {
        // Port 9 (discard) is closed on test machines.
        let notifier =
            HttpCompletionNotifier::new("http://127.0.0.1:9/complete", Duration::from_secs(2))
                .unwrap();
        let result = notifier.notify(&CompletionEvent::new(1, 1)).await;
        assert!(matches!(result, Err(DaemonError::HttpError(_))));
    }
}
