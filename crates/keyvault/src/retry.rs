//! Retry with exponential backoff for vault requests

use crate::error::{KeyVaultError, Result};
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder, backoff::Backoff};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration with exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Initial backoff duration in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_max_attempts() -> usize {
    5
}

fn default_initial_backoff_ms() -> u64 {
    2000
}

fn default_max_backoff_ms() -> u64 {
    16000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

/// Retry a fallible async operation with exponential backoff
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = create_backoff(config);
    let mut attempts = 0;

    loop {
        attempts += 1;

        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        operation = operation_name,
                        attempts = attempts,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    debug!(
                        operation = operation_name,
                        error = %err,
                        "Error is not retryable, failing immediately"
                    );
                    return Err(err);
                }

                if attempts >= config.max_attempts {
                    warn!(
                        operation = operation_name,
                        attempts = attempts,
                        error = %err,
                        "Operation failed after maximum retries"
                    );
                    return Err(KeyVaultError::retry_exhausted(
                        operation_name,
                        attempts,
                        err.to_string(),
                    ));
                }

                if let Some(duration) = backoff.next_backoff() {
                    warn!(
                        operation = operation_name,
                        attempts = attempts,
                        error = %err,
                        retry_in_ms = duration.as_millis(),
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(duration).await;
                } else {
                    return Err(KeyVaultError::retry_exhausted(
                        operation_name,
                        attempts,
                        err.to_string(),
                    ));
                }
            }
        }
    }
}

/// Create exponential backoff from config
fn create_backoff(config: &RetryConfig) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(config.initial_backoff_ms))
        .with_max_interval(Duration::from_millis(config.max_backoff_ms))
        .with_multiplier(config.backoff_multiplier)
        .with_randomization_factor(0.0)
        .with_max_elapsed_time(None) // We use max_attempts instead
        .build()
}

/// Determine if an error is retryable
fn is_retryable(err: &KeyVaultError) -> bool {
    match err {
        // Transport failures, throttling and 5xx answers
        KeyVaultError::Transient { .. } => true,

        KeyVaultError::ConfigBinding(_)
        | KeyVaultError::InvalidArgument { .. }
        | KeyVaultError::CertificateStore { .. }
        | KeyVaultError::CertificateNotFound { .. }
        | KeyVaultError::AmbiguousCertificate { .. }
        | KeyVaultError::AuthenticationConfig { .. }
        | KeyVaultError::Authentication { .. }
        | KeyVaultError::SecretNotFound { .. }
        | KeyVaultError::SecretNameCollision { .. }
        | KeyVaultError::VaultUnavailable { .. }
        | KeyVaultError::VaultRequest { .. }
        | KeyVaultError::Timeout { .. } => false,
    }
}
