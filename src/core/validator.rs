//! Response extraction and line-count validation with bounded retry

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::core::config::TranslatorConfig;
use crate::core::errors::{Result, TranslationError};

/// The answer inside a generated continuation.
///
/// `generated` holds only new tokens: the prompt already ends with `marker`,
/// so the answer runs up to the first marker the model echoes, if any.
pub fn extract_response<'a>(generated: &'a str, marker: &str) -> &'a str {
    generated.split(marker).next().unwrap_or(generated).trim()
}

/// Number of newline-delimited lines
pub fn count_lines(text: &str) -> usize {
    text.split('\n').count()
}

/// Outcome of checking a generated response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Accepted,
    Mismatch { expected: usize, actual: usize },
}

/// Accepts responses whose line count equals the input's
#[derive(Debug, Clone, Copy)]
pub struct LineCountValidator {
    expected: usize,
}

impl LineCountValidator {
    pub fn new(expected: usize) -> Self {
        Self { expected }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn check(&self, response: &str) -> Validation {
        let actual = count_lines(response);
        if actual == self.expected {
            Validation::Accepted
        } else {
            Validation::Mismatch {
                expected: self.expected,
                actual,
            }
        }
    }
}

/// Attempt limit and exponential backoff between attempts
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &TranslatorConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.retry_delay_ms))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the given 1-based attempt
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2_u32.saturating_pow(attempt - 2);
        self.base_delay.saturating_mul(factor)
    }
}

/// Result of a validated run
#[derive(Debug, Clone, PartialEq)]
pub struct Validated<T> {
    pub value: T,
    pub attempts: u32,
}

/// Run `attempt_fn` until its output passes `validator`, at most
/// `policy.max_attempts()` times. Without a validator the first output is
/// accepted. Errors from `attempt_fn` end the run immediately.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    validator: Option<&LineCountValidator>,
    mut attempt_fn: F,
) -> Result<Validated<T>>
where
    T: AsRef<str>,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_actual = 0;

    for attempt in 1..=policy.max_attempts() {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            debug!("Waiting {:?} before attempt {}", delay, attempt);
            sleep(delay).await;
        }

        let value = attempt_fn(attempt).await?;

        let Some(validator) = validator else {
            return Ok(Validated { value, attempts: attempt });
        };

        match validator.check(value.as_ref()) {
            Validation::Accepted => {
                if attempt > 1 {
                    info!("Line count matched after {} attempts", attempt);
                }
                return Ok(Validated { value, attempts: attempt });
            }
            Validation::Mismatch { expected, actual } => {
                warn!(
                    "Number of lines doesn't match (attempt {}/{}): expected {}, got {}",
                    attempt,
                    policy.max_attempts(),
                    expected,
                    actual
                );
                last_actual = actual;
            }
        }
    }

    Err(TranslationError::LineCountMismatch {
        expected: validator.map(LineCountValidator::expected).unwrap_or_default(),
        actual: last_actual,
        attempts: policy.max_attempts(),
    })
}
