use std::time::Duration;

use log::{error, warn};
use rand::Rng;

const DEFAULT_SLEEP_INITIAL_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_SLEEP_BACKOFF_FACTOR: f64 = 1.2;
const DEFAULT_JITTER: Duration = Duration::from_millis(800);

#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug)]
pub struct RetryConfig {
    sleep_duration: Duration,
    backoff_factor: f64,
    jitter: Duration,
}

impl RetryConfig {
    pub fn new(sleep_duration: Duration, backoff_factor: f64, jitter: Duration) -> Self {
        Self {
            sleep_duration,
            backoff_factor,
            jitter,
        }
    }

    /// Default backoff starting from `sleep_duration`, with jitter no larger
    /// than the initial sleep.
    pub fn with_initial_sleep(sleep_duration: Duration) -> Self {
        Self::new(
            sleep_duration,
            DEFAULT_SLEEP_BACKOFF_FACTOR,
            DEFAULT_JITTER.min(sleep_duration),
        )
    }

    pub fn sleep_after_error(&mut self) {
        if !self.sleep_duration.is_zero() {
            std::thread::sleep(self.sleep_duration);
        }
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            rand::rng().random_range(Duration::ZERO..self.jitter)
        };
        self.sleep_duration = self.sleep_duration.mul_f64(self.backoff_factor) + jitter;
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_SLEEP_INITIAL_DURATION,
            DEFAULT_SLEEP_BACKOFF_FACTOR,
            DEFAULT_JITTER,
        )
    }
}

/// Calls `func` until it succeeds, at most `max_retries + 1` times. Returns the
/// last result together with the number of attempts made.
pub fn execute_with_retries<T, E: std::fmt::Display>(
    mut func: impl FnMut() -> Result<T, E>,
    mut retry_config: RetryConfig,
    max_retries: usize,
    what: &str,
) -> (Result<T, E>, usize) {
    let mut exec_result = func();
    let mut attempts = 1;
    for attempt_idx in 0..max_retries {
        match &exec_result {
            Ok(_) => return (exec_result, attempts),
            Err(err) => {
                warn!("Attempt {attempt_idx}: retrying {what} after an error: {err}");
            }
        }
        retry_config.sleep_after_error();
        exec_result = func();
        attempts += 1;
    }
    if let Err(err) = &exec_result {
        error!("Giving up on {what} after {attempts} attempts: {err}");
    }
    (exec_result, attempts)
}
