use std::time::Duration;

use tracing::debug;

use crate::auth::TokenProvider;
use crate::errors::Result;
use crate::response::{JobResult, JobStatus};
use crate::session::{ApiSession, RequestOptions};

/// Shortest pause allowed between polls.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Polls a job resource until it succeeds, fails, or the step budget runs out.
///
/// The budget is `max(1, floor(timeout / interval))` requests. When it is
/// used up the last result is marked [`JobStatus::Timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingWaiter {
    interval: Duration,
    max_steps: u32,
}

impl PollingWaiter {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        let interval = interval.max(MIN_INTERVAL);
        let steps = timeout.as_secs_f64() / interval.as_secs_f64();
        // Absorb float noise such as 0.3 / 0.1 = 2.9999999999999996.
        let max_steps = ((steps + 1e-9).floor() as u32).max(1);
        Self {
            interval,
            max_steps,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Poll `url` with an authenticated GET until the job reaches a terminal state.
    pub async fn wait(
        &self,
        session: &ApiSession,
        auth: &TokenProvider,
        url: &str,
    ) -> Result<JobResult> {
        let mut step = 1;
        loop {
            let token = auth.get_token().await?;
            let response = session
                .request("GET", url, RequestOptions::new().token(token))
                .await?;
            let mut result = JobResult::new(response);
            let status = result.status();
            debug!(%url, step, max_steps = self.max_steps, %status, "polled job");

            if matches!(status, JobStatus::Success | JobStatus::Failure) {
                return Ok(result);
            }
            if step >= self.max_steps {
                result.set_status(JobStatus::Timeout);
                return Ok(result);
            }

            step += 1;
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_budget_is_timeout_over_interval() {
        let waiter = PollingWaiter::new(Duration::from_secs(5), Duration::from_secs(600));
        assert_eq!(waiter.max_steps(), 120);

        let waiter = PollingWaiter::new(Duration::from_millis(100), Duration::from_millis(300));
        assert_eq!(waiter.max_steps(), 3);
    }

    #[test]
    fn at_least_one_step() {
        let waiter = PollingWaiter::new(Duration::from_secs(10), Duration::from_secs(1));
        assert_eq!(waiter.max_steps(), 1);

        let waiter = PollingWaiter::new(Duration::from_millis(100), Duration::from_millis(100));
        assert_eq!(waiter.max_steps(), 1);
    }

    #[test]
    fn interval_is_floored() {
        let waiter = PollingWaiter::new(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(waiter.interval(), MIN_INTERVAL);
        assert_eq!(waiter.max_steps(), 10);
    }
}
