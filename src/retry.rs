//! Bounded retry with a randomized wait between attempts.

// crates.io
use rand::Rng;
// self
use crate::{_prelude::*, obs::FlowKind};

/// Retry policy applied to the low-level request primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Total attempts, including the first one. Values below 1 behave as 1.
	pub max_attempts: u32,
	/// Lower bound of the randomized wait.
	pub min_wait: Duration,
	/// Upper bound of the randomized wait.
	pub max_wait: Duration,
}
impl RetryPolicy {
	/// Policy retrying `max_attempts` times without sleeping between attempts.
	pub const fn without_wait(max_attempts: u32) -> Self {
		Self { max_attempts, min_wait: Duration::ZERO, max_wait: Duration::ZERO }
	}

	/// Picks the wait before the next attempt, preferring an upstream `Retry-After` hint.
	pub fn wait_for(&self, error: &Error) -> Duration {
		if let Some(hint) = error.retry_after().filter(|hint| hint.is_positive()) {
			return hint.min(self.max_wait.max(self.min_wait));
		}
		if self.max_wait <= self.min_wait {
			return self.min_wait.max(Duration::ZERO);
		}

		let min_ms = self.min_wait.whole_milliseconds().max(0) as u64;
		let max_ms = self.max_wait.whole_milliseconds().max(0) as u64;
		let wait_ms = rand::rng().random_range(min_ms..=max_ms);

		Duration::milliseconds(wait_ms as i64)
	}

	/// Runs `op` until it succeeds, fails with a non-retryable error, or attempts run out.
	pub async fn run<T, F, Fut>(&self, kind: FlowKind, mut op: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let attempts = self.max_attempts.max(1);
		let mut attempt = 1;

		loop {
			match op().await {
				Ok(value) => return Ok(value),
				Err(e) if attempt < attempts && e.is_retryable() => {
					let wait = self.wait_for(&e);

					crate::obs::warn_retry(kind, attempt, wait, &e);

					if wait.is_positive() {
						tokio::time::sleep(wait.unsigned_abs()).await;
					}

					attempt += 1;
				},
				Err(e) => return Err(e),
			}
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self { max_attempts: 3, min_wait: Duration::seconds(1), max_wait: Duration::seconds(5) }
	}
}
