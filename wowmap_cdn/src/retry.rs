//! Retry policy for CDN fetches (§4.B): transient failures are retried a
//! fixed number of times with a constant delay; a `404` is never retried —
//! it means the resource genuinely isn't on that host, so the locator should
//! move on to the next CDN endpoint instead of spinning.

use reqwest::StatusCode;
use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub delay: Duration,
}

impl RetryPolicy {
	pub fn new(max_attempts: u32, delay: Duration) -> Self {
		Self { max_attempts, delay }
	}
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self::new(3, Duration::from_millis(500))
	}
}

/// Whether a failed HTTP response is worth retrying on the same host.
pub fn is_retryable_status(status: StatusCode) -> bool {
	matches!(
		status,
		StatusCode::TOO_MANY_REQUESTS
			| StatusCode::REQUEST_TIMEOUT
			| StatusCode::BAD_GATEWAY
			| StatusCode::SERVICE_UNAVAILABLE
			| StatusCode::GATEWAY_TIMEOUT
	)
}

/// Runs `attempt` up to `policy.max_attempts` times. `attempt` returns
/// `Ok(Some(value))` on success, `Ok(None)` for a non-retryable failure that
/// should abort immediately (e.g. a 404), and `Err` for a transient failure
/// worth retrying.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, mut attempt: F) -> anyhow::Result<Option<T>>
where
	F: FnMut(u32) -> Fut,
	Fut: std::future::Future<Output = anyhow::Result<Option<T>>>,
{
	let mut last_err = None;
	for try_number in 1..=policy.max_attempts {
		match attempt(try_number).await {
			Ok(outcome) => return Ok(outcome),
			Err(err) => {
				last_err = Some(err);
				if try_number < policy.max_attempts {
					tokio::time::sleep(policy.delay).await;
				}
			}
		}
	}
	Err(last_err.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	#[test]
	fn retryable_statuses_are_classified_correctly() {
		assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
		assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
		assert!(!is_retryable_status(StatusCode::NOT_FOUND));
		assert!(!is_retryable_status(StatusCode::OK));
	}

	#[tokio::test]
	async fn succeeds_after_transient_failures() {
		let calls = AtomicU32::new(0);
		let policy = RetryPolicy::new(3, Duration::from_millis(1));
		let result = retry(policy, |_| {
			let n = calls.fetch_add(1, Ordering::SeqCst);
			async move {
				if n < 2 {
					anyhow::bail!("transient")
				} else {
					Ok(Some(42))
				}
			}
		})
		.await
		.unwrap();
		assert_eq!(result, Some(42));
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn not_found_aborts_without_exhausting_attempts() {
		let calls = AtomicU32::new(0);
		let policy = RetryPolicy::new(3, Duration::from_millis(1));
		let result: Option<i32> = retry(policy, |_| {
			calls.fetch_add(1, Ordering::SeqCst);
			async move { Ok(None) }
		})
		.await
		.unwrap();
		assert_eq!(result, None);
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn exhausting_attempts_propagates_the_last_error() {
		let policy = RetryPolicy::new(2, Duration::from_millis(1));
		let result: anyhow::Result<Option<i32>> = retry(policy, |_| async { anyhow::bail!("down") }).await;
		assert!(result.is_err());
	}
}
