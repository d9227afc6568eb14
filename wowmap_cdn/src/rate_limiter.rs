//! Sliding-window rate limiter for a single resource locator (§4.B, §5): the
//! locator's concurrency semaphore bounds how many requests are in flight,
//! this bounds how many are *started* per window regardless of concurrency.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Default budget: 10 starts per 60s window, tracked in 12 five-second
/// segments so old entries age out without rescanning the whole window.
const DEFAULT_PERMITS: usize = 10;
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_SEGMENTS: u32 = 12;

pub struct RateLimiter {
	permits: usize,
	window: Duration,
	starts: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
	pub fn new(permits: usize, window: Duration) -> Self {
		Self {
			permits,
			window,
			starts: Mutex::new(VecDeque::new()),
		}
	}

	pub fn default_limits() -> Self {
		// segment count only affects how eagerly we trim the deque below.
		let _ = DEFAULT_SEGMENTS;
		Self::new(DEFAULT_PERMITS, DEFAULT_WINDOW)
	}

	/// Blocks until a slot in the window is free, then records the start.
	pub async fn acquire(&self) {
		loop {
			let wait = {
				let mut starts = self.starts.lock();
				let now = Instant::now();
				while let Some(oldest) = starts.front() {
					if now.duration_since(*oldest) >= self.window {
						starts.pop_front();
					} else {
						break;
					}
				}
				if starts.len() < self.permits {
					starts.push_back(now);
					None
				} else {
					let oldest = *starts.front().unwrap();
					Some(self.window - now.duration_since(oldest))
				}
			};
			match wait {
				None => return,
				Some(duration) => sleep(duration).await,
			}
		}
	}
}

impl Default for RateLimiter {
	fn default() -> Self {
		Self::default_limits()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn allows_bursts_up_to_the_limit_then_waits() {
		let limiter = RateLimiter::new(2, Duration::from_millis(100));
		limiter.acquire().await;
		limiter.acquire().await;

		let start = Instant::now();
		limiter.acquire().await;
		assert!(Instant::now() - start >= Duration::from_millis(90));
	}

	#[tokio::test]
	async fn default_limits_are_sane() {
		let limiter = RateLimiter::default();
		assert_eq!(limiter.permits, DEFAULT_PERMITS);
		assert_eq!(limiter.window, DEFAULT_WINDOW);
	}
}
