//! Concurrency limit tuning for the per-build fan-out (§5 of the design doc).
//!
//! The orchestrator's per-map and per-tile worker pools default to the host's
//! CPU count, but tests want a deterministic single-worker mode, and the
//! resource locator's I/O concurrency is governed independently.

use num_cpus;

/// Bounded-concurrency settings for one scan.
#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyLimits {
	/// Worker count for per-map WDT parsing and per-tile encode fan-out.
	pub workers: usize,
}

impl ConcurrencyLimits {
	pub fn new(workers: usize) -> Self {
		Self { workers: workers.max(1) }
	}

	/// One worker per logical CPU; used by the orchestrator by default.
	pub fn cpu_bound() -> Self {
		Self::new(num_cpus::get())
	}

	/// A single worker, used by tests that need deterministic ordering.
	pub fn single_threaded() -> Self {
		Self::new(1)
	}
}

impl Default for ConcurrencyLimits {
	fn default() -> Self {
		Self::cpu_bound()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cpu_bound_matches_host() {
		let limits = ConcurrencyLimits::cpu_bound();
		assert_eq!(limits.workers, num_cpus::get());
	}

	#[test]
	fn single_threaded_is_one() {
		assert_eq!(ConcurrencyLimits::single_threaded().workers, 1);
	}

	#[test]
	fn new_clamps_to_at_least_one() {
		assert_eq!(ConcurrencyLimits::new(0).workers, 1);
	}
}
