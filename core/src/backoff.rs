//! Exponential backoff for sync and verification retries
//!
//! `delay = min(base * 2^retry_count, max_delay)`, with the exponent capped so
//! the delay plateaus instead of growing unbounded, and a bounded random
//! jitter applied when scheduling so a burst of failures does not retry in
//! lockstep.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
	pub base: Duration,
	pub max_delay: Duration,
	/// Retry counts above this no longer grow the delay
	pub exponent_cap: u32,
	/// Jitter fraction in `[0, 1]`; the scheduled delay is scaled by a random
	/// factor in `[1 - jitter, 1 + jitter]`
	pub jitter: f64,
}

impl Default for Backoff {
	fn default() -> Self {
		Self {
			base: Duration::from_secs(30),
			max_delay: Duration::from_secs(3600),
			exponent_cap: 10,
			jitter: 0.2,
		}
	}
}

impl Backoff {
	/// Deterministic delay for a given retry count (no jitter)
	pub fn delay(&self, retry_count: i32) -> Duration {
		let exp = retry_count.clamp(0, self.exponent_cap as i32) as u32;
		let millis = (self.base.as_millis() as u64).saturating_mul(1u64 << exp);

		Duration::from_millis(millis).min(self.max_delay)
	}

	/// Jittered delay for a given retry count, still capped at `max_delay`
	pub fn jittered_delay(&self, retry_count: i32) -> Duration {
		let delay = self.delay(retry_count);
		if self.jitter <= 0.0 {
			return delay;
		}

		let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);

		delay.mul_f64(factor.max(0.0)).min(self.max_delay)
	}

	/// Absolute timestamp of the next attempt after `retry_count` failures
	pub fn next_retry_at(&self, now: DateTime<Utc>, retry_count: i32) -> DateTime<Utc> {
		let delay = self.jittered_delay(retry_count);

		now + ChronoDuration::milliseconds(delay.as_millis() as i64)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn backoff() -> Backoff {
		Backoff {
			base: Duration::from_secs(30),
			max_delay: Duration::from_secs(3600),
			exponent_cap: 10,
			jitter: 0.0,
		}
	}

	#[test]
	fn doubles_from_base() {
		let b = backoff();

		assert_eq!(b.delay(0), Duration::from_secs(30));
		assert_eq!(b.delay(1), Duration::from_secs(60));
		assert_eq!(b.delay(2), Duration::from_secs(120));
		assert_eq!(b.delay(3), Duration::from_secs(240));
	}

	#[test]
	fn monotone_then_plateaus() {
		let b = backoff();

		let mut previous = Duration::ZERO;
		for count in 0..40 {
			let delay = b.delay(count);
			assert!(delay >= previous, "delay shrank at retry {count}");
			assert!(delay <= b.max_delay);
			previous = delay;
		}

		// Past the cap the delay stops moving entirely
		assert_eq!(b.delay(10), b.delay(11));
		assert_eq!(b.delay(10), b.delay(1000));
	}

	#[test]
	fn caps_at_max_delay() {
		let b = backoff();

		// 30s * 2^7 = 3840s > 3600s
		assert_eq!(b.delay(7), Duration::from_secs(3600));
	}

	#[test]
	fn negative_count_treated_as_zero() {
		let b = backoff();

		assert_eq!(b.delay(-3), b.delay(0));
	}

	#[test]
	fn jitter_stays_within_bounds() {
		let b = Backoff {
			jitter: 0.2,
			..backoff()
		};

		for _ in 0..200 {
			let jittered = b.jittered_delay(2);
			let exact = b.delay(2);
			assert!(jittered >= exact.mul_f64(0.8));
			assert!(jittered <= exact.mul_f64(1.2));
		}
	}

	#[test]
	fn next_retry_at_is_in_the_future() {
		let b = backoff();
		let now = Utc::now();

		let at = b.next_retry_at(now, 0);
		assert_eq!(at - now, ChronoDuration::seconds(30));
	}
}
