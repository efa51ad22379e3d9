//! Per-source-IP authentication failure tracking and temporary bans.
//!
//! Two maps, each guarded by its own `RwLock`: a sliding window of recent
//! failure timestamps per IP, and a set of currently-banned IPs with their
//! expiry. Both are pruned lazily, on the next call that touches a given IP,
//! rather than by a background sweep — a ban only needs to be *observed*
//! correctly, not removed promptly.

use std::{
	collections::{HashMap, VecDeque},
	net::IpAddr,
	time::{Duration, Instant},
};

use parking_lot::RwLock;

/// Default window/threshold/ban-duration: 5 failures inside a 5-minute
/// window bans the source for 60 minutes.
const DEFAULT_WINDOW: Duration = Duration::from_secs(5 * 60);
const DEFAULT_THRESHOLD: usize = 5;
const DEFAULT_BAN_DURATION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
	pub window: Duration,
	pub threshold: usize,
	pub ban_duration: Duration,
}

impl Default for RateLimiterConfig {
	fn default() -> Self {
		Self { window: DEFAULT_WINDOW, threshold: DEFAULT_THRESHOLD, ban_duration: DEFAULT_BAN_DURATION }
	}
}

/// Tracks authentication failures per source IP and bans sources that fail
/// too often in too short a window. One instance is shared across every
/// accepted connection.
pub struct RateLimiter {
	config: RateLimiterConfig,
	failures: RwLock<HashMap<IpAddr, VecDeque<Instant>>>,
	bans: RwLock<HashMap<IpAddr, Instant>>,
}

impl RateLimiter {
	pub fn new(config: RateLimiterConfig) -> Self {
		Self { config, failures: RwLock::new(HashMap::new()), bans: RwLock::new(HashMap::new()) }
	}

	/// Returns whether `ip` is currently banned. An expired ban is cleared
	/// (along with its failure history) before returning `false`, so a fresh
	/// run of failures starts the window over.
	pub fn is_banned(&self, ip: IpAddr, now: Instant) -> bool {
		let expired = {
			let bans = self.bans.read();
			match bans.get(&ip) {
				Some(expiry) if now < *expiry => return true,
				Some(_) => true,
				None => false,
			}
		};
		if expired {
			self.bans.write().remove(&ip);
			self.failures.write().remove(&ip);
		}
		false
	}

	/// Record an authentication failure from `ip` at `now`, pruning entries
	/// older than the configured window. Bans the source once the pruned
	/// count reaches the configured threshold.
	pub fn record_failure(&self, ip: IpAddr, now: Instant) {
		let mut failures = self.failures.write();
		let entry = failures.entry(ip).or_default();
		entry.push_back(now);
		while let Some(oldest) = entry.front() {
			if now.duration_since(*oldest) > self.config.window {
				entry.pop_front();
			} else {
				break;
			}
		}
		if entry.len() >= self.config.threshold {
			self.bans.write().insert(ip, now + self.config.ban_duration);
		}
	}
}

impl Default for RateLimiter {
	fn default() -> Self {
		Self::new(RateLimiterConfig::default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ip() -> IpAddr {
		IpAddr::from([203, 0, 113, 9])
	}

	#[test]
	fn five_failures_bans_fourth_does_not() {
		let limiter = RateLimiter::default();
		let start = Instant::now();
		for i in 0..4 {
			limiter.record_failure(ip(), start + Duration::from_millis(i * 10));
			assert!(!limiter.is_banned(ip(), start + Duration::from_millis(i * 10)));
		}
		limiter.record_failure(ip(), start + Duration::from_millis(40));
		assert!(limiter.is_banned(ip(), start + Duration::from_millis(41)));
	}

	#[test]
	fn ban_expires_after_configured_duration() {
		let config = RateLimiterConfig { window: Duration::from_secs(300), threshold: 5, ban_duration: Duration::from_secs(60 * 60) };
		let limiter = RateLimiter::new(config);
		let start = Instant::now();
		for _ in 0..5 {
			limiter.record_failure(ip(), start);
		}
		assert!(limiter.is_banned(ip(), start + Duration::from_secs(60 * 60) - Duration::from_secs(1)));
		assert!(!limiter.is_banned(ip(), start + Duration::from_secs(60 * 60) + Duration::from_secs(1)));
	}

	#[test]
	fn old_failures_fall_out_of_window() {
		let limiter = RateLimiter::default();
		let start = Instant::now();
		for i in 0..4 {
			limiter.record_failure(ip(), start + Duration::from_secs(i * 60));
		}
		// A fifth failure six minutes after the first: the first has aged out
		// of the 5-minute window, so this must not trip the ban.
		limiter.record_failure(ip(), start + Duration::from_secs(6 * 60));
		assert!(!limiter.is_banned(ip(), start + Duration::from_secs(6 * 60)));
	}

	#[test]
	fn unrelated_ip_is_not_banned() {
		let limiter = RateLimiter::default();
		let start = Instant::now();
		for _ in 0..10 {
			limiter.record_failure(ip(), start);
		}
		assert!(!limiter.is_banned(IpAddr::from([1, 2, 3, 4]), start));
	}
}
