//! Immutable server configuration, assembled once at boot from CLI flags and
//! environment variables by the `slopnd` binary and handed down by value (or
//! `Arc`) to every subsystem. Nothing here mutates after [`ServerConfig`] is
//! constructed.

use std::{net::Ipv4Addr, time::Duration};

use ipnet::Ipv4Net;

/// The virtual-interface MTU. Fixed by the wire spec, not configurable: a
/// larger MTU would let a client source a fragment-requiring IP packet that
/// can never be delivered as a single QUIC datagram.
pub const TUN_MTU: u16 = 1100;

#[derive(Debug, Clone)]
pub struct ServerConfig {
	/// Shared secret every client authenticates with during login.
	pub token: String,
	/// The tunnel subnet. The server itself occupies `server_vip`, which
	/// MUST fall inside `subnet`.
	pub subnet: Ipv4Net,
	pub server_vip: Ipv4Addr,
	/// UDP port the stealth transport (or, with `--obfs` off, the bare QUIC
	/// endpoint) binds on.
	pub port: u16,
	/// The innocuous service probes are reverse-proxied to.
	pub decoy_addr: String,
	pub enable_nat: bool,
	pub enable_stealth: bool,
	pub diag_mode: bool,
	pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
	pub max_attempts: usize,
	pub window: Duration,
	pub ban_duration: Duration,
}

impl Default for RateLimitConfig {
	fn default() -> Self {
		Self { max_attempts: 5, window: Duration::from_secs(5 * 60), ban_duration: Duration::from_secs(60 * 60) }
	}
}

impl ServerConfig {
	pub fn subnet_mask(&self) -> Ipv4Addr {
		self.subnet.netmask()
	}
}
