use clap::{ArgAction, Parser};

/// slopnd — the stealth VPN server's packet data plane.
#[derive(Parser, Debug)]
#[command(about, long_about = None)]
pub struct Cli {
	/// Tunnel subnet, e.g. 10.100.0.0/24.
	#[arg(long, env = "SLOPN_SUBNET", default_value = "10.100.0.0/24")]
	pub subnet: String,

	/// Server's own virtual IP inside `subnet`.
	#[arg(long, env = "SLOPN_IP", default_value = "10.100.0.1")]
	pub ip: String,

	/// UDP port to listen on.
	#[arg(long, default_value_t = 4242)]
	pub port: u16,

	/// Shared authentication token every client must present at login.
	#[arg(long, env = "SLOPN_TOKEN")]
	pub token: String,

	/// Install MASQUERADE NAT and forwarding rules for the tunnel subnet
	/// (Linux only).
	#[arg(long, action = ArgAction::SetTrue)]
	pub nat: bool,

	/// Wrap the UDP socket in the stealth/Reality transport.
	#[arg(long, action = ArgAction::SetTrue)]
	pub obfs: bool,

	/// Decoy origin probes are reverse-proxied to when they fail
	/// authentication (or, in diagnostic mode, whenever they aren't marked
	/// as a probe).
	#[arg(long, env = "SLOPN_MIMIC", default_value = "www.google.com:443")]
	pub mimic: String,

	/// Run in diagnostic echo mode instead of starting the QUIC listener:
	/// observes and logs probe traffic, creates no sessions.
	#[arg(long, action = ArgAction::SetTrue)]
	pub diag: bool,

	/// Authentication failures from one source within `--window` before it
	/// is banned.
	#[arg(long, default_value_t = 5)]
	pub max_attempts: usize,

	/// Sliding window, in seconds, over which `--max-attempts` is counted.
	#[arg(long, default_value_t = 300)]
	pub window: u64,

	/// Ban duration, in seconds, once `--max-attempts` is reached.
	#[arg(long, default_value_t = 3600)]
	pub ban_duration: u64,
}
