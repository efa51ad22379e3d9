use std::{net::Ipv4Addr, str::FromStr, time::Duration};

use clap::Parser as _;
use eyre::Context as _;
use ipnet::Ipv4Net;
use slopn_server::config::{RateLimitConfig, ServerConfig};
use tracing::Level;

use crate::cli::Cli;

mod cli;
mod log;

#[tokio::main]
async fn main() -> eyre::Result<()> {
	log::init_log(Level::INFO)?;
	let cli = match Cli::try_parse() {
		Ok(v) => v,
		Err(err) => {
			println!("{:#}", err);
			return Ok(());
		}
	};

	let config = build_config(cli).wrap_err("invalid configuration")?;

	tracing::info!(
		obfs = config.enable_stealth,
		diag = config.diag_mode,
		nat = config.enable_nat,
		"slopnd {} starting",
		env!("CARGO_PKG_VERSION")
	);

	slopn_server::run(config).await.wrap_err("server exited with an error")?;
	Ok(())
}

fn build_config(cli: Cli) -> eyre::Result<ServerConfig> {
	let subnet = Ipv4Net::from_str(&cli.subnet).wrap_err("--subnet")?;
	let server_vip = Ipv4Addr::from_str(&cli.ip).wrap_err("--ip")?;

	Ok(ServerConfig {
		token: cli.token,
		subnet,
		server_vip,
		port: cli.port,
		decoy_addr: cli.mimic,
		enable_nat: cli.nat,
		enable_stealth: cli.obfs,
		diag_mode: cli.diag,
		rate_limit: RateLimitConfig {
			max_attempts: cli.max_attempts,
			window: Duration::from_secs(cli.window),
			ban_duration: Duration::from_secs(cli.ban_duration),
		},
	})
}
