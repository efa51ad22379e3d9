//! Server bootstrap: opens the UDP socket, wraps it in the stealth
//! transport (or not, per `--obfs`), creates the virtual interface, installs
//! NAT policy, and starts either the QUIC listener or diagnostic echo mode.
//! Every long-lived loop is spawned on the root [`slopn_core::AppContext`]'s
//! `CancellationToken` so a single `shutdown()` call cascades everywhere.

use std::{net::SocketAddr, sync::Arc};

use futures::FutureExt;
use slopn_core::AppContext;
use slopn_reality::{DecoyProxy, RealityTransport};
use slopn_session::{RateLimiter, RateLimiterConfig, SessionManager};
use tokio::net::UdpSocket;

use crate::{
	audit::AuditLog,
	config::{ServerConfig, TUN_MTU},
	diag, error::Error,
	handler::{self, HandlerDeps},
	iface::TunInterface,
	metrics::Counters,
	platform, pump, tls,
};

const DEFAULT_MIMIC_ALPN: &str = "h3";

/// Resolve `host:port` to a single `SocketAddr`. Used for the decoy origin,
/// which is configured as a hostname (the default mimics a real web origin)
/// rather than a bare IP.
async fn resolve_decoy(addr: &str) -> Result<SocketAddr, Error> {
	tokio::net::lookup_host(addr)
		.await
		.map_err(|err| Error::DecoyResolve(addr.to_string(), err))?
		.next()
		.ok_or_else(|| Error::DecoyUnresolved(addr.to_string()))
}

pub async fn run(config: ServerConfig) -> Result<(), Error> {
	// Install once per process; quinn's rustls integration needs a default
	// crypto provider selected before the first `ServerConfig` is built.
	let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

	if !config.subnet.contains(&config.server_vip) {
		return Err(Error::ServerVipOutsideSubnet(config.server_vip, config.subnet));
	}
	let config = Arc::new(config);
	let ctx = AppContext::new();
	let decoy_addr = resolve_decoy(&config.decoy_addr).await?;
	let bind_addr: SocketAddr = ([0, 0, 0, 0], config.port).into();

	if config.diag_mode {
		return run_diag_mode(bind_addr, decoy_addr, ctx).await;
	}

	let keys = slopn_reality::derive_keys(config.token.as_bytes());
	let decoy = DecoyProxy::new(decoy_addr);
	tokio::spawn(slopn_reality::decoy::run_cleaner(decoy.clone(), ctx.child_token()));

	let quic_config = tls::build_quic_server_config(&[DEFAULT_MIMIC_ALPN.to_string()])?;

	let endpoint = if config.enable_stealth {
		let transport = RealityTransport::bind(bind_addr, keys, decoy.clone(), ctx.child_token())
			.await
			.map_err(|err| Error::Bind(bind_addr, err))?;
		quinn::Endpoint::new_with_abstract_socket(
			quinn::EndpointConfig::default(),
			Some(quic_config),
			transport,
			Arc::new(quinn::TokioRuntime),
		)
		.map_err(Error::Endpoint)?
	} else {
		let socket = std::net::UdpSocket::bind(bind_addr).map_err(|err| Error::Bind(bind_addr, err))?;
		quinn::Endpoint::new(quinn::EndpointConfig::default(), Some(quic_config), socket, Arc::new(quinn::TokioRuntime))
			.map_err(Error::Endpoint)?
	};

	let tun_device = create_tun_device(&config)?;
	let iface = TunInterface::spawn(tun_device, ctx.child_token());

	if config.enable_nat {
		platform::install_nat(config.subnet)?;
	}

	let sessions = Arc::new(SessionManager::new(config.subnet, config.server_vip));
	let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
		window: config.rate_limit.window,
		threshold: config.rate_limit.max_attempts,
		ban_duration: config.rate_limit.ban_duration,
	}));
	let audit = Arc::new(AuditLog::new());
	let counters = Arc::new(Counters::default());

	tokio::spawn(pump::run(iface.clone(), sessions.clone(), counters.clone(), ctx.child_token()));

	tracing::info!(listen = %bind_addr, vip = %config.server_vip, subnet = %config.subnet, "slopnd listening");

	loop {
		let incoming = tokio::select! {
			_ = ctx.token.cancelled() => break,
			incoming = endpoint.accept() => incoming,
		};
		let Some(incoming) = incoming else { break };

		let deps = HandlerDeps {
			config: config.clone(),
			sessions: sessions.clone(),
			rate_limiter: rate_limiter.clone(),
			iface: iface.clone(),
			audit: audit.clone(),
			counters: counters.clone(),
		};
		let cancel = ctx.child_token();

		// Each connection is its own failure boundary: the accept loop
		// never stops for a per-connection error, and a panic inside the
		// handler is caught here instead of taking the whole daemon down.
		tokio::spawn(async move {
			let result = std::panic::AssertUnwindSafe(handler::run(incoming, deps, cancel)).catch_unwind().await;
			if let Err(panic) = result {
				tracing::error!(?panic, "connection handler panicked");
			}
		});
	}

	endpoint.wait_idle().await;
	Ok(())
}

async fn run_diag_mode(bind_addr: SocketAddr, decoy_addr: SocketAddr, ctx: Arc<AppContext>) -> Result<(), Error> {
	let std_socket = std::net::UdpSocket::bind(bind_addr).map_err(|err| Error::Bind(bind_addr, err))?;
	std_socket.set_nonblocking(true).map_err(|err| Error::Bind(bind_addr, err))?;
	let raw = Arc::new(UdpSocket::from_std(std_socket).map_err(|err| Error::Bind(bind_addr, err))?);
	let state = diag::DiagState::new(decoy_addr);

	tracing::info!(listen = %bind_addr, decoy = %decoy_addr, "slopnd running in diagnostic echo mode (no QUIC listener, no sessions)");

	tokio::select! {
		_ = diag::run(raw, state, ctx.child_token()) => {}
		_ = tokio::signal::ctrl_c() => {}
	}
	Ok(())
}

fn create_tun_device(config: &ServerConfig) -> Result<tun::AsyncDevice, Error> {
	let mut tun_config = tun::Configuration::default();
	tun_config.address(config.server_vip).netmask(config.subnet_mask()).mtu(TUN_MTU as i32).up();
	#[cfg(target_os = "linux")]
	tun_config.name("tun0");
	tun_config.platform_config(|platform| {
		// We add our own 4-byte (flags, proto) framing prefix in
		// `slopn_core::packet` rather than relying on the kernel's own
		// packet-information header.
		platform.packet_information(false);
	});
	tun::create_as_async(&tun_config).map_err(Error::Tun)
}
