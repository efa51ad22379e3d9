//! Reverse-proxy-to-decoy fallback and the Auth-IP whitelist.
//!
//! Any datagram that fails Stealth/Reality authentication is treated as an
//! unauthorized probe and forwarded byte-for-byte to an innocuous decoy
//! origin, so a passive observer scanning the port sees exactly what they'd
//! see probing the real service the carrier is mimicking. A source IP that
//! has ever authenticated is whitelisted for an hour so its "clean" (carrier)
//! QUIC traffic can be accepted directly without framing.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use moka::sync::Cache;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

const PROXY_SESSION_IDLE: Duration = Duration::from_secs(2 * 60);
const AUTH_WHITELIST_IDLE: Duration = Duration::from_secs(60 * 60);
const CLEANER_INTERVAL: Duration = Duration::from_secs(60);

struct ProxySession {
	relay: Arc<UdpSocket>,
}

/// Holds the decoy relay session cache and the authenticated-IP whitelist.
/// Both are `moka` caches with `time_to_idle` set to the documented eviction
/// windows; [`run_cleaner`] just forces the lazy eviction sweep to happen on
/// a predictable cadence instead of only on next access.
pub struct DecoyProxy {
	decoy_addr: SocketAddr,
	sessions: Cache<SocketAddr, Arc<ProxySession>>,
	whitelist: Cache<std::net::IpAddr, ()>,
}

impl DecoyProxy {
	pub fn new(decoy_addr: SocketAddr) -> Arc<Self> {
		Arc::new(Self {
			decoy_addr,
			sessions: Cache::builder().time_to_idle(PROXY_SESSION_IDLE).build(),
			whitelist: Cache::builder().time_to_idle(AUTH_WHITELIST_IDLE).build(),
		})
	}

	pub fn whitelist(&self, ip: std::net::IpAddr) {
		self.whitelist.insert(ip, ());
	}

	pub fn is_whitelisted(&self, ip: std::net::IpAddr) -> bool {
		self.whitelist.contains_key(&ip)
	}

	/// Forward `data`, verbatim, to the decoy origin on behalf of `peer`,
	/// lazily creating a relay session (and its background reader task) the
	/// first time this peer is seen.
	pub async fn forward_to_decoy(self: &Arc<Self>, peer: SocketAddr, data: &[u8], raw_socket: Arc<UdpSocket>) {
		let session = self.get_or_create_session(peer, raw_socket);
		if let Err(err) = session.relay.send_to(data, self.decoy_addr).await {
			tracing::debug!(%peer, %err, "failed forwarding probe to decoy");
		}
	}

	fn get_or_create_session(self: &Arc<Self>, peer: SocketAddr, raw_socket: Arc<UdpSocket>) -> Arc<ProxySession> {
		self.sessions.get_with(peer, || {
			let bind_addr: SocketAddr = if self.decoy_addr.is_ipv6() { "[::]:0".parse().unwrap() } else { "0.0.0.0:0".parse().unwrap() };
			let std_socket = std::net::UdpSocket::bind(bind_addr).expect("ephemeral relay socket bind");
			std_socket.set_nonblocking(true).expect("set_nonblocking on relay socket");
			let relay = Arc::new(UdpSocket::from_std(std_socket).expect("register relay socket with tokio runtime"));

			let reader = relay.clone();
			let raw = raw_socket;
			tokio::spawn(async move {
				let mut buf = vec![0u8; 65527];
				loop {
					match tokio::time::timeout(PROXY_SESSION_IDLE, reader.recv_from(&mut buf)).await {
						Ok(Ok((n, _from))) => {
							if let Err(err) = raw.send_to(&buf[..n], peer).await {
								tracing::debug!(%peer, %err, "failed relaying decoy response");
								break;
							}
						}
						Ok(Err(err)) => {
							tracing::debug!(%peer, %err, "decoy relay socket error");
							break;
						}
						Err(_timeout) => break,
					}
				}
			});

			Arc::new(ProxySession { relay })
		})
	}
}

/// Periodic sweep that forces both caches to evict idle entries on a fixed
/// cadence rather than only lazily on next access.
pub async fn run_cleaner(proxy: Arc<DecoyProxy>, cancel: CancellationToken) {
	let mut interval = tokio::time::interval(CLEANER_INTERVAL);
	loop {
		tokio::select! {
			_ = cancel.cancelled() => break,
			_ = interval.tick() => {
				proxy.sessions.run_pending_tasks();
				proxy.whitelist.run_pending_tasks();
			}
		}
	}
}
