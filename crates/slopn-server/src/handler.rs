//! Per-accepted-connection login state machine and QUIC→virtual-interface
//! datagram pump, including the spoke-to-spoke fast path. This is the
//! failure boundary for a single peer: nothing in here propagates an
//! error back to the accept loop, and a panic inside [`run`] is caught by
//! the caller rather than taking the whole daemon down.

use std::{net::SocketAddr, sync::Arc, time::Instant};

use slopn_core::packet;
use slopn_proto::{CloseCode, LoginRequest, LoginResponse, MessageType};
use slopn_session::{RateLimiter, SessionManager};
use tokio_util::sync::CancellationToken;

use crate::{audit::{AuditEvent, AuditLog}, config::ServerConfig, iface::VirtualInterface, metrics::Counters};

const MAX_DATAGRAM_LEN: usize = 65527;

pub struct HandlerDeps<I: VirtualInterface> {
	pub config: Arc<ServerConfig>,
	pub sessions: Arc<SessionManager>,
	pub rate_limiter: Arc<RateLimiter>,
	pub iface: Arc<I>,
	pub audit: Arc<AuditLog>,
	pub counters: Arc<Counters>,
}

/// Drive one accepted QUIC connection end to end: ban check, login,
/// registration, and the QUIC→TUN pump until the connection closes.
pub async fn run<I: VirtualInterface>(connecting: quinn::Incoming, deps: HandlerDeps<I>, cancel: CancellationToken) {
	let remote = connecting.remote_address();

	if deps.rate_limiter.is_banned(remote.ip(), Instant::now()) {
		if let Ok(conn) = connecting.accept() {
			if let Ok(conn) = conn.await {
				conn.close(CloseCode::Banned.into(), b"banned");
			}
		}
		return;
	}

	let conn = match connecting.accept() {
		Ok(c) => c,
		Err(err) => {
			tracing::debug!(%remote, %err, "failed to accept incoming connection");
			return;
		}
	};
	let conn = match conn.await {
		Ok(c) => c,
		Err(err) => {
			tracing::debug!(%remote, %err, "QUIC handshake failed");
			return;
		}
	};

	let vip = match login(&conn, remote, &deps).await {
		Some(vip) => vip,
		None => return,
	};

	deps.audit.record(AuditEvent::Connected, Some(vip), remote, "");
	tracing::info!(%remote, %vip, "client connected");

	pump_until_closed(&conn, vip, &deps, cancel).await;

	deps.sessions.remove_session(vip);
	deps.audit.record(AuditEvent::Disconnected, Some(vip), remote, "");
	tracing::info!(%remote, %vip, "client disconnected");
}

/// Accept the first bidirectional stream, run the login state machine, and
/// either register the session (returning its VIP) or close the connection
/// with the appropriate close code and no further action.
async fn login<I: VirtualInterface>(conn: &quinn::Connection, remote: SocketAddr, deps: &HandlerDeps<I>) -> Option<std::net::Ipv4Addr> {
	let (mut send, mut recv) = match conn.accept_bi().await {
		Ok(streams) => streams,
		Err(err) => {
			tracing::debug!(%remote, %err, "no login stream opened");
			return None;
		}
	};

	let request: LoginRequest = match slopn_proto::read_login_request(&mut recv).await {
		Ok(req) => req,
		Err(err) => {
			// Malformed login JSON / premature stream close: silent close
			// no response body.
			tracing::debug!(%remote, %err, "malformed login request");
			conn.close(CloseCode::Unauthorized.into(), b"");
			return None;
		}
	};

	if request.message_type != MessageType::LoginRequest || !constant_time_eq(request.token.as_bytes(), deps.config.token.as_bytes()) {
		deps.rate_limiter.record_failure(remote.ip(), Instant::now());
		deps.audit.record(AuditEvent::AuthFailure, None, remote, &format!("client_version={}", request.client_version));
		if deps.rate_limiter.is_banned(remote.ip(), Instant::now()) {
			deps.audit.record(AuditEvent::Ban, None, remote, "");
		}
		let resp = LoginResponse::error("Invalid authentication token");
		let _ = slopn_proto::write_login_response(&mut send, &resp).await;
		conn.close(CloseCode::Unauthorized.into(), b"");
		return None;
	}

	let vip = match deps.sessions.allocate() {
		Ok(vip) => vip,
		Err(_) => {
			let resp = LoginResponse::error("Virtual IP pool exhausted");
			let _ = slopn_proto::write_login_response(&mut send, &resp).await;
			conn.close(CloseCode::PoolExhausted.into(), b"");
			return None;
		}
	};

	// Registration strictly precedes any QUIC->TUN dispatch that could read
	// from this session: the fast path and the process-wide egress
	// pump only ever see `vip` once `add_session` below returns.
	if deps.sessions.add_session(vip, conn.clone()).is_err() {
		// Can only happen if the pool handed out an address that's somehow
		// already registered; treat it like exhaustion rather than panic.
		deps.sessions.release(vip);
		let resp = LoginResponse::error("Virtual IP pool exhausted");
		let _ = slopn_proto::write_login_response(&mut send, &resp).await;
		conn.close(CloseCode::PoolExhausted.into(), b"");
		return None;
	}

	let resp = LoginResponse::success(
		vip.to_string(),
		deps.config.server_vip.to_string(),
		deps.config.subnet_mask().to_string(),
		env!("CARGO_PKG_VERSION"),
	);
	if let Err(err) = slopn_proto::write_login_response(&mut send, &resp).await {
		tracing::debug!(%remote, %err, "failed writing login response");
		deps.sessions.remove_session(vip);
		return None;
	}

	Some(vip)
}

/// The per-connection QUIC→TUN pump: read datagrams off this connection
/// until it closes or the server shuts down, forwarding each either to a
/// sibling session (spoke-to-spoke fast path) or to the virtual interface.
async fn pump_until_closed<I: VirtualInterface>(conn: &quinn::Connection, vip: std::net::Ipv4Addr, deps: &HandlerDeps<I>, cancel: CancellationToken) {
	loop {
		let datagram = tokio::select! {
			_ = cancel.cancelled() => break,
			_ = conn.closed() => break,
			res = conn.read_datagram() => match res {
				Ok(d) => d,
				Err(_) => break,
			},
		};

		if datagram.len() > MAX_DATAGRAM_LEN {
			deps.counters.inc_oversized_packet_dropped();
			tracing::debug!(%vip, len = datagram.len(), "dropped oversized datagram");
			continue;
		}

		match packet::inspect_ipv4(&datagram) {
			Ok(header) if header.destination != deps.config.server_vip => {
				if let Some(sibling) = deps.sessions.get_session(header.destination) {
					if sibling.send_datagram(datagram).is_err() {
						deps.counters.inc_quic_send_dropped();
						tracing::debug!(%vip, dst = %header.destination, "dropped datagram on spoke-to-spoke fast path");
					}
					continue;
				}
				// Destination not a registered sibling VIP; falls through to
				// the virtual interface like any other non-local packet.
				write_to_iface(&deps.iface, &datagram, &deps.counters).await;
			}
			_ => {
				write_to_iface(&deps.iface, &datagram, &deps.counters).await;
			}
		}
	}
}

async fn write_to_iface<I: VirtualInterface>(iface: &Arc<I>, packet: &[u8], counters: &Counters) {
	let framed = slopn_core::packet::add_framing_prefix(packet);
	if !iface.write_packet(framed).await {
		counters.inc_tun_write_dropped();
	}
}

/// HMAC-style constant-time comparison for the shared token, so a timing
/// side channel can't shave characters off a guessed secret.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	if a.len() != b.len() {
		return false;
	}
	let mut diff = 0u8;
	for (x, y) in a.iter().zip(b.iter()) {
		diff |= x ^ y;
	}
	diff == 0
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn constant_time_eq_matches_equal_slices() {
		assert!(constant_time_eq(b"s3cret", b"s3cret"));
	}

	#[test]
	fn constant_time_eq_rejects_mismatch() {
		assert!(!constant_time_eq(b"s3cret", b"wrong"));
		assert!(!constant_time_eq(b"short", b"longer-string"));
	}
}
