//! The single process-wide TUN→QUIC pump: read one packet at a time
//! off the virtual interface, look up its destination in the session
//! registry, and forward it as a QUIC datagram on that session's
//! connection. There is exactly one instance of this loop for the whole
//! server, paired with the per-connection QUIC→TUN direction in
//! [`crate::handler`].

use std::sync::Arc;

use slopn_core::packet;
use slopn_session::SessionManager;
use tokio_util::sync::CancellationToken;

use crate::{iface::VirtualInterface, metrics::Counters};

const READ_BUF_LEN: usize = 65536;

pub async fn run<I: VirtualInterface>(iface: Arc<I>, sessions: Arc<SessionManager>, counters: Arc<Counters>, cancel: CancellationToken) {
	let mut buf = vec![0u8; READ_BUF_LEN];
	loop {
		let n = tokio::select! {
			_ = cancel.cancelled() => break,
			res = iface.read_packet(&mut buf) => match res {
				Ok(n) => n,
				Err(err) => {
					tracing::warn!(%err, "virtual interface read failed, stopping egress pump");
					break;
				}
			},
		};

		let framed = &buf[..n];
		let stripped = packet::strip_framing_prefix(framed);
		let header = match packet::inspect_ipv4(stripped) {
			Ok(header) => header,
			Err(_) => continue,
		};
		if header.destination == sessions.server_vip() {
			continue;
		}
		let Some(conn) = sessions.get_session(header.destination) else {
			continue;
		};
		if conn.send_datagram(bytes::Bytes::copy_from_slice(stripped)).is_err() {
			counters.inc_quic_send_dropped();
			tracing::debug!(dst = %header.destination, "dropped egress datagram, send queue full or connection closed");
		}
	}
}
