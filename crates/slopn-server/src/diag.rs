//! Diagnostic echo mode: an alternate server mode that never starts
//! the QUIC listener or creates sessions. Probe-marked datagrams are echoed
//! back immediately and then analyzed asynchronously; everything else is
//! reverse-proxied to the decoy origin, exactly like the stealth
//! transport's failure path, but observationally logged instead of silent.

use std::{
	collections::HashMap,
	net::{IpAddr, SocketAddr},
	sync::{Arc, Mutex},
	time::{Duration, Instant},
};

use moka::sync::Cache;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

const PROBE_MARKER: u8 = 0xFF;
const REPLAY_WINDOW: Duration = Duration::from_secs(10);
const PROXY_SESSION_IDLE: Duration = Duration::from_secs(30);
const REPLAY_LABEL_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
	Probe,
	QuicLong,
	QuicShort,
	Raw,
}

impl HeaderKind {
	fn classify(first_byte: u8) -> Self {
		if first_byte == PROBE_MARKER {
			HeaderKind::Probe
		} else if first_byte & 0x80 != 0 {
			HeaderKind::QuicLong
		} else if first_byte & 0x40 != 0 {
			HeaderKind::QuicShort
		} else {
			HeaderKind::Raw
		}
	}
}

impl std::fmt::Display for HeaderKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			HeaderKind::Probe => "PROBE",
			HeaderKind::QuicLong => "QUIC-LONG",
			HeaderKind::QuicShort => "QUIC-SHORT",
			HeaderKind::Raw => "RAW",
		};
		f.write_str(s)
	}
}

/// Shannon entropy of `data`, in bits per byte.
fn shannon_entropy(data: &[u8]) -> f64 {
	if data.is_empty() {
		return 0.0;
	}
	let mut counts = [0u32; 256];
	for &b in data {
		counts[b as usize] += 1;
	}
	let len = data.len() as f64;
	counts
		.iter()
		.filter(|&&c| c > 0)
		.map(|&c| {
			let p = c as f64 / len;
			-p * p.log2()
		})
		.sum()
}

/// Verify the trailing 4-byte CRC32 of `payload`'s prefix (everything but
/// the last 4 bytes). Returns `false` if the packet is too short to carry a
/// trailing checksum.
fn verify_trailing_crc32(payload: &[u8]) -> bool {
	if payload.len() < 4 {
		return false;
	}
	let (body, trailer) = payload.split_at(payload.len() - 4);
	let expected = u32::from_be_bytes(trailer.try_into().expect("4-byte slice"));
	crc32fast::hash(body) == expected
}

struct ArrivalTracker {
	last_seen: Mutex<HashMap<IpAddr, Instant>>,
}

impl ArrivalTracker {
	fn new() -> Self {
		Self { last_seen: Mutex::new(HashMap::new()) }
	}

	fn gap_since_last(&self, from: IpAddr, now: Instant) -> Option<Duration> {
		let mut map = self.last_seen.lock().expect("arrival tracker mutex poisoned");
		let gap = map.get(&from).map(|prev| now.duration_since(*prev));
		map.insert(from, now);
		gap
	}
}

struct ProxySession {
	relay: Arc<UdpSocket>,
}

/// Everything the diagnostic loop needs across iterations: the decoy-proxy
/// cache (30-second idle lifecycle, matching the stealth mirror's shape but
/// with the diagnostic mode's own, shorter window), the replay-label cache,
/// and the inter-arrival tracker.
pub struct DiagState {
	decoy_addr: SocketAddr,
	proxy_sessions: Cache<SocketAddr, Arc<ProxySession>>,
	replay_labels: Cache<(IpAddr, [u8; REPLAY_LABEL_LEN]), ()>,
	arrivals: ArrivalTracker,
}

impl DiagState {
	pub fn new(decoy_addr: SocketAddr) -> Arc<Self> {
		Arc::new(Self {
			decoy_addr,
			proxy_sessions: Cache::builder().time_to_idle(PROXY_SESSION_IDLE).build(),
			replay_labels: Cache::builder().time_to_live(REPLAY_WINDOW).build(),
			arrivals: ArrivalTracker::new(),
		})
	}
}

/// Run the diagnostic echo loop on `raw` until cancelled. Never returns an
/// error to the caller; socket errors are logged and the loop continues.
pub async fn run(raw: Arc<UdpSocket>, state: Arc<DiagState>, cancel: CancellationToken) {
	let mut buf = vec![0u8; 65536];
	loop {
		let (n, from) = tokio::select! {
			_ = cancel.cancelled() => break,
			res = raw.recv_from(&mut buf) => match res {
				Ok(v) => v,
				Err(err) => {
					tracing::warn!(%err, "diagnostic socket recv error");
					continue;
				}
			},
		};
		let datagram = buf[..n].to_vec();

		if datagram.first() == Some(&PROBE_MARKER) {
			if let Err(err) = raw.send_to(&datagram, from).await {
				tracing::debug!(%from, %err, "failed echoing probe datagram");
			}
			let state = state.clone();
			tokio::spawn(async move { analyze_probe(&state, &datagram, from) });
		} else {
			forward_to_decoy(&state, &datagram, from, raw.clone()).await;
		}
	}
}

/// Synchronous analysis of an already-echoed probe: size, inter-arrival
/// gap, entropy, header classification, CRC verification, and replay
/// detection. Run off the hot path via `tokio::spawn` so it never delays
/// the echo itself.
fn analyze_probe(state: &DiagState, datagram: &[u8], from: SocketAddr) {
	let now = Instant::now();
	let gap = state.arrivals.gap_since_last(from.ip(), now);
	let entropy = shannon_entropy(datagram);
	let kind = datagram.first().copied().map(HeaderKind::classify).unwrap_or(HeaderKind::Raw);
	let crc_ok = verify_trailing_crc32(datagram);

	let replay = if datagram.len() >= REPLAY_LABEL_LEN + 1 {
		let mut label = [0u8; REPLAY_LABEL_LEN];
		label.copy_from_slice(&datagram[1..1 + REPLAY_LABEL_LEN]);
		let key = (from.ip(), label);
		let seen_before = state.replay_labels.contains_key(&key);
		state.replay_labels.insert(key, ());
		seen_before
	} else {
		false
	};

	tracing::info!(
		%from,
		size = datagram.len(),
		gap_ms = gap.map(|g| g.as_millis() as i64).unwrap_or(-1),
		entropy,
		header = %kind,
		crc_ok,
		"diagnostic probe analyzed"
	);
	if replay {
		tracing::warn!(%from, "[DPI REPLAY ATTACK]");
	}
}

async fn forward_to_decoy(state: &Arc<DiagState>, datagram: &[u8], from: SocketAddr, raw: Arc<UdpSocket>) {
	let session = state.proxy_sessions.get_with(from, || {
		let bind_addr: SocketAddr = if state.decoy_addr.is_ipv6() { "[::]:0".parse().unwrap() } else { "0.0.0.0:0".parse().unwrap() };
		let std_socket = std::net::UdpSocket::bind(bind_addr).expect("ephemeral diagnostic relay socket bind");
		std_socket.set_nonblocking(true).expect("set_nonblocking on diagnostic relay socket");
		let relay = Arc::new(UdpSocket::from_std(std_socket).expect("register diagnostic relay socket with tokio runtime"));

		let reader = relay.clone();
		let decoy_addr = state.decoy_addr;
		tokio::spawn(async move {
			let mut buf = vec![0u8; 65536];
			loop {
				match tokio::time::timeout(PROXY_SESSION_IDLE, reader.recv_from(&mut buf)).await {
					Ok(Ok((n, peer))) if peer == decoy_addr => {
						if let Err(err) = raw.send_to(&buf[..n], from).await {
							tracing::debug!(%from, %err, "failed relaying decoy response in diagnostic mode");
							break;
						}
					}
					Ok(Ok(_)) => continue,
					Ok(Err(err)) => {
						tracing::debug!(%from, %err, "diagnostic relay socket error");
						break;
					}
					Err(_timeout) => break,
				}
			}
		});

		Arc::new(ProxySession { relay })
	});

	if let Err(err) = session.relay.send_to(datagram, state.decoy_addr).await {
		tracing::debug!(%from, %err, "failed forwarding to decoy in diagnostic mode");
	}
}
