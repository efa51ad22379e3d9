//! `RealityTransport`: a `quinn::AsyncUdpSocket` implementation that
//! transparently frames, masks, and authenticates every datagram it sends,
//! and demasks/authenticates every datagram it delivers — so a
//! `quinn::Endpoint` built over it (via `Endpoint::new_with_abstract_socket`)
//! never has to know the carrier is disguised.
//!
//! `poll_recv`/`try_send` must be non-blocking, but deciding what to do with
//! an unauthenticated datagram (spawn a decoy relay, consult the whitelist)
//! is ordinary async work. So a background task owns the raw socket's read
//! half, runs the receive-path state machine, and hands authenticated
//! datagrams to `poll_recv` over a bounded channel; `try_send` runs
//! synchronously inline, since framing a datagram has no I/O of its own.

use std::{
	fmt,
	io::{self, IoSliceMut},
	net::SocketAddr,
	pin::Pin,
	sync::Arc,
	task::{Context, Poll},
};

use quinn::udp::{RecvMeta, Transmit};
use rand::rngs::OsRng;
use tokio::{net::UdpSocket, sync::mpsc};
use tokio_util::sync::CancellationToken;

use crate::{
	codec::{self, Keys},
	decoy::DecoyProxy,
};

const RECV_CHANNEL_DEPTH: usize = 1024;
const MAX_DATAGRAM_LEN: usize = 65527;

struct Delivered {
	addr: SocketAddr,
	payload: Vec<u8>,
}

pub struct RealityTransport {
	raw: Arc<UdpSocket>,
	keys: Keys,
	decoy: Arc<DecoyProxy>,
	receiver: std::sync::Mutex<mpsc::Receiver<Delivered>>,
}

impl fmt::Debug for RealityTransport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RealityTransport").finish_non_exhaustive()
	}
}

impl RealityTransport {
	/// Bind the transport and spawn its background authentication loop.
	/// `cancel` should be a child of the process's root shutdown token.
	pub async fn bind(bind_addr: SocketAddr, keys: Keys, decoy: Arc<DecoyProxy>, cancel: CancellationToken) -> io::Result<Arc<Self>> {
		let std_socket = std::net::UdpSocket::bind(bind_addr)?;
		std_socket.set_nonblocking(true)?;
		let raw = Arc::new(UdpSocket::from_std(std_socket)?);

		let (tx, rx) = mpsc::channel(RECV_CHANNEL_DEPTH);
		let transport = Arc::new(Self { raw: raw.clone(), keys, decoy: decoy.clone(), receiver: std::sync::Mutex::new(rx) });

		tokio::spawn(run_auth_loop(raw, keys, decoy, tx, cancel));

		Ok(transport)
	}
}

/// The background receive-path state machine described by the wire format:
/// try to authenticate every inbound datagram; on success, whitelist the
/// source and deliver the plaintext; on failure, fall back to a clean
/// passthrough for already-whitelisted sources, or silently proxy the raw
/// bytes to the decoy origin.
async fn run_auth_loop(raw: Arc<UdpSocket>, keys: Keys, decoy: Arc<DecoyProxy>, tx: mpsc::Sender<Delivered>, cancel: CancellationToken) {
	let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
	loop {
		let (n, peer) = tokio::select! {
			_ = cancel.cancelled() => break,
			res = raw.recv_from(&mut buf) => match res {
				Ok(v) => v,
				Err(err) => {
					tracing::warn!(%err, "reality transport recv error");
					continue;
				}
			},
		};
		let wire = &buf[..n];

		match codec::decode(&keys, wire) {
			Ok(plaintext) => {
				decoy.whitelist(peer.ip());
				if tx.send(Delivered { addr: peer, payload: plaintext }).await.is_err() {
					break;
				}
			}
			Err(_) => {
				if decoy.is_whitelisted(peer.ip()) {
					// Already-authenticated source sending an unframed carrier
					// packet (e.g. a genuine QUIC Initial): pass through as-is.
					if tx.send(Delivered { addr: peer, payload: wire.to_vec() }).await.is_err() {
						break;
					}
				} else {
					decoy.forward_to_decoy(peer, wire, raw.clone()).await;
				}
			}
		}
	}
}

impl quinn::AsyncUdpSocket for RealityTransport {
	fn create_io_poller(self: Arc<Self>) -> Pin<Box<dyn quinn::UdpPoller>> {
		Box::pin(WritablePoller { socket: self })
	}

	fn try_send(&self, transmit: &Transmit) -> io::Result<()> {
		let mut rng = OsRng;
		let framed = codec::encode(&self.keys, transmit.contents, &mut rng);
		match self.raw.try_send_to(&framed, transmit.destination) {
			Ok(_) => Ok(()),
			Err(err) => Err(err),
		}
	}

	fn poll_recv(&self, cx: &mut Context, bufs: &mut [IoSliceMut<'_>], meta: &mut [RecvMeta]) -> Poll<io::Result<usize>> {
		let mut receiver = self.receiver.lock().expect("reality transport receiver mutex poisoned");
		match receiver.poll_recv(cx) {
			Poll::Ready(Some(delivered)) => {
				let len = delivered.payload.len().min(bufs[0].len());
				bufs[0][..len].copy_from_slice(&delivered.payload[..len]);
				meta[0] = RecvMeta {
					len,
					stride: len,
					addr: delivered.addr,
					ecn: None,
					dst_ip: None,
				};
				Poll::Ready(Ok(1))
			}
			Poll::Ready(None) => Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "reality auth loop exited"))),
			Poll::Pending => Poll::Pending,
		}
	}

	fn local_addr(&self) -> io::Result<SocketAddr> {
		self.raw.local_addr()
	}

	fn may_fragment(&self) -> bool {
		true
	}

	fn max_transmit_segments(&self) -> usize {
		1
	}

	fn max_receive_segments(&self) -> usize {
		1
	}
}

struct WritablePoller {
	socket: Arc<RealityTransport>,
}

impl fmt::Debug for WritablePoller {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WritablePoller").finish_non_exhaustive()
	}
}

impl quinn::UdpPoller for WritablePoller {
	fn poll_writable(self: Pin<&mut Self>, cx: &mut Context) -> Poll<io::Result<()>> {
		self.socket.raw.poll_send_ready(cx)
	}
}
