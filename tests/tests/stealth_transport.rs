//! Scenarios exercising the stealth/Reality transport directly over real
//! loopback UDP sockets, without a full QUIC endpoint on top: an
//! unauthenticated probe must bounce off to the decoy origin, and a properly
//! framed carrier packet must arrive at the transport's receive side intact
//! and within the wire-size bounds the framing format guarantees.

use std::{io::IoSliceMut, net::SocketAddr, sync::Arc, time::Duration};

use quinn::AsyncUdpSocket;
use rand::rngs::OsRng;
use slopn_core::AppContext;
use slopn_reality::{DecoyProxy, RealityTransport, codec, derive_keys};
use tokio::{net::UdpSocket, time::timeout};

const TEST_TOKEN: &[u8] = b"s3cret";

async fn bind_udp(addr: &str) -> (Arc<UdpSocket>, SocketAddr) {
	let socket = Arc::new(UdpSocket::bind(addr).await.expect("bind udp"));
	let local = socket.local_addr().expect("local addr");
	(socket, local)
}

/// E4 — an unauthenticated probe of random bytes is relayed to the decoy
/// origin verbatim, and the decoy's reply is relayed back, well within the
/// spec's 50ms budget; no QUIC connection is ever produced by this path.
#[test_log::test(tokio::test)]
async fn stealth_probe_bounces_off_the_decoy() {
	let (decoy_socket, decoy_addr) = bind_udp("127.0.0.1:0").await;
	tokio::spawn(async move {
		let mut buf = vec![0u8; 2048];
		loop {
			match decoy_socket.recv_from(&mut buf).await {
				Ok((n, peer)) => {
					let _ = decoy_socket.send_to(&buf[..n], peer).await;
				}
				Err(_) => break,
			}
		}
	});

	let keys = derive_keys(TEST_TOKEN);
	let decoy = DecoyProxy::new(decoy_addr);
	let ctx = AppContext::new();
	let transport = RealityTransport::bind("127.0.0.1:0".parse().unwrap(), keys, decoy, ctx.child_token())
		.await
		.expect("bind reality transport");
	let transport_addr = transport.local_addr().expect("transport local addr");

	let (attacker, _attacker_addr) = bind_udp("127.0.0.1:0").await;
	let probe: Vec<u8> = (0..600u32).map(|i| (i % 256) as u8).collect();

	let started = std::time::Instant::now();
	attacker.send_to(&probe, transport_addr).await.expect("send probe");

	let mut buf = vec![0u8; 2048];
	let (n, _from) = timeout(Duration::from_millis(50), attacker.recv_from(&mut buf))
		.await
		.expect("decoy reply arrives within the stealth probe budget")
		.expect("recv_from succeeds");
	assert_eq!(&buf[..n], probe.as_slice(), "the decoy's echo must come back byte-for-byte");
	assert!(started.elapsed() < Duration::from_millis(50));
}

/// E5 — a client wraps a 1200-byte QUIC Initial-sized payload with the
/// stealth framing; the wire datagram falls inside the documented
/// `1232..=1263` range and the transport's receive side delivers exactly the
/// original 1200 bytes back out.
#[test_log::test(tokio::test)]
async fn stealth_framing_delivers_carrier_payload_unchanged() {
	let (decoy_socket, decoy_addr) = bind_udp("127.0.0.1:0").await;
	tokio::spawn(async move {
		let mut buf = vec![0u8; 2048];
		while let Ok((n, peer)) = decoy_socket.recv_from(&mut buf).await {
			let _ = decoy_socket.send_to(&buf[..n], peer).await;
		}
	});

	let keys = derive_keys(TEST_TOKEN);
	let decoy = DecoyProxy::new(decoy_addr);
	let ctx = AppContext::new();
	let transport = RealityTransport::bind("127.0.0.1:0".parse().unwrap(), keys, decoy, ctx.child_token())
		.await
		.expect("bind reality transport");
	let transport_addr = transport.local_addr().expect("transport local addr");

	let (client, _client_addr) = bind_udp("127.0.0.1:0").await;
	let quic_initial: Vec<u8> = (0..1200u32).map(|i| (i % 256) as u8).collect();
	let wire = codec::encode(&keys, &quic_initial, &mut OsRng);
	assert!((1232..=1263).contains(&wire.len()), "framed wire length {} out of the documented bound", wire.len());

	client.send_to(&wire, transport_addr).await.expect("send framed carrier packet");

	let delivered = recv_one(&transport).await;
	assert_eq!(delivered, quic_initial);
}

async fn recv_one(transport: &Arc<RealityTransport>) -> Vec<u8> {
	let mut buf = vec![0u8; 2048];
	let mut bufs = [IoSliceMut::new(&mut buf)];
	let mut meta = [quinn::udp::RecvMeta { addr: "0.0.0.0:0".parse().unwrap(), len: 0, stride: 0, ecn: None, dst_ip: None }];

	timeout(Duration::from_secs(1), std::future::poll_fn(|cx| transport.poll_recv(cx, &mut bufs, &mut meta)))
		.await
		.expect("transport delivers a datagram in time")
		.expect("poll_recv succeeds");

	bufs[0][..meta[0].len].to_vec()
}
