//! Full-stack scenarios driven through a real `quinn::Connection`, against
//! the handler/pump/session stack wired the same way `slopn_server::bootstrap`
//! wires it, substituting an in-memory virtual interface for the kernel TUN
//! device and a loopback UDP socket for the real listening port.

mod common;

use std::time::Duration;

use common::{TEST_TOKEN, assert_closed_with, connect_client, login, spawn_test_server};
use slopn_proto::{CloseCode, LoginStatus};
use tokio::time::timeout;

fn sample_ipv4_packet(src: [u8; 4], dst: [u8; 4], protocol: u8, id: u8) -> Vec<u8> {
	let mut packet = vec![0u8; 20];
	packet[0] = 0x45;
	packet[4] = id;
	packet[9] = protocol;
	packet[12..16].copy_from_slice(&src);
	packet[16..20].copy_from_slice(&dst);
	packet
}

/// E1 — happy path: a client logs in with the shared token, gets assigned
/// the first free VIP and the server's own VIP/mask back, and a datagram it
/// sends to the server's VIP appears verbatim on the virtual interface.
#[test_log::test(tokio::test)]
async fn happy_path_login_and_forward_to_tun() {
	let mut server = spawn_test_server("10.100.0.0/24", "10.100.0.1").await;
	let conn = connect_client(server.addr).await;

	let resp = login(&conn, TEST_TOKEN).await;
	assert_eq!(resp.status, LoginStatus::Success);
	assert_eq!(resp.assigned_vip.as_deref(), Some("10.100.0.2"));
	assert_eq!(resp.server_vip.as_deref(), Some("10.100.0.1"));

	let packet = sample_ipv4_packet([10, 100, 0, 2], [10, 100, 0, 1], 1, 1);
	conn.send_datagram(packet.clone().into()).expect("send datagram");

	let delivered = timeout(Duration::from_secs(2), server.loopback.outbound_rx.recv())
		.await
		.expect("virtual interface received a packet in time")
		.expect("loopback channel open");
	let stripped = slopn_core::packet::strip_framing_prefix(&delivered);
	assert_eq!(stripped, packet.as_slice());
}

/// E2 — wrong token: five rapid failed logins from the same connection
/// source produce a ban, and the connection the threshold trips on (or any
/// later one within the ban window) is refused with `CloseCode::Banned`.
#[test_log::test(tokio::test)]
async fn repeated_wrong_token_bans_the_source() {
	let server = spawn_test_server("10.100.0.0/24", "10.100.0.1").await;

	for _ in 0..5 {
		let conn = connect_client(server.addr).await;
		let resp = login(&conn, "wrong").await;
		assert_eq!(resp.status, LoginStatus::Error);
		assert_closed_with(&conn, CloseCode::Unauthorized).await;
	}

	assert!(server.sessions.session_count() == 0, "no failed login ever registers a session");

	// A sixth connection, even with the right token, must be refused purely
	// on the ban — no login stream is ever opened for it.
	let banned_conn = connect_client(server.addr).await;
	assert_closed_with(&banned_conn, CloseCode::Banned).await;
}

/// E3 — spoke-to-spoke: a datagram from one client addressed to another's
/// VIP is delivered to the sibling directly; the virtual interface never
/// sees it.
#[test_log::test(tokio::test)]
async fn spoke_to_spoke_bypasses_virtual_interface() {
	let mut server = spawn_test_server("10.100.0.0/24", "10.100.0.1").await;

	let conn_a = connect_client(server.addr).await;
	let resp_a = login(&conn_a, TEST_TOKEN).await;
	assert_eq!(resp_a.assigned_vip.as_deref(), Some("10.100.0.2"));

	let conn_b = connect_client(server.addr).await;
	let resp_b = login(&conn_b, TEST_TOKEN).await;
	assert_eq!(resp_b.assigned_vip.as_deref(), Some("10.100.0.3"));

	let packet = sample_ipv4_packet([10, 100, 0, 2], [10, 100, 0, 3], 1, 7);
	conn_a.send_datagram(packet.clone().into()).expect("send datagram");

	let received = timeout(Duration::from_secs(2), conn_b.read_datagram()).await.expect("sibling receives in time").expect("datagram");
	assert_eq!(received.as_ref(), packet.as_slice());

	// Give the pump a moment to have misrouted it, if it were going to.
	let stray = timeout(Duration::from_millis(200), server.loopback.outbound_rx.recv()).await;
	assert!(stray.is_err(), "spoke-to-spoke traffic must never reach the virtual interface");
}

/// E6 — pool exhaustion: with only one usable VIP in the subnet, a second
/// concurrent login is refused with `CloseCode::PoolExhausted`.
#[test_log::test(tokio::test)]
async fn pool_exhaustion_refuses_second_login() {
	let server = spawn_test_server("10.100.0.0/30", "10.100.0.1").await;

	let first = connect_client(server.addr).await;
	let resp_first = login(&first, TEST_TOKEN).await;
	assert_eq!(resp_first.status, LoginStatus::Success);

	let second = connect_client(server.addr).await;
	let resp_second = login(&second, TEST_TOKEN).await;
	assert_eq!(resp_second.status, LoginStatus::Error);
	assert_closed_with(&second, CloseCode::PoolExhausted).await;
}
