//! Shared harness for the end-to-end scenarios: a real `quinn::Endpoint`
//! server wired to an in-memory virtual interface (`LoopbackInterface`),
//! and a client-side `quinn::Endpoint` that skips certificate verification
//! the same way a real spoke does against the server's ephemeral identity.

use std::{net::SocketAddr, str::FromStr, sync::Arc, time::Duration};

use ipnet::Ipv4Net;
use quinn::Endpoint;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use slopn_core::AppContext;
use slopn_proto::{LoginRequest, LoginResponse, MessageType};
use slopn_server::{
	audit::AuditLog,
	config::{RateLimitConfig, ServerConfig},
	handler::{self, HandlerDeps},
	iface::loopback::{self, LoopbackHandle},
	metrics::Counters,
	pump, tls,
};
use slopn_session::{RateLimiter, RateLimiterConfig, SessionManager};

pub const TEST_TOKEN: &str = "s3cret";

pub struct TestServer {
	pub addr: SocketAddr,
	pub sessions: Arc<SessionManager>,
	pub loopback: LoopbackHandle,
	pub ctx: Arc<AppContext>,
}

/// Stand up the handler/pump stack over loopback UDP, exactly like
/// `slopn_server::bootstrap::run` does, minus the TUN device and NAT setup.
pub async fn spawn_test_server(subnet: &str, server_vip: &str) -> TestServer {
	let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

	let subnet = Ipv4Net::from_str(subnet).expect("valid test subnet");
	let server_vip = server_vip.parse().expect("valid test server vip");

	let quic_config = tls::build_quic_server_config(&["h3".to_string()]).expect("server tls identity");
	let socket = std::net::UdpSocket::bind(("127.0.0.1", 0)).expect("bind loopback socket");
	let endpoint =
		Endpoint::new(quinn::EndpointConfig::default(), Some(quic_config), socket, Arc::new(quinn::TokioRuntime)).expect("quic endpoint");
	let addr = endpoint.local_addr().expect("local addr");

	let ctx = AppContext::new();
	let sessions = Arc::new(SessionManager::new(subnet, server_vip));
	let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
		window: Duration::from_secs(300),
		threshold: 5,
		ban_duration: Duration::from_secs(3600),
	}));
	let (iface, loopback) = loopback::new_pair();
	let audit = Arc::new(AuditLog::new());
	let counters = Arc::new(Counters::default());

	tokio::spawn(pump::run(iface.clone(), sessions.clone(), counters.clone(), ctx.child_token()));

	let config = Arc::new(ServerConfig {
		token: TEST_TOKEN.to_string(),
		subnet,
		server_vip,
		port: addr.port(),
		decoy_addr: "127.0.0.1:1".to_string(),
		enable_nat: false,
		enable_stealth: false,
		diag_mode: false,
		rate_limit: RateLimitConfig { max_attempts: 5, window: Duration::from_secs(300), ban_duration: Duration::from_secs(3600) },
	});

	let accept_sessions = sessions.clone();
	let accept_ctx = ctx.clone();
	tokio::spawn(async move {
		loop {
			let incoming = tokio::select! {
				_ = accept_ctx.token.cancelled() => break,
				incoming = endpoint.accept() => incoming,
			};
			let Some(incoming) = incoming else { break };
			let deps = HandlerDeps {
				config: config.clone(),
				sessions: accept_sessions.clone(),
				rate_limiter: rate_limiter.clone(),
				iface: iface.clone(),
				audit: audit.clone(),
				counters: counters.clone(),
			};
			tokio::spawn(handler::run(incoming, deps, accept_ctx.child_token()));
		}
	});

	TestServer { addr, sessions, loopback, ctx }
}

/// A client endpoint that dials `addr` and skips certificate verification,
/// matching a real spoke dialing the server's throwaway self-signed identity.
pub async fn connect_client(addr: SocketAddr) -> quinn::Connection {
	let socket = std::net::UdpSocket::bind(("127.0.0.1", 0)).expect("bind client socket");
	let mut endpoint =
		Endpoint::new(quinn::EndpointConfig::default(), None, socket, Arc::new(quinn::TokioRuntime)).expect("client endpoint");

	let mut crypto = rustls::ClientConfig::builder()
		.dangerous()
		.with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
		.with_no_client_auth();
	crypto.alpn_protocols = vec![b"h3".to_vec()];
	let quic_crypto = quinn::crypto::rustls::QuicClientConfig::try_from(crypto).expect("rustls quic client config");
	endpoint.set_default_client_config(quinn::ClientConfig::new(Arc::new(quic_crypto)));

	endpoint.connect(addr, "localhost").expect("connect attempt").await.expect("quic handshake")
}

/// Drive the login exchange over `conn`'s first bidirectional stream and
/// return the parsed response.
pub async fn login(conn: &quinn::Connection, token: &str) -> LoginResponse {
	let (mut send, mut recv) = conn.open_bi().await.expect("open login stream");
	let request = LoginRequest {
		message_type: MessageType::LoginRequest,
		token: token.to_string(),
		client_version: "test".to_string(),
		os: "test".to_string(),
	};
	let body = serde_json::to_vec(&request).expect("serialize login request");
	send.write_all(&body).await.expect("write login request");
	send.finish().expect("finish login stream");

	let data = recv.read_to_end(slopn_proto::exchange::MAX_LOGIN_MESSAGE_LEN).await.expect("read login response");
	serde_json::from_slice(&data).expect("parse login response")
}

/// Wait for `conn` to close and assert it closed with application close
/// code `code` (the close codes the handler uses for login refusals).
pub async fn assert_closed_with(conn: &quinn::Connection, code: slopn_proto::CloseCode) {
	let err = tokio::time::timeout(Duration::from_secs(2), conn.closed()).await.expect("server closes within timeout");
	match err {
		quinn::ConnectionError::ApplicationClosed(close) => assert_eq!(close.error_code, code.into()),
		other => panic!("expected an application close with code {:?}, got {other:?}", code),
	}
}

#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
	fn verify_server_cert(
		&self,
		_end_entity: &CertificateDer<'_>,
		_intermediates: &[CertificateDer<'_>],
		_server_name: &ServerName<'_>,
		_ocsp_response: &[u8],
		_now: UnixTime,
	) -> Result<ServerCertVerified, rustls::Error> {
		Ok(ServerCertVerified::assertion())
	}

	fn verify_tls12_signature(
		&self,
		_message: &[u8],
		_cert: &CertificateDer<'_>,
		_dss: &rustls::DigitallySignedStruct,
	) -> Result<HandshakeSignatureValid, rustls::Error> {
		Ok(HandshakeSignatureValid::assertion())
	}

	fn verify_tls13_signature(
		&self,
		_message: &[u8],
		_cert: &CertificateDer<'_>,
		_dss: &rustls::DigitallySignedStruct,
	) -> Result<HandshakeSignatureValid, rustls::Error> {
		Ok(HandshakeSignatureValid::assertion())
	}

	fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
		vec![
			rustls::SignatureScheme::RSA_PKCS1_SHA256,
			rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
			rustls::SignatureScheme::RSA_PKCS1_SHA384,
			rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
			rustls::SignatureScheme::RSA_PSS_SHA256,
			rustls::SignatureScheme::RSA_PSS_SHA384,
			rustls::SignatureScheme::RSA_PSS_SHA512,
			rustls::SignatureScheme::ED25519,
		]
	}
}
