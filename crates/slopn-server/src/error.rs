/// Fatal-at-boot errors. Every variant here aborts `slopnd` with a non-zero
/// exit code; nothing past bootstrap should ever produce one of these —
/// per-connection failures are handled entirely inside [`crate::handler`]
/// and never propagate this far.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("invalid subnet CIDR: {0}")]
	InvalidCidr(#[from] std::net::AddrParseError),

	#[error("configured server VIP {0} is not inside subnet {1}")]
	ServerVipOutsideSubnet(std::net::Ipv4Addr, ipnet::Ipv4Net),

	#[error("failed to bind UDP socket on {0}: {1}")]
	Bind(std::net::SocketAddr, #[source] std::io::Error),

	#[error("failed to create or configure the virtual interface: {0}")]
	Tun(#[from] tun::Error),

	#[error("failed to resolve decoy origin {0}: {1}")]
	DecoyResolve(String, #[source] std::io::Error),

	#[error("decoy origin {0} did not resolve to any address")]
	DecoyUnresolved(String),

	#[error("failed to generate self-signed TLS identity: {0}")]
	TlsIdentity(#[source] rcgen::Error),

	#[error("failed to build QUIC server config: {0}")]
	QuicConfig(String),

	#[error("failed to create QUIC endpoint: {0}")]
	Endpoint(#[source] std::io::Error),

	#[error("failed to install NAT/forwarding rules: {0}")]
	Nat(String),
}
