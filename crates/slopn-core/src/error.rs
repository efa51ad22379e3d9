/// Errors shared across the data-plane crates that don't belong to any one
/// of them specifically (bad CIDR, bad packet). Per-crate concerns (reality
/// framing, login protocol, session pool exhaustion) get their own
/// `thiserror` enum in that crate instead of growing this one.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
	#[error("invalid CIDR {0}: {1}")]
	InvalidCidr(String, #[source] std::net::AddrParseError),

	#[error("packet too short to inspect ({0} bytes)")]
	PacketTooShort(usize),
}
