//! Stateless helpers for looking inside raw IPv4 packets and for adding or
//! stripping the platform-specific virtual-interface framing prefix. Every
//! function here is a pure `&[u8] -> T` transform; none of them touch the
//! network or the TUN device.

use std::net::Ipv4Addr;

use crate::error::CoreError;

/// Length of the framing prefix the virtual interface expects in front of
/// every packet, per platform. Linux's `tun` device (opened without kernel
/// packet-info, since we add our own discriminator instead of relying on
/// `IFF_NO_PI`) expects a 4-byte `(flags: u16, proto: u16)` header ahead of
/// the IP packet; other platforms the `tun` crate targets read and write
/// bare IP packets.
#[cfg(target_os = "linux")]
pub const FRAMING_PREFIX_LEN: usize = 4;
#[cfg(not(target_os = "linux"))]
pub const FRAMING_PREFIX_LEN: usize = 0;

const ETH_P_IP: u16 = 0x0800;

/// Prepend the platform framing prefix ahead of a raw IPv4 packet destined
/// for the virtual interface.
pub fn add_framing_prefix(packet: &[u8]) -> Vec<u8> {
	if FRAMING_PREFIX_LEN == 0 {
		return packet.to_vec();
	}
	let mut out = Vec::with_capacity(FRAMING_PREFIX_LEN + packet.len());
	out.extend_from_slice(&0u16.to_be_bytes());
	out.extend_from_slice(&ETH_P_IP.to_be_bytes());
	out.extend_from_slice(packet);
	out
}

/// Strip the platform framing prefix off a packet read from the virtual
/// interface, returning the bare IP packet.
pub fn strip_framing_prefix(packet: &[u8]) -> &[u8] {
	if packet.len() < FRAMING_PREFIX_LEN { &[] } else { &packet[FRAMING_PREFIX_LEN..] }
}

/// The subset of an IPv4 header this inspector cares about: enough to route
/// a packet by destination and to log a connection's traffic by source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
	pub source: Ipv4Addr,
	pub destination: Ipv4Addr,
	pub protocol: u8,
}

/// Extract the source/destination/protocol fields of an IPv4 header.
///
/// A prior revision of this inspector sliced the source address as
/// `packet[12:15]` — three bytes, not four — which quietly truncated every
/// source address's last octet. Both fields here read the full four-byte
/// address.
pub fn inspect_ipv4(packet: &[u8]) -> Result<Ipv4Header, CoreError> {
	if packet.len() < 20 {
		return Err(CoreError::PacketTooShort(packet.len()));
	}
	if packet[0] >> 4 != 4 {
		return Err(CoreError::PacketTooShort(packet.len()));
	}
	let source = Ipv4Addr::new(packet[12], packet[13], packet[14], packet[15]);
	let destination = Ipv4Addr::new(packet[16], packet[17], packet[18], packet[19]);
	let protocol = packet[9];
	Ok(Ipv4Header { source, destination, protocol })
}
