//! Platform-specific virtual-interface and routing setup. The core data
//! plane is platform-independent and never lives here — only the one-time
//! NAT/forwarding policy install that `--nat` triggers.

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "linux")]
pub use linux::install_nat;

#[cfg(not(target_os = "linux"))]
pub fn install_nat(_subnet: ipnet::Ipv4Net) -> Result<(), crate::error::Error> {
	tracing::warn!("--nat was requested but NAT/forwarding setup is only implemented for Linux; ignoring");
	Ok(())
}
