//! Security-event audit log: one CSV record per event to stdout.
//!
//! This is deliberately not routed through `tracing` — operators pipe this
//! stream into log-rotation/SIEM tooling that expects a stable,
//! machine-parseable `RFC3339,EVENT,VIP,REMOTE_ADDR,DETAILS` shape, distinct
//! from the free-form `tracing` diagnostics the rest of the daemon emits.

use std::{
	fmt,
	io::Write,
	net::SocketAddr,
	sync::Mutex,
};

use time::OffsetDateTime;

#[derive(Debug, Clone, Copy)]
pub enum AuditEvent {
	Connected,
	Disconnected,
	AuthFailure,
	Ban,
}

impl fmt::Display for AuditEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AuditEvent::Connected => "CONNECTED",
			AuditEvent::Disconnected => "DISCONNECTED",
			AuditEvent::AuthFailure => "AUTH_FAILURE",
			AuditEvent::Ban => "BAN",
		};
		f.write_str(s)
	}
}

/// A single global audit writer, serialized so concurrent connection
/// handlers don't interleave lines on stdout.
pub struct AuditLog {
	stdout: Mutex<std::io::Stdout>,
}

impl AuditLog {
	pub fn new() -> Self {
		Self { stdout: Mutex::new(std::io::stdout()) }
	}

	pub fn record(&self, event: AuditEvent, vip: Option<std::net::Ipv4Addr>, remote: SocketAddr, details: &str) {
		let ts = OffsetDateTime::now_utc();
		let ts = ts.format(&time::format_description::well_known::Rfc3339).unwrap_or_default();
		let vip = vip.map(|v| v.to_string()).unwrap_or_default();
		let details = details.replace(',', ";");
		let mut stdout = self.stdout.lock().expect("audit log stdout mutex poisoned");
		let _ = writeln!(stdout, "{ts},{event},{vip},{remote},{details}");
	}
}

impl Default for AuditLog {
	fn default() -> Self {
		Self::new()
	}
}
