//! Drop counters for the data-plane's backpressure policy: a full
//! QUIC datagram send queue or a blocked TUN write drops the packet rather
//! than blocking or erroring out to the peer, but verbose-mode operators
//! still want a count. Plain atomics — one global `Counters` instance, no
//! metrics-export crate, since nothing beyond periodic log lines currently
//! consumes these (see DESIGN.md for why this one ambient concern stays
//! minimal rather than pulling in `metrics`/`prometheus`).

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Counters {
	pub tun_write_dropped: AtomicU64,
	pub quic_send_dropped: AtomicU64,
	pub oversized_packet_dropped: AtomicU64,
}

impl Counters {
	pub fn snapshot(&self) -> CountersSnapshot {
		CountersSnapshot {
			tun_write_dropped: self.tun_write_dropped.load(Ordering::Relaxed),
			quic_send_dropped: self.quic_send_dropped.load(Ordering::Relaxed),
			oversized_packet_dropped: self.oversized_packet_dropped.load(Ordering::Relaxed),
		}
	}

	pub fn inc_tun_write_dropped(&self) {
		self.tun_write_dropped.fetch_add(1, Ordering::Relaxed);
	}

	pub fn inc_quic_send_dropped(&self) {
		self.quic_send_dropped.fetch_add(1, Ordering::Relaxed);
	}

	pub fn inc_oversized_packet_dropped(&self) {
		self.oversized_packet_dropped.fetch_add(1, Ordering::Relaxed);
	}
}

#[derive(Debug, Clone, Copy)]
pub struct CountersSnapshot {
	pub tun_write_dropped: u64,
	pub quic_send_dropped: u64,
	pub oversized_packet_dropped: u64,
}
