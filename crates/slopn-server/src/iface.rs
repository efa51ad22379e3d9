//! The virtual-interface seam.
//!
//! Every write to the TUN device must be serialized through a single
//! writer, and the data plane needs a trait boundary so the
//! data-plane forwarding logic in [`crate::handler`] and [`crate::pump`] can
//! be exercised without a real kernel TUN device or root. [`TunInterface`]
//! is the real backend; [`loopback::LoopbackInterface`] is the in-memory
//! test double the workspace integration tests substitute in its place.

use std::{io, sync::Arc};

use tokio::{
	io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf},
	sync::{Mutex, mpsc},
};
use tokio_util::sync::CancellationToken;
use tun::AsyncDevice;

const WRITE_QUEUE_DEPTH: usize = 1024;

/// Read side and write side of the process-wide virtual interface. Every
/// accepted connection gets a cheap clone of the write half (backed by an
/// mpsc channel into one dedicated writer task); only the single TUN→QUIC
/// egress pump ever touches the read half.
pub trait VirtualInterface: Send + Sync + 'static {
	fn read_packet(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;
	/// Returns `false` if the packet was dropped for backpressure (the
	/// writer's queue was full) rather than actually written.
	fn write_packet(&self, packet: Vec<u8>) -> impl Future<Output = bool> + Send;
}

/// Wraps a real `tun::AsyncDevice`. The read half is behind a mutex (there
/// is only ever one reader, the egress pump, but the lock makes that an
/// enforced invariant rather than a convention); the write half is owned
/// entirely by a background task fed over a bounded channel so concurrent
/// connection handlers' writes can never interleave mid-packet.
pub struct TunInterface {
	read_half: Mutex<ReadHalf<AsyncDevice>>,
	write_tx: mpsc::Sender<Vec<u8>>,
}

impl TunInterface {
	pub fn spawn(device: AsyncDevice, cancel: CancellationToken) -> Arc<Self> {
		let (read_half, write_half) = tokio::io::split(device);
		let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
		tokio::spawn(run_writer(write_half, write_rx, cancel));
		Arc::new(Self { read_half: Mutex::new(read_half), write_tx })
	}
}

async fn run_writer(mut write_half: WriteHalf<AsyncDevice>, mut rx: mpsc::Receiver<Vec<u8>>, cancel: CancellationToken) {
	loop {
		let packet = tokio::select! {
			_ = cancel.cancelled() => break,
			packet = rx.recv() => match packet {
				Some(p) => p,
				None => break,
			},
		};
		if let Err(err) = write_half.write_all(&packet).await {
			tracing::warn!(%err, "virtual interface write failed");
		}
	}
}

impl VirtualInterface for TunInterface {
	async fn read_packet(&self, buf: &mut [u8]) -> io::Result<usize> {
		let mut guard = self.read_half.lock().await;
		guard.read(buf).await
	}

	async fn write_packet(&self, packet: Vec<u8>) -> bool {
		// Backpressure policy: a full write queue drops the packet
		// rather than blocking the caller; the caller is responsible for
		// counting the drop.
		self.write_tx.try_send(packet).is_ok()
	}
}

/// In-memory substitute for [`TunInterface`] used by tests: packets written
/// "to the kernel" land on an mpsc channel a test can drain, and packets
/// read "from the kernel" come off a channel the test feeds.
pub mod loopback {
	use super::*;

	pub struct LoopbackInterface {
		inbound_rx: Mutex<mpsc::Receiver<Vec<u8>>>,
		outbound_tx: mpsc::Sender<Vec<u8>>,
	}

	/// The test-facing handle: feed packets in as if the kernel routed them
	/// to the interface, and drain packets the data plane wrote out.
	pub struct LoopbackHandle {
		pub inbound_tx: mpsc::Sender<Vec<u8>>,
		pub outbound_rx: mpsc::Receiver<Vec<u8>>,
	}

	pub fn new_pair() -> (Arc<LoopbackInterface>, LoopbackHandle) {
		let (inbound_tx, inbound_rx) = mpsc::channel(256);
		let (outbound_tx, outbound_rx) = mpsc::channel(256);
		(Arc::new(LoopbackInterface { inbound_rx: Mutex::new(inbound_rx), outbound_tx }), LoopbackHandle { inbound_tx, outbound_rx })
	}

	impl VirtualInterface for LoopbackInterface {
		async fn read_packet(&self, buf: &mut [u8]) -> io::Result<usize> {
			let mut rx = self.inbound_rx.lock().await;
			match rx.recv().await {
				Some(packet) => {
					let len = packet.len().min(buf.len());
					buf[..len].copy_from_slice(&packet[..len]);
					Ok(len)
				}
				None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "loopback interface closed")),
			}
		}

		async fn write_packet(&self, packet: Vec<u8>) -> bool {
			self.outbound_tx.try_send(packet).is_ok()
		}
	}
}
