use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Shared shutdown handle threaded through every long-lived task. Each
/// component that owns a loop takes a child token so cancelling the root
/// token (on SIGINT, or on a fatal bootstrap error) unwinds every task within
/// one `tokio::select!` iteration, without needing a broadcast channel.
pub struct AppContext {
	pub token: CancellationToken,
}

impl AppContext {
	pub fn new() -> Arc<Self> {
		Arc::new(Self { token: CancellationToken::new() })
	}

	pub fn child_token(&self) -> CancellationToken {
		self.token.child_token()
	}

	pub fn is_shutting_down(&self) -> bool {
		self.token.is_cancelled()
	}

	pub fn shutdown(&self) {
		self.token.cancel();
	}
}

impl Default for AppContext {
	fn default() -> Self {
		Self { token: CancellationToken::new() }
	}
}
