//! Virtual-IP pool and the registry mapping an assigned VIP to its live
//! session. Both live behind a single `parking_lot::RwLock` each, guarding
//! the invariant that the pool's free addresses plus the registry's
//! allocated addresses always equal the set built at boot — an address is
//! never in both places, and never in neither.

use std::{
	collections::{HashMap, VecDeque},
	net::Ipv4Addr,
	time::Instant,
};

use ipnet::Ipv4Net;
use parking_lot::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
	#[error("virtual-IP pool is exhausted")]
	PoolExhausted,
	#[error("address {0} is not part of this pool")]
	NotInPool(Ipv4Addr),
	#[error("address {0} already has a registered session")]
	AlreadyRegistered(Ipv4Addr),
}

pub struct Session {
	pub vip: Ipv4Addr,
	pub conn: quinn::Connection,
	pub created_at: Instant,
}

struct Inner {
	free: VecDeque<Ipv4Addr>,
	sessions: HashMap<Ipv4Addr, Session>,
}

/// Owns the subnet's address pool plus the registry of who currently holds
/// each allocated address. Constructed once at boot from the configured
/// CIDR; every address is carved out of either `free` or `sessions`, never
/// both, and the union of the two never grows or shrinks after construction.
pub struct SessionManager {
	subnet: Ipv4Net,
	server_vip: Ipv4Addr,
	inner: RwLock<Inner>,
}

impl SessionManager {
	/// Build the pool for `subnet`, excluding the network address, the
	/// broadcast address (both already excluded by [`Ipv4Net::hosts`]), and
	/// `server_vip` (the address the server itself occupies on the virtual
	/// interface).
	pub fn new(subnet: Ipv4Net, server_vip: Ipv4Addr) -> Self {
		let free: VecDeque<Ipv4Addr> = subnet.hosts().filter(|addr| *addr != server_vip).collect();
		Self {
			subnet,
			server_vip,
			inner: RwLock::new(Inner { free, sessions: HashMap::new() }),
		}
	}

	pub fn subnet(&self) -> Ipv4Net {
		self.subnet
	}

	pub fn server_vip(&self) -> Ipv4Addr {
		self.server_vip
	}

	/// Pop the next free address from the pool. FIFO order makes allocation
	/// deterministic for a given sequence of allocate/release calls, which
	/// is what the pool-integrity property test relies on.
	pub fn allocate(&self) -> Result<Ipv4Addr, SessionError> {
		let mut inner = self.inner.write();
		inner.free.pop_front().ok_or(SessionError::PoolExhausted)
	}

	/// Return an address to the pool. A no-op if the address isn't ours or
	/// is already free — callers hit this on teardown paths where exactly
	/// what state the address was last in is not always known locally.
	pub fn release(&self, vip: Ipv4Addr) {
		let mut inner = self.inner.write();
		if vip == self.server_vip {
			return;
		}
		if !self.subnet.contains(&vip) {
			return;
		}
		if inner.free.contains(&vip) {
			return;
		}
		inner.free.push_back(vip);
	}

	pub fn add_session(&self, vip: Ipv4Addr, conn: quinn::Connection) -> Result<(), SessionError> {
		let mut inner = self.inner.write();
		if inner.sessions.contains_key(&vip) {
			return Err(SessionError::AlreadyRegistered(vip));
		}
		inner.sessions.insert(vip, Session { vip, conn, created_at: Instant::now() });
		Ok(())
	}

	pub fn remove_session(&self, vip: Ipv4Addr) {
		self.inner.write().sessions.remove(&vip);
	}

	pub fn get_session(&self, vip: Ipv4Addr) -> Option<quinn::Connection> {
		self.inner.read().sessions.get(&vip).map(|s| s.conn.clone())
	}

	pub fn session_count(&self) -> usize {
		self.inner.read().sessions.len()
	}

	#[cfg(test)]
	fn free_count(&self) -> usize {
		self.inner.read().free.len()
	}
}
