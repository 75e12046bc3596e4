//! Bounded per-host session pool.
//!
//! Each configured host gets a semaphore sized to
//! [`PoolConfig::max_sessions_per_host`] and an idle set. Acquisition takes a
//! permit (waiting up to the caller's timeout), then reuses an idle session or
//! connects a new one. The permit and the session travel together in a
//! [`PooledSession`] guard; dropping the guard returns a healthy session to
//! the idle set and releases the permit on every exit path. Broken sessions
//! are discarded on drop and replaced lazily by a later acquisition.
//!
//! The host table and idle sets are the only shared mutable state and are
//! guarded by short, non-async critical sections.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::classify::MarkerTable;
use crate::config::{HostConfig, PoolConfig};
use crate::error::{PoolError, TransportError};
use crate::session::{Session, SessionId};
use crate::transport::Connector;

struct HostSlot {
	target: HostConfig,
	capacity: usize,
	permits: Arc<Semaphore>,
	idle: Mutex<Vec<Session>>,
}

impl HostSlot {
	fn new(target: HostConfig, capacity: usize) -> Self {
		Self {
			target,
			capacity,
			permits: Arc::new(Semaphore::new(capacity)),
			idle: Mutex::new(Vec::new()),
		}
	}

	fn take_idle(&self) -> Option<Session> {
		let mut idle = self.idle.lock();
		while let Some(session) = idle.pop() {
			if !session.is_broken() {
				return Some(session);
			}
		}
		None
	}
}

struct PoolInner {
	connector: Arc<dyn Connector>,
	config: PoolConfig,
	markers: Arc<MarkerTable>,
	hosts: Mutex<HashMap<String, Arc<HostSlot>>>,
	next_session: AtomicU64,
}

/// Point-in-time view of one host's pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostStatus {
	pub host: String,
	pub capacity: usize,
	pub available: usize,
	pub idle: usize,
}

/// Shared handle to the session pool. Clones refer to the same pool.
#[derive(Clone)]
pub struct SessionPool {
	inner: Arc<PoolInner>,
}

impl SessionPool {
	pub fn new(connector: Arc<dyn Connector>, hosts: impl IntoIterator<Item = HostConfig>, config: PoolConfig, markers: MarkerTable) -> Self {
		let capacity = config.max_sessions_per_host.max(1);
		let hosts = hosts
			.into_iter()
			.map(|target| (target.name.clone(), Arc::new(HostSlot::new(target, capacity))))
			.collect();

		Self {
			inner: Arc::new(PoolInner {
				connector,
				config,
				markers: Arc::new(markers),
				hosts: Mutex::new(hosts),
				next_session: AtomicU64::new(1),
			}),
		}
	}

	pub fn config(&self) -> &PoolConfig {
		&self.inner.config
	}

	fn slot(&self, host: &str) -> Result<Arc<HostSlot>, PoolError> {
		let slot = self
			.inner
			.hosts
			.lock()
			.get(host)
			.cloned()
			.ok_or_else(|| PoolError::UnknownHost(host.to_string()))?;
		if slot.permits.is_closed() {
			return Err(PoolError::Closed);
		}
		Ok(slot)
	}

	/// Checks out a session for `host`, waiting at most `timeout` for capacity.
	pub async fn acquire(&self, host: &str, timeout: Duration) -> Result<PooledSession, PoolError> {
		let slot = self.slot(host)?;

		let permit = match tokio::time::timeout(timeout, Arc::clone(&slot.permits).acquire_owned()).await {
			Ok(Ok(permit)) => permit,
			Ok(Err(_)) => return Err(PoolError::Closed),
			Err(_) => {
				warn!(
					target = "dsctl.pool",
					host,
					capacity = slot.capacity,
					waited_ms = timeout.as_millis() as u64,
					"no session became available"
				);
				return Err(PoolError::Exhausted {
					host: host.to_string(),
					waited: timeout,
				});
			}
		};

		if let Some(session) = slot.take_idle() {
			debug!(target = "dsctl.pool", host, session = %session.id(), "reusing idle session");
			return Ok(PooledSession::new(session, slot, permit));
		}

		let session = self.connect(&slot).await?;
		Ok(PooledSession::new(session, slot, permit))
	}

	async fn connect(&self, slot: &HostSlot) -> Result<Session, PoolError> {
		let host = slot.target.name.as_str();
		let connect_timeout = self.inner.config.connect_timeout();
		let id = SessionId(self.inner.next_session.fetch_add(1, Ordering::SeqCst));

		let transport = match tokio::time::timeout(connect_timeout, self.inner.connector.connect(&slot.target)).await {
			Ok(Ok(transport)) => transport,
			Ok(Err(source)) => {
				warn!(target = "dsctl.pool", host, error = %source, "failed to open session");
				return Err(PoolError::ConnectFailed {
					host: host.to_string(),
					source,
				});
			}
			Err(_) => {
				warn!(target = "dsctl.pool", host, "session handshake timed out");
				return Err(PoolError::ConnectFailed {
					host: host.to_string(),
					source: TransportError::Handshake(format!("no handshake within {connect_timeout:?}")),
				});
			}
		};

		info!(target = "dsctl.pool", host, session = %id, "opened session");
		Ok(Session::new(id, host, transport, Arc::clone(&self.inner.markers)))
	}

	/// Opens up to `count` sessions ahead of demand. Returns how many are idle afterwards.
	pub async fn warm(&self, host: &str, count: usize, timeout: Duration) -> Result<usize, PoolError> {
		let slot = self.slot(host)?;
		let count = count.min(slot.capacity);
		let mut held = Vec::with_capacity(count);
		for _ in 0..count {
			held.push(self.acquire(host, timeout).await?);
		}
		drop(held);
		Ok(slot.idle.lock().len())
	}

	pub fn status(&self) -> Vec<HostStatus> {
		let hosts = self.inner.hosts.lock();
		let mut status: Vec<HostStatus> = hosts
			.iter()
			.map(|(name, slot)| HostStatus {
				host: name.clone(),
				capacity: slot.capacity,
				available: slot.permits.available_permits(),
				idle: slot.idle.lock().len(),
			})
			.collect();
		status.sort_by(|a, b| a.host.cmp(&b.host));
		status
	}

	/// Tears the pool down: idle sessions are dropped and waiters fail with [`PoolError::Closed`].
	///
	/// Sessions checked out at this point are dropped when their guards are.
	pub fn close(&self) {
		let slots: Vec<Arc<HostSlot>> = self.inner.hosts.lock().values().cloned().collect();
		for slot in slots {
			slot.permits.close();
			let idle = std::mem::take(&mut *slot.idle.lock());
			debug!(target = "dsctl.pool", host = %slot.target.name, dropped = idle.len(), "closing host pool");
		}
	}
}

/// A checked-out session. Derefs to [`Session`]; returns it to the pool on drop.
pub struct PooledSession {
	session: Option<Session>,
	slot: Arc<HostSlot>,
	_permit: OwnedSemaphorePermit,
}

impl PooledSession {
	fn new(session: Session, slot: Arc<HostSlot>, permit: OwnedSemaphorePermit) -> Self {
		Self {
			session: Some(session),
			slot,
			_permit: permit,
		}
	}

	/// Drops the session instead of returning it to the idle set.
	pub fn discard(mut self) {
		if let Some(session) = self.session.as_mut() {
			session.mark_broken("discarded by caller");
		}
	}
}

impl fmt::Debug for PooledSession {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("PooledSession").field(&self.session).finish()
	}
}

impl Deref for PooledSession {
	type Target = Session;

	fn deref(&self) -> &Session {
		self.session.as_ref().expect("session is present until the guard drops")
	}
}

impl DerefMut for PooledSession {
	fn deref_mut(&mut self) -> &mut Session {
		self.session.as_mut().expect("session is present until the guard drops")
	}
}

impl Drop for PooledSession {
	fn drop(&mut self) {
		let Some(session) = self.session.take() else {
			return;
		};

		if session.is_broken() {
			debug!(target = "dsctl.pool", host = %session.host(), session = %session.id(), "evicting broken session");
		} else if self.slot.permits.is_closed() {
			debug!(target = "dsctl.pool", host = %session.host(), session = %session.id(), "pool closed; dropping session");
		} else {
			self.slot.idle.lock().push(session);
		}
		// the permit field drops after this, so a waiter wakes to a populated idle set
	}
}
