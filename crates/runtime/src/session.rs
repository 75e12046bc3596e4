//! Authenticated session handles.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::classify::MarkerTable;
use crate::transport::Transport;

/// Process-unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "s{}", self.0)
	}
}

/// One authenticated channel to a target host.
///
/// Sessions are owned by the pool while idle and by exactly one caller while
/// checked out. A session marked broken is never handed out again.
pub struct Session {
	pub(crate) id: SessionId,
	pub(crate) host: String,
	pub(crate) transport: Box<dyn Transport>,
	pub(crate) markers: Arc<MarkerTable>,
	pub(crate) next_request: u64,
	pub(crate) broken: bool,
	pub(crate) executed: u64,
}

impl Session {
	pub fn new(id: SessionId, host: impl Into<String>, transport: Box<dyn Transport>, markers: Arc<MarkerTable>) -> Self {
		Self {
			id,
			host: host.into(),
			transport,
			markers,
			// id 0 is the readiness frame
			next_request: 1,
			broken: false,
			executed: 0,
		}
	}

	pub fn id(&self) -> SessionId {
		self.id
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn is_broken(&self) -> bool {
		self.broken
	}

	/// Number of requests that received a response on this session.
	pub fn executed(&self) -> u64 {
		self.executed
	}

	/// Marks the transport unusable; the pool discards the session on release.
	pub fn mark_broken(&mut self, reason: &str) {
		if !self.broken {
			warn!(
				target = "dsctl.command",
				session = %self.id,
				host = %self.host,
				reason,
				"session marked broken"
			);
		}
		self.broken = true;
	}
}

impl fmt::Debug for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session")
			.field("id", &self.id)
			.field("host", &self.host)
			.field("broken", &self.broken)
			.field("executed", &self.executed)
			.finish_non_exhaustive()
	}
}
