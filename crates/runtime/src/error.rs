//! Error types for sessions, transports, and the session pool.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of the channel between this process and a session host.
#[derive(Debug, Error)]
pub enum TransportError {
	#[error("failed to spawn session host `{program}`: {source}")]
	Spawn {
		program: String,
		#[source]
		source: std::io::Error,
	},

	#[error("session host I/O failed: {0}")]
	Io(#[from] std::io::Error),

	#[error("session host closed the channel: {0}")]
	Closed(String),

	#[error("session handshake failed: {0}")]
	Handshake(String),

	#[error("invalid frame: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// Classified outcome of a failed remote command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
	/// The addressed object does not exist.
	NotFound,
	/// The object to create collides with an existing one.
	AlreadyExists,
	/// Connection, timeout, or server availability failure.
	Transient,
	/// Output did not have the expected shape.
	Malformed,
	/// Any other remote failure.
	Other,
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ErrorKind::NotFound => "not found",
			ErrorKind::AlreadyExists => "already exists",
			ErrorKind::Transient => "transient failure",
			ErrorKind::Malformed => "malformed output",
			ErrorKind::Other => "remote error",
		};
		f.write_str(name)
	}
}

/// A remote command failure with its verbatim message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
	pub kind: ErrorKind,
	pub message: String,
}

impl RemoteError {
	pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
		Self {
			kind,
			message: message.into(),
		}
	}

	pub fn not_found(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::NotFound, message)
	}

	pub fn already_exists(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::AlreadyExists, message)
	}

	pub fn transient(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::Transient, message)
	}

	pub fn malformed(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::Malformed, message)
	}

	pub fn other(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::Other, message)
	}

	pub fn is_not_found(&self) -> bool {
		self.kind == ErrorKind::NotFound
	}

	pub fn is_transient(&self) -> bool {
		self.kind == ErrorKind::Transient
	}
}

/// Session pool failures.
#[derive(Debug, Error)]
pub enum PoolError {
	#[error("no session available for {host} within {waited:?}")]
	Exhausted { host: String, waited: Duration },

	#[error("failed to open session to {host}: {source}")]
	ConnectFailed {
		host: String,
		#[source]
		source: TransportError,
	},

	#[error("host {0} is not configured")]
	UnknownHost(String),

	#[error("session pool is closed")]
	Closed,
}

pub type Result<T, E = RemoteError> = std::result::Result<T, E>;
