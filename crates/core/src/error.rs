use std::fmt;
use std::time::Duration;

use dsctl_runtime::{ErrorKind, PoolError, RemoteError};
use serde::Serialize;
use thiserror::Error;

use crate::dn::DistinguishedName;
use crate::model::{ObjectGuid, ObjectKind, ValidationError};

/// The object an error is about, as far as it is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
	pub kind: ObjectKind,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub guid: Option<ObjectGuid>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub distinguished_name: Option<DistinguishedName>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}

impl ObjectRef {
	pub fn new(kind: ObjectKind) -> Self {
		Self {
			kind,
			guid: None,
			distinguished_name: None,
			name: None,
		}
	}

	pub fn by_guid(kind: ObjectKind, guid: ObjectGuid) -> Self {
		Self {
			guid: Some(guid),
			..Self::new(kind)
		}
	}

	pub fn by_dn(kind: ObjectKind, dn: DistinguishedName) -> Self {
		Self {
			distinguished_name: Some(dn),
			..Self::new(kind)
		}
	}

	pub fn named(kind: ObjectKind, name: impl Into<String>) -> Self {
		Self {
			name: Some(name.into()),
			..Self::new(kind)
		}
	}
}

impl fmt::Display for ObjectRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match (&self.guid, &self.distinguished_name, &self.name) {
			(Some(guid), _, _) => write!(f, "{} {guid}", self.kind),
			(None, Some(dn), _) => write!(f, "{} '{dn}'", self.kind),
			(None, None, Some(name)) => write!(f, "{} '{name}'", self.kind),
			(None, None, None) => write!(f, "{}", self.kind),
		}
	}
}

/// Errors from directory operations.
///
/// Object-level variants carry the object reference and the remote message
/// verbatim. Transient failures are never retried here; callers that own a
/// retry loop should check [`Error::is_transient`].
#[derive(Debug, Error)]
pub enum Error {
	#[error("no session available for {host} within {waited:?}")]
	PoolExhausted { host: String, waited: Duration },

	#[error("failed to open session to {host}: {message}")]
	ConnectFailed { host: String, message: String },

	#[error("host {0} is not configured")]
	UnknownHost(String),

	#[error("session pool is closed")]
	PoolClosed,

	#[error("{object}: transient failure: {message}")]
	Transient { object: ObjectRef, message: String },

	#[error("{object}: not found: {message}")]
	NotFound { object: ObjectRef, message: String },

	#[error("{object}: malformed output: {message}")]
	Malformed { object: ObjectRef, message: String },

	#[error("{object}: conflicts with an existing object: {message}")]
	Conflict { object: ObjectRef, message: String },

	#[error("{object}: no longer exists on the server: {message}")]
	Drift { object: ObjectRef, message: String },

	#[error("{object}: {message}")]
	Remote { object: ObjectRef, message: String },

	#[error("{object}: invalid desired state: {reason}")]
	InvalidDesiredState { object: ObjectRef, reason: ValidationError },

	#[error("connectivity check against {host} failed: {source}")]
	Ping {
		host: String,
		#[source]
		source: RemoteError,
	},

	#[error("configuration error: {0}")]
	Config(String),
}

impl Error {
	/// Maps a classified remote failure onto `object` without domain recovery.
	pub fn remote(object: ObjectRef, err: RemoteError) -> Self {
		let RemoteError { kind, message } = err;
		match kind {
			ErrorKind::NotFound => Error::NotFound { object, message },
			ErrorKind::AlreadyExists => Error::Conflict { object, message },
			ErrorKind::Transient => Error::Transient { object, message },
			ErrorKind::Malformed => Error::Malformed { object, message },
			ErrorKind::Other => Error::Remote { object, message },
		}
	}

	pub fn is_transient(&self) -> bool {
		match self {
			Error::Transient { .. } | Error::PoolExhausted { .. } | Error::ConnectFailed { .. } => true,
			Error::Ping { source, .. } => source.is_transient(),
			_ => false,
		}
	}

	pub fn is_not_found(&self) -> bool {
		matches!(self, Error::NotFound { .. })
	}

	pub fn is_conflict(&self) -> bool {
		matches!(self, Error::Conflict { .. })
	}

	pub fn is_drift(&self) -> bool {
		matches!(self, Error::Drift { .. })
	}

	pub fn object(&self) -> Option<&ObjectRef> {
		match self {
			Error::Transient { object, .. }
			| Error::NotFound { object, .. }
			| Error::Malformed { object, .. }
			| Error::Conflict { object, .. }
			| Error::Drift { object, .. }
			| Error::Remote { object, .. }
			| Error::InvalidDesiredState { object, .. } => Some(object),
			_ => None,
		}
	}
}

impl From<PoolError> for Error {
	fn from(err: PoolError) -> Self {
		match err {
			PoolError::Exhausted { host, waited } => Error::PoolExhausted { host, waited },
			PoolError::ConnectFailed { host, source } => Error::ConnectFailed {
				host,
				message: source.to_string(),
			},
			PoolError::UnknownHost(host) => Error::UnknownHost(host),
			PoolError::Closed => Error::PoolClosed,
		}
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
