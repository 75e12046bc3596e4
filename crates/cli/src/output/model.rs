use serde::{Deserialize, Serialize};

/// The result envelope returned by all commands.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T: Serialize> {
	pub ok: bool,
	pub command: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub host: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub duration_ms: Option<u64>,
}

/// Error information for failed commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,
	pub message: String,
	/// Whether the same call may succeed if repeated.
	pub retryable: bool,
}

/// Standardized error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	NotFound,
	Conflict,
	Drift,
	Transient,
	Malformed,
	PoolExhausted,
	ConnectFailed,
	UnknownHost,
	RemoteError,
	InvalidInput,
	ConfigError,
	InternalError,
}

impl ErrorCode {
	pub fn from_directory(err: &dsctl::Error) -> Self {
		use dsctl::Error;

		match err {
			Error::PoolExhausted { .. } => ErrorCode::PoolExhausted,
			Error::ConnectFailed { .. } => ErrorCode::ConnectFailed,
			Error::UnknownHost(_) => ErrorCode::UnknownHost,
			Error::PoolClosed => ErrorCode::InternalError,
			Error::Transient { .. } => ErrorCode::Transient,
			Error::NotFound { .. } => ErrorCode::NotFound,
			Error::Malformed { .. } => ErrorCode::Malformed,
			Error::Conflict { .. } => ErrorCode::Conflict,
			Error::Drift { .. } => ErrorCode::Drift,
			Error::Remote { .. } => ErrorCode::RemoteError,
			Error::InvalidDesiredState { .. } => ErrorCode::InvalidInput,
			Error::Ping { source, .. } if source.is_transient() => ErrorCode::Transient,
			Error::Ping { .. } => ErrorCode::RemoteError,
			Error::Config(_) => ErrorCode::ConfigError,
		}
	}

	pub fn is_retryable(self) -> bool {
		matches!(self, ErrorCode::Transient | ErrorCode::PoolExhausted | ErrorCode::ConnectFailed)
	}
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let text = match self {
			ErrorCode::NotFound => "NOT_FOUND",
			ErrorCode::Conflict => "CONFLICT",
			ErrorCode::Drift => "DRIFT",
			ErrorCode::Transient => "TRANSIENT",
			ErrorCode::Malformed => "MALFORMED",
			ErrorCode::PoolExhausted => "POOL_EXHAUSTED",
			ErrorCode::ConnectFailed => "CONNECT_FAILED",
			ErrorCode::UnknownHost => "UNKNOWN_HOST",
			ErrorCode::RemoteError => "REMOTE_ERROR",
			ErrorCode::InvalidInput => "INVALID_INPUT",
			ErrorCode::ConfigError => "CONFIG_ERROR",
			ErrorCode::InternalError => "INTERNAL_ERROR",
		};
		f.write_str(text)
	}
}
