use thiserror::Error;

use crate::output::ErrorCode;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Directory(#[from] dsctl::Error),

	#[error("invalid input: {0}")]
	InvalidInput(String),

	#[error("{0}")]
	Config(String),

	#[error("failed to encode result: {0}")]
	Encode(#[from] serde_json::Error),
}

impl CliError {
	pub fn code(&self) -> ErrorCode {
		match self {
			CliError::Directory(err) => ErrorCode::from_directory(err),
			CliError::InvalidInput(_) => ErrorCode::InvalidInput,
			CliError::Config(_) => ErrorCode::ConfigError,
			CliError::Encode(_) => ErrorCode::InternalError,
		}
	}
}

pub type Result<T> = std::result::Result<T, CliError>;
