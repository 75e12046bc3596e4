//! Script payloads executed on the remote host.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A PowerShell script payload.
///
/// Scripts are opaque text by the time they reach a session; rendering and
/// quoting happen in the marshaling layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Script(String);

impl Script {
	pub fn new(text: impl Into<String>) -> Self {
		Self(text.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_inner(self) -> String {
		self.0
	}

	/// Appends another statement on its own line.
	pub fn then(mut self, statement: impl AsRef<str>) -> Self {
		if !self.0.is_empty() {
			self.0.push('\n');
		}
		self.0.push_str(statement.as_ref());
		self
	}
}

impl fmt::Display for Script {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for Script {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

impl From<String> for Script {
	fn from(value: String) -> Self {
		Self(value)
	}
}
