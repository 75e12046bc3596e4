//! Connection parameters for target hosts and pool sizing.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_SESSIONS_PER_HOST: usize = 4;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SHELL: &str = "pwsh";

/// Opaque credential material. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for Secret {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Secret(***)")
	}
}

/// Remoting authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
	#[default]
	Negotiate,
	Kerberos,
	Basic,
	Credssp,
	Default,
}

impl AuthMethod {
	/// Value for `New-PSSession -Authentication`.
	pub fn as_powershell(self) -> &'static str {
		match self {
			AuthMethod::Negotiate => "Negotiate",
			AuthMethod::Kerberos => "Kerberos",
			AuthMethod::Basic => "Basic",
			AuthMethod::Credssp => "CredSSP",
			AuthMethod::Default => "Default",
		}
	}
}

/// One target host the pool may open sessions to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
	/// Pool key for this host.
	pub name: String,
	/// Network address passed to the remoting layer.
	pub address: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub port: Option<u16>,
	#[serde(default)]
	pub use_ssl: bool,
	#[serde(default)]
	pub authentication: AuthMethod,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,
	#[serde(default, skip_serializing)]
	pub password: Option<Secret>,
	/// Run scripts in the local PowerShell host instead of opening a remote session.
	#[serde(default)]
	pub local: bool,
	/// PowerShell executable used as the session host.
	#[serde(default = "default_shell")]
	pub shell: String,
}

impl HostConfig {
	pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			address: address.into(),
			port: None,
			use_ssl: false,
			authentication: AuthMethod::default(),
			username: None,
			password: None,
			local: false,
			shell: default_shell(),
		}
	}

	pub fn with_credentials(mut self, username: impl Into<String>, password: Secret) -> Self {
		self.username = Some(username.into());
		self.password = Some(password);
		self
	}

	pub fn with_port(mut self, port: u16) -> Self {
		self.port = Some(port);
		self
	}

	pub fn with_ssl(mut self, use_ssl: bool) -> Self {
		self.use_ssl = use_ssl;
		self
	}

	pub fn with_local(mut self, local: bool) -> Self {
		self.local = local;
		self
	}
}

fn default_shell() -> String {
	DEFAULT_SHELL.to_string()
}

/// Pool sizing and connection limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
	#[serde(default = "default_max_sessions")]
	pub max_sessions_per_host: usize,
	#[serde(default = "default_connect_timeout_ms")]
	pub connect_timeout_ms: u64,
}

impl PoolConfig {
	pub fn with_max_sessions(mut self, max: usize) -> Self {
		self.max_sessions_per_host = max;
		self
	}

	pub fn connect_timeout(&self) -> Duration {
		Duration::from_millis(self.connect_timeout_ms)
	}
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			max_sessions_per_host: DEFAULT_MAX_SESSIONS_PER_HOST,
			connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
		}
	}
}

fn default_max_sessions() -> usize {
	DEFAULT_MAX_SESSIONS_PER_HOST
}

fn default_connect_timeout_ms() -> u64 {
	DEFAULT_CONNECT_TIMEOUT_MS
}
