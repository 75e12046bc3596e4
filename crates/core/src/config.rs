//! Client configuration file.
//!
//! ```json
//! {
//!   "defaultHost": "dc1",
//!   "hosts": [{ "name": "dc1", "address": "dc1.example.com", "useSsl": true }],
//!   "pool": { "maxSessionsPerHost": 4, "connectTimeoutMs": 30000 },
//!   "defaultTimeoutMs": 30000,
//!   "absence": { "confirmations": 3, "intervalMs": 2000 },
//!   "markers": [{ "pattern": "No such object", "kind": "notFound" }]
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use dsctl_runtime::{HostConfig, Marker, MarkerTable, PoolConfig, Secret};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::DEFAULT_TIMEOUT_MS;
use crate::error::{Error, Result};
use crate::reconcile::AbsencePolicy;

pub const PASSWORD_ENV: &str = "DSCTL_PASSWORD";
pub const USERNAME_ENV: &str = "DSCTL_USERNAME";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsenceConfig {
	#[serde(default = "default_confirmations")]
	pub confirmations: u32,
	#[serde(default = "default_interval_ms")]
	pub interval_ms: u64,
}

impl Default for AbsenceConfig {
	fn default() -> Self {
		Self {
			confirmations: default_confirmations(),
			interval_ms: default_interval_ms(),
		}
	}
}

impl From<&AbsenceConfig> for AbsencePolicy {
	fn from(config: &AbsenceConfig) -> Self {
		AbsencePolicy {
			confirmations: config.confirmations,
			interval: Duration::from_millis(config.interval_ms),
		}
	}
}

fn default_confirmations() -> u32 {
	AbsencePolicy::default().confirmations
}

fn default_interval_ms() -> u64 {
	AbsencePolicy::default().interval.as_millis() as u64
}

fn default_timeout_ms() -> u64 {
	DEFAULT_TIMEOUT_MS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
	/// Host used when a command does not name one. Defaults to the first host.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default_host: Option<String>,
	pub hosts: Vec<HostConfig>,
	#[serde(default)]
	pub pool: PoolConfig,
	#[serde(default = "default_timeout_ms")]
	pub default_timeout_ms: u64,
	#[serde(default)]
	pub absence: AbsenceConfig,
	/// Extra classification markers, consulted before the built-in table.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub markers: Vec<Marker>,
}

impl ClientConfig {
	/// Single-host configuration with defaults everywhere else.
	pub fn for_host(host: HostConfig) -> Self {
		Self {
			default_host: Some(host.name.clone()),
			hosts: vec![host],
			pool: PoolConfig::default(),
			default_timeout_ms: DEFAULT_TIMEOUT_MS,
			absence: AbsenceConfig::default(),
			markers: Vec::new(),
		}
	}

	pub fn from_json(text: &str) -> Result<Self> {
		serde_json::from_str(text).map_err(|err| Error::Config(format!("invalid configuration: {err}")))
	}

	/// Reads, applies environment overrides, and validates.
	pub fn load(path: &Path) -> Result<Self> {
		Self::load_for_host(path, None, |name| std::env::var(name).ok())
	}

	/// Like [`load`](Self::load), but selects `host` as the default before the
	/// environment credentials are applied, so they land on the host in use.
	pub fn load_for_host(path: &Path, host: Option<&str>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
		let text = std::fs::read_to_string(path).map_err(|err| Error::Config(format!("cannot read {}: {err}", path.display())))?;
		let mut config = Self::from_json(&text)?;
		if let Some(host) = host {
			config.default_host = Some(host.to_string());
		}
		config.apply_env(lookup);
		config.validate()?;
		debug!(target = "dsctl.client", path = %path.display(), hosts = config.hosts.len(), "loaded configuration");
		Ok(config)
	}

	/// Applies `DSCTL_USERNAME` / `DSCTL_PASSWORD` to the default host.
	pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
		let Some(name) = self.default_host_name().map(str::to_string) else {
			return;
		};
		let Some(host) = self.hosts.iter_mut().find(|host| host.name == name) else {
			return;
		};
		if let Some(username) = lookup(USERNAME_ENV).filter(|value| !value.is_empty()) {
			host.username = Some(username);
		}
		if let Some(password) = lookup(PASSWORD_ENV).filter(|value| !value.is_empty()) {
			host.password = Some(Secret::new(password));
		}
	}

	pub fn validate(&self) -> Result<()> {
		if self.hosts.is_empty() {
			return Err(Error::Config("at least one host must be configured".to_string()));
		}
		for (index, host) in self.hosts.iter().enumerate() {
			if host.name.trim().is_empty() || host.address.trim().is_empty() {
				return Err(Error::Config(format!("host #{index} needs a name and an address")));
			}
			if self.hosts[..index].iter().any(|other| other.name == host.name) {
				return Err(Error::Config(format!("host {} is configured twice", host.name)));
			}
		}
		if let Some(name) = &self.default_host {
			if !self.hosts.iter().any(|host| &host.name == name) {
				return Err(Error::Config(format!("default host {name} is not among the configured hosts")));
			}
		}
		if self.pool.max_sessions_per_host == 0 {
			return Err(Error::Config("pool.maxSessionsPerHost must be at least 1".to_string()));
		}
		if self.default_timeout_ms == 0 {
			return Err(Error::Config("defaultTimeoutMs must be greater than zero".to_string()));
		}
		Ok(())
	}

	pub fn default_host_name(&self) -> Option<&str> {
		self.default_host
			.as_deref()
			.or_else(|| self.hosts.first().map(|host| host.name.as_str()))
	}

	pub fn default_timeout(&self) -> Duration {
		Duration::from_millis(self.default_timeout_ms)
	}

	pub fn absence_policy(&self) -> AbsencePolicy {
		AbsencePolicy::from(&self.absence)
	}

	pub fn marker_table(&self) -> MarkerTable {
		MarkerTable::active_directory().with_overrides(self.markers.iter().cloned())
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;
	use std::io::Write;

	use dsctl_protocol::Fault;
	use dsctl_runtime::ErrorKind;

	use super::*;

	const SAMPLE: &str = r#"{
		"defaultHost": "dc2",
		"hosts": [
			{ "name": "dc1", "address": "dc1.example.com" },
			{ "name": "dc2", "address": "dc2.example.com", "port": 5986, "useSsl": true, "username": "EXAMPLE\\svc" }
		],
		"pool": { "maxSessionsPerHost": 2 },
		"absence": { "confirmations": 5 },
		"markers": [{ "pattern": "No such object", "kind": "notFound" }]
	}"#;

	#[test]
	fn sample_parses_with_defaults() {
		let config = ClientConfig::from_json(SAMPLE).unwrap();
		config.validate().unwrap();
		assert_eq!(config.default_host_name(), Some("dc2"));
		assert_eq!(config.pool.max_sessions_per_host, 2);
		assert_eq!(config.pool.connect_timeout(), Duration::from_secs(30));
		assert_eq!(config.default_timeout(), Duration::from_secs(30));
		assert_eq!(config.absence_policy().confirmations, 5);
		assert_eq!(config.absence_policy().interval, Duration::from_secs(2));
	}

	#[test]
	fn configured_markers_take_precedence() {
		let config = ClientConfig::from_json(SAMPLE).unwrap();
		let table = config.marker_table();
		assert_eq!(table.classify(&Fault::new("ldap: No such object (32)")).kind, ErrorKind::NotFound);
		assert_eq!(table.markers()[0].pattern, "No such object");
	}

	#[test]
	fn environment_credentials_apply_to_default_host_only() {
		let mut config = ClientConfig::from_json(SAMPLE).unwrap();
		let env = HashMap::from([(PASSWORD_ENV, "hunter2"), (USERNAME_ENV, "EXAMPLE\\ops")]);
		config.apply_env(|name| env.get(name).map(|value| value.to_string()));

		let dc2 = &config.hosts[1];
		assert_eq!(dc2.username.as_deref(), Some("EXAMPLE\\ops"));
		assert_eq!(dc2.password.as_ref().map(Secret::expose), Some("hunter2"));
		assert!(config.hosts[0].password.is_none());
	}

	#[test]
	fn validation_catches_bad_host_tables() {
		let mut config = ClientConfig::from_json(SAMPLE).unwrap();
		config.default_host = Some("dc9".to_string());
		assert!(matches!(config.validate(), Err(Error::Config(msg)) if msg.contains("dc9")));

		let empty = ClientConfig::from_json(r#"{"hosts": []}"#).unwrap();
		assert!(empty.validate().is_err());

		let twice = ClientConfig::from_json(r#"{"hosts": [{"name": "a", "address": "x"}, {"name": "a", "address": "y"}]}"#).unwrap();
		assert!(twice.validate().is_err());

		let mut zero = ClientConfig::from_json(SAMPLE).unwrap();
		zero.pool.max_sessions_per_host = 0;
		assert!(zero.validate().is_err());
	}

	#[test]
	fn load_reads_file_from_disk() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(SAMPLE.as_bytes()).unwrap();
		let config = ClientConfig::load(file.path()).unwrap();
		assert_eq!(config.hosts.len(), 2);

		let missing = ClientConfig::load(Path::new("/nonexistent/dsctl/config.json")).unwrap_err();
		assert!(matches!(missing, Error::Config(_)));
	}

	#[test]
	fn selected_host_receives_environment_credentials() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(SAMPLE.as_bytes()).unwrap();
		let env = HashMap::from([(PASSWORD_ENV, "hunter2")]);

		let config = ClientConfig::load_for_host(file.path(), Some("dc1"), |name| env.get(name).map(|value| value.to_string())).unwrap();
		assert_eq!(config.default_host_name(), Some("dc1"));
		assert_eq!(config.hosts[0].password.as_ref().map(Secret::expose), Some("hunter2"));
		assert!(config.hosts[1].password.is_none());

		let unknown = ClientConfig::load_for_host(file.path(), Some("dc9"), |_| None).unwrap_err();
		assert!(matches!(unknown, Error::Config(msg) if msg.contains("dc9")));
	}
}
