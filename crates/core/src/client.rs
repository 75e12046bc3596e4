//! High-level client: one pooled session checkout per operation.

use std::sync::Arc;
use std::time::Duration;

use dsctl_protocol::StructuredOutput;
use dsctl_runtime::{Connector, PooledSession, PwshConnector, SessionPool};
use tracing::debug;

use crate::config::ClientConfig;
use crate::dn::DistinguishedName;
use crate::error::{Error, Result};
use crate::marshal;
use crate::model::{DesiredState, DirectoryObject, ObjectGuid, ObjectKind, Observed};
use crate::reconcile::{AbsencePolicy, DeleteOutcome, Executor, Reconciler, UpdateOutcome};

/// Directory operations against one configured host.
///
/// Each call checks a session out of the pool for its duration and returns
/// it when the call finishes, on success and failure alike. `timeout: None`
/// uses the configured default; the timeout bounds the wait for a session and
/// each remote command of the call.
#[derive(Clone)]
pub struct DirectoryClient {
	pool: SessionPool,
	host: String,
	default_timeout: Duration,
	absence: AbsencePolicy,
}

impl DirectoryClient {
	pub fn new(pool: SessionPool, host: impl Into<String>, default_timeout: Duration, absence: AbsencePolicy) -> Self {
		Self {
			pool,
			host: host.into(),
			default_timeout,
			absence,
		}
	}

	/// Client over PowerShell remoting sessions.
	pub fn from_config(config: &ClientConfig) -> Result<Self> {
		Self::with_connector(config, Arc::new(PwshConnector::new()))
	}

	pub fn with_connector(config: &ClientConfig, connector: Arc<dyn Connector>) -> Result<Self> {
		config.validate()?;
		let host = config
			.default_host_name()
			.ok_or_else(|| Error::Config("no host configured".to_string()))?
			.to_string();
		let pool = SessionPool::new(connector, config.hosts.iter().cloned(), config.pool.clone(), config.marker_table());
		Ok(Self::new(pool, host, config.default_timeout(), config.absence_policy()))
	}

	/// Same pool, different target host.
	pub fn for_host(&self, host: impl Into<String>) -> Self {
		Self {
			host: host.into(),
			..self.clone()
		}
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn pool(&self) -> &SessionPool {
		&self.pool
	}

	pub fn absence_policy(&self) -> AbsencePolicy {
		self.absence
	}

	async fn checkout(&self, timeout: Duration) -> Result<PooledSession> {
		let session = self.pool.acquire(&self.host, timeout).await?;
		debug!(target = "dsctl.client", host = %self.host, session = %session.id(), "checked out session");
		Ok(session)
	}

	async fn reconciler(&self, timeout: Option<Duration>) -> Result<Reconciler<PooledSession>> {
		let timeout = timeout.unwrap_or(self.default_timeout);
		Ok(Reconciler::new(self.checkout(timeout).await?, timeout))
	}

	/// Creates the object and returns it as the server reports it.
	pub async fn create_object(&self, desired: &DesiredState, timeout: Option<Duration>) -> Result<DirectoryObject> {
		self.reconciler(timeout).await?.create(desired).await
	}

	pub async fn create(&self, desired: &DesiredState, timeout: Option<Duration>) -> Result<ObjectGuid> {
		Ok(self.create_object(desired, timeout).await?.guid)
	}

	pub async fn read(&self, kind: ObjectKind, guid: ObjectGuid, timeout: Option<Duration>) -> Result<Observed> {
		self.reconciler(timeout).await?.read(kind, guid).await
	}

	pub async fn update(&self, guid: ObjectGuid, desired: &DesiredState, timeout: Option<Duration>) -> Result<UpdateOutcome> {
		self.reconciler(timeout).await?.update(guid, desired).await
	}

	pub async fn delete(&self, kind: ObjectKind, guid: ObjectGuid, timeout: Option<Duration>) -> Result<DeleteOutcome> {
		self.reconciler(timeout).await?.delete(kind, guid).await
	}

	pub async fn import_by_dn(&self, kind: ObjectKind, dn: &DistinguishedName, timeout: Option<Duration>) -> Result<DirectoryObject> {
		self.reconciler(timeout).await?.import_by_dn(kind, dn).await
	}

	/// Confirms absence using the configured [`AbsencePolicy`].
	pub async fn confirm_absent(&self, kind: ObjectKind, guid: ObjectGuid, timeout: Option<Duration>) -> Result<bool> {
		let policy = self.absence;
		self.reconciler(timeout).await?.confirm_absent(kind, guid, &policy).await
	}

	/// Opens (or reuses) a session and asks it which domain it reaches.
	pub async fn ping(&self, timeout: Option<Duration>) -> Result<StructuredOutput> {
		let timeout = timeout.unwrap_or(self.default_timeout);
		let mut session = self.checkout(timeout).await?;
		let payload = marshal::encode_ping();
		Executor::execute(&mut session, &payload, timeout).await.map_err(|source| Error::Ping {
			host: self.host.clone(),
			source,
		})
	}

	/// Drops idle sessions and fails pending checkouts.
	pub fn close(&self) {
		self.pool.close();
	}
}
