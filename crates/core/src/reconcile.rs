//! Convergence of one directory object onto its desired state.
//!
//! A [`Reconciler`] drives one logical operation over one checked-out
//! executor. Every call re-reads current truth from the server; nothing is
//! cached between calls. Remote operations within a call are strictly
//! sequential, with a move always issued before any other mutation.
//!
//! Absence handling:
//! - read: absence is a value ([`Observed::Absent`])
//! - delete: absence is success ([`DeleteOutcome::AlreadyAbsent`])
//! - update: absence is [`Error::Drift`]
//! - create: an existing object is [`Error::Conflict`], never adopted

use std::time::Duration;

use dsctl_protocol::StructuredOutput;
use dsctl_runtime::{BoxFuture, PooledSession, RemoteError, Session};
use serde::Serialize;
use tracing::{debug, info};

use crate::dn::DistinguishedName;
use crate::error::{Error, ObjectRef, Result};
use crate::marshal::{self, DecodeError, Operation, Payload};
use crate::model::{DesiredState, DirectoryObject, ObjectGuid, ObjectKind, Observed};
use crate::plan::{self, Plan};

/// Runs payloads against a directory host.
///
/// Implemented for runtime sessions; tests substitute recording fakes.
pub trait Executor: Send {
	fn execute<'a>(&'a mut self, payload: &'a Payload, timeout: Duration) -> BoxFuture<'a, Result<StructuredOutput, RemoteError>>;
}

impl Executor for Session {
	fn execute<'a>(&'a mut self, payload: &'a Payload, timeout: Duration) -> BoxFuture<'a, Result<StructuredOutput, RemoteError>> {
		Box::pin(Session::execute(self, &payload.script, timeout))
	}
}

impl Executor for PooledSession {
	fn execute<'a>(&'a mut self, payload: &'a Payload, timeout: Duration) -> BoxFuture<'a, Result<StructuredOutput, RemoteError>> {
		let session: &'a mut Session = self;
		Box::pin(Session::execute(session, &payload.script, timeout))
	}
}

impl<E: Executor + ?Sized> Executor for &mut E {
	fn execute<'a>(&'a mut self, payload: &'a Payload, timeout: Duration) -> BoxFuture<'a, Result<StructuredOutput, RemoteError>> {
		(**self).execute(payload, timeout)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeleteOutcome {
	Deleted,
	AlreadyAbsent,
}

/// Result of a successful update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
	pub plan: Plan,
	/// Mutations issued, in order.
	pub applied: Vec<Operation>,
	/// The converged object, with its DN recomputed after any rename or move.
	pub object: DirectoryObject,
}

impl UpdateOutcome {
	pub fn changed(&self) -> bool {
		!self.applied.is_empty()
	}
}

/// How absence after a delete is confirmed.
///
/// A single NotFound can be a replication artifact, so absence is confirmed
/// only after `confirmations` consecutive NotFound lookups `interval` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsencePolicy {
	pub confirmations: u32,
	pub interval: Duration,
}

impl Default for AbsencePolicy {
	fn default() -> Self {
		Self {
			confirmations: 3,
			interval: Duration::from_secs(2),
		}
	}
}

enum Lookup {
	Present(DirectoryObject),
	Missing(String),
}

fn malformed(object: ObjectRef, err: DecodeError) -> Error {
	Error::Malformed {
		object,
		message: err.to_string(),
	}
}

/// Reconciles objects through one executor.
pub struct Reconciler<E> {
	executor: E,
	timeout: Duration,
}

impl<E: Executor> Reconciler<E> {
	/// `timeout` bounds each remote command individually.
	pub fn new(executor: E, timeout: Duration) -> Self {
		Self { executor, timeout }
	}

	pub fn executor(&self) -> &E {
		&self.executor
	}

	pub fn into_inner(self) -> E {
		self.executor
	}

	async fn run(&mut self, payload: &Payload) -> Result<StructuredOutput, RemoteError> {
		debug!(target = "dsctl.reconcile", op = payload.operation.name(), "issuing remote operation");
		self.executor.execute(payload, self.timeout).await
	}

	async fn lookup(&mut self, kind: ObjectKind, guid: ObjectGuid) -> Result<Lookup> {
		let object = ObjectRef::by_guid(kind, guid);
		match self.run(&marshal::encode_lookup_by_id(kind, &guid)).await {
			Ok(output) => marshal::decode(kind, &output)
				.map(Lookup::Present)
				.map_err(|err| malformed(object, err)),
			Err(err) if err.is_not_found() => Ok(Lookup::Missing(err.message)),
			Err(err) => Err(Error::remote(object, err)),
		}
	}

	/// Creates the object and returns it as the server reports it.
	pub async fn create(&mut self, desired: &DesiredState) -> Result<DirectoryObject> {
		let object = match desired.distinguished_name() {
			Some(dn) => ObjectRef::by_dn(desired.kind, dn),
			None => ObjectRef::named(desired.kind, &desired.name),
		};
		desired.validate().map_err(|reason| Error::InvalidDesiredState {
			object: object.clone(),
			reason,
		})?;

		let payload = marshal::encode_create(desired);
		let output = self.run(&payload).await.map_err(|err| Error::remote(object.clone(), err))?;
		let created = marshal::decode(desired.kind, &output).map_err(|err| malformed(object, err))?;

		info!(
			target = "dsctl.reconcile",
			kind = %created.kind,
			guid = %created.guid,
			dn = %created.distinguished_name,
			"created object"
		);
		Ok(created)
	}

	pub async fn read(&mut self, kind: ObjectKind, guid: ObjectGuid) -> Result<Observed> {
		match self.lookup(kind, guid).await? {
			Lookup::Present(object) => Ok(Observed::Present(object)),
			Lookup::Missing(_) => {
				debug!(target = "dsctl.reconcile", %kind, %guid, "object is absent");
				Ok(Observed::Absent)
			}
		}
	}

	/// Converges the object identified by `guid` onto `desired`.
	pub async fn update(&mut self, guid: ObjectGuid, desired: &DesiredState) -> Result<UpdateOutcome> {
		let kind = desired.kind;
		let object = ObjectRef::by_guid(kind, guid);
		desired.validate().map_err(|reason| Error::InvalidDesiredState {
			object: object.clone(),
			reason,
		})?;

		let current = match self.lookup(kind, guid).await? {
			Lookup::Present(current) => current,
			Lookup::Missing(message) => return Err(Error::Drift { object, message }),
		};

		let plan = plan::plan(&current, desired);
		let payloads = marshal::encode_update(kind, &guid, &plan);
		let mut applied = Vec::with_capacity(payloads.len());
		for payload in &payloads {
			match self.run(payload).await {
				Ok(_) => applied.push(payload.operation.clone()),
				// A missing move target is reported as such, not as the object vanishing.
				Err(err) if err.is_not_found() && matches!(payload.operation, Operation::Move { .. }) => {
					return Err(Error::NotFound {
						object: object.clone(),
						message: err.message,
					});
				}
				Err(err) if err.is_not_found() => {
					return Err(Error::Drift {
						object: object.clone(),
						message: err.message,
					});
				}
				Err(err) => return Err(Error::remote(object.clone(), err)),
			}
		}

		if applied.is_empty() {
			debug!(target = "dsctl.reconcile", %kind, %guid, "object already converged");
		} else {
			info!(
				target = "dsctl.reconcile",
				%kind,
				%guid,
				operations = applied.len(),
				"object updated"
			);
		}

		let converged = plan::expected_object(&current, desired, &plan);
		Ok(UpdateOutcome {
			plan,
			applied,
			object: converged,
		})
	}

	pub async fn delete(&mut self, kind: ObjectKind, guid: ObjectGuid) -> Result<DeleteOutcome> {
		let object = ObjectRef::by_guid(kind, guid);
		if let Lookup::Missing(_) = self.lookup(kind, guid).await? {
			debug!(target = "dsctl.reconcile", %kind, %guid, "object already absent");
			return Ok(DeleteOutcome::AlreadyAbsent);
		}

		match self.run(&marshal::encode_delete(kind, &guid)).await {
			Ok(_) => {
				info!(target = "dsctl.reconcile", %kind, %guid, "deleted object");
				Ok(DeleteOutcome::Deleted)
			}
			Err(err) if err.is_not_found() => Ok(DeleteOutcome::AlreadyAbsent),
			Err(err) => Err(Error::remote(object, err)),
		}
	}

	/// Looks an existing object up by DN, for adoption into management.
	pub async fn import_by_dn(&mut self, kind: ObjectKind, dn: &DistinguishedName) -> Result<DirectoryObject> {
		let object = ObjectRef::by_dn(kind, dn.clone());
		let output = self
			.run(&marshal::encode_lookup_by_dn(kind, dn))
			.await
			.map_err(|err| Error::remote(object.clone(), err))?;
		marshal::decode(kind, &output).map_err(|err| malformed(object, err))
	}

	/// Returns `true` once absence has been observed `policy.confirmations` times in a row.
	///
	/// A present object returns `false` immediately. Lookup failures are
	/// errors and never count as absence.
	pub async fn confirm_absent(&mut self, kind: ObjectKind, guid: ObjectGuid, policy: &AbsencePolicy) -> Result<bool> {
		let needed = policy.confirmations.max(1);
		let mut seen = 0;
		loop {
			match self.lookup(kind, guid).await? {
				Lookup::Present(_) => return Ok(false),
				Lookup::Missing(_) => {
					seen += 1;
					debug!(target = "dsctl.reconcile", %kind, %guid, seen, needed, "absence observed");
					if seen >= needed {
						return Ok(true);
					}
					tokio::time::sleep(policy.interval).await;
				}
			}
		}
	}
}
