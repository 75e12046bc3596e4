//! Remote command execution over a session.
//!
//! This layer frames a script, sends it, waits for the correlated response,
//! and turns the outcome into structured output or a classified
//! [`RemoteError`]. It performs no retries and keeps no state beyond the
//! session's request counter and broken flag.
//!
//! Outcomes:
//! - transport failure or deadline expiry: `Transient`, session broken
//! - response id mismatch: `Malformed`, session broken
//! - records that are not attribute/value objects: `Malformed`
//! - remote fault: classified by the session's [`MarkerTable`](crate::classify::MarkerTable)

use std::time::{Duration, Instant};

use dsctl_protocol::{Fault, Request, Script, StructuredOutput};
use tracing::{debug, trace};

use crate::error::{RemoteError, Result};
use crate::session::Session;

impl Session {
	/// Executes `script` on the remote host, waiting at most `timeout`.
	pub async fn execute(&mut self, script: &Script, timeout: Duration) -> Result<StructuredOutput> {
		if self.broken {
			return Err(RemoteError::transient(format!("session {} to {} is no longer usable", self.id, self.host)));
		}

		let id = self.next_request;
		self.next_request += 1;
		trace!(
			target = "dsctl.command",
			session = %self.id,
			host = %self.host,
			request = id,
			bytes = script.as_str().len(),
			"sending script"
		);

		let started = Instant::now();
		let response = match tokio::time::timeout(timeout, self.transport.send(Request::new(id, script))).await {
			Ok(Ok(response)) => response,
			Ok(Err(err)) => {
				let message = err.to_string();
				self.mark_broken(&message);
				return Err(RemoteError::transient(message));
			}
			Err(_) => {
				self.mark_broken("deadline elapsed");
				return Err(RemoteError::transient(format!("remote command did not complete within {timeout:?}")));
			}
		};
		self.executed += 1;

		if response.id != id {
			self.mark_broken("response id mismatch");
			return Err(RemoteError::malformed(format!(
				"response id {} does not match request id {id}",
				response.id
			)));
		}

		if response.ok {
			let output = StructuredOutput::from_value(response.records).map_err(|err| RemoteError::malformed(err.to_string()))?;
			debug!(
				target = "dsctl.command",
				session = %self.id,
				request = id,
				records = output.len(),
				elapsed_ms = started.elapsed().as_millis() as u64,
				"script completed"
			);
			return Ok(output);
		}

		let fault = response
			.fault
			.unwrap_or_else(|| Fault::new("remote command failed without reporting a fault"));
		let classification = self.markers.classify(&fault);
		if classification.breaks_session {
			self.mark_broken(&fault.message);
		}
		debug!(
			target = "dsctl.command",
			session = %self.id,
			request = id,
			kind = %classification.kind,
			message = %fault.message,
			"script failed"
		);
		Err(RemoteError::new(classification.kind, fault.message))
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use serde_json::json;

	use super::*;
	use crate::classify::MarkerTable;
	use crate::config::HostConfig;
	use crate::error::ErrorKind;
	use crate::fake::{FakeConnector, FakeReply};
	use crate::session::SessionId;
	use crate::transport::Connector;

	async fn session_with(fake: &FakeConnector) -> Session {
		let host = HostConfig::new("dc1", "dc1.example.com");
		let transport = fake.connect(&host).await.unwrap();
		Session::new(SessionId(1), "dc1", transport, Arc::new(MarkerTable::active_directory()))
	}

	const TIMEOUT: Duration = Duration::from_secs(5);

	#[tokio::test]
	async fn success_returns_records() {
		let fake = FakeConnector::new(|_| FakeReply::Records(json!([{"Name": "WS01"}, {"Name": "WS02"}])));
		let mut session = session_with(&fake).await;

		let output = session.execute(&Script::new("Get-ADComputer -Filter *"), TIMEOUT).await.unwrap();
		assert_eq!(output.len(), 2);
		assert_eq!(session.executed(), 1);
		assert!(!session.is_broken());
	}

	#[tokio::test]
	async fn fault_is_classified_and_message_kept_verbatim() {
		let message = "Cannot find an object with identity: 'x' under: 'DC=example,DC=com'.";
		let fake = FakeConnector::new(move |_| FakeReply::Fault(Fault::new(message).with_category("ObjectNotFound")));
		let mut session = session_with(&fake).await;

		let err = session.execute(&Script::new("Get-ADComputer -Identity 'x'"), TIMEOUT).await.unwrap_err();
		assert_eq!(err.kind, ErrorKind::NotFound);
		assert_eq!(err.message, message);
		assert!(!session.is_broken());
	}

	#[tokio::test]
	async fn remoting_fault_breaks_session() {
		let fake = FakeConnector::new(|_| FakeReply::Fault(Fault::new("The I/O operation has been aborted").with_error_id("PSRemotingTransportException")));
		let mut session = session_with(&fake).await;

		let err = session.execute(&Script::new("Get-Date"), TIMEOUT).await.unwrap_err();
		assert_eq!(err.kind, ErrorKind::Transient);
		assert!(session.is_broken());
	}

	#[tokio::test]
	async fn deadline_yields_transient_and_breaks_session() {
		let fake = FakeConnector::new(|_| FakeReply::Hang);
		let mut session = session_with(&fake).await;

		let err = session.execute(&Script::new("Start-Sleep 600"), Duration::from_millis(50)).await.unwrap_err();
		assert_eq!(err.kind, ErrorKind::Transient);
		assert!(err.message.contains("did not complete"));
		assert!(session.is_broken());
	}

	#[tokio::test]
	async fn broken_session_refuses_further_scripts() {
		let fake = FakeConnector::new(|_| FakeReply::Disconnect("pipe closed".to_string()));
		let mut session = session_with(&fake).await;

		let err = session.execute(&Script::new("Get-Date"), TIMEOUT).await.unwrap_err();
		assert_eq!(err.kind, ErrorKind::Transient);
		assert!(session.is_broken());

		let err = session.execute(&Script::new("Get-Date"), TIMEOUT).await.unwrap_err();
		assert_eq!(err.kind, ErrorKind::Transient);
		assert_eq!(fake.calls().len(), 1, "broken session must not reach the transport");
	}

	#[tokio::test]
	async fn mismatched_response_id_is_malformed() {
		let fake = FakeConnector::new(|_| FakeReply::WrongId);
		let mut session = session_with(&fake).await;

		let err = session.execute(&Script::new("Get-Date"), TIMEOUT).await.unwrap_err();
		assert_eq!(err.kind, ErrorKind::Malformed);
		assert!(session.is_broken());
	}

	#[tokio::test]
	async fn scalar_records_are_malformed_but_session_survives() {
		let fake = FakeConnector::new(|_| FakeReply::Records(json!(42)));
		let mut session = session_with(&fake).await;

		let err = session.execute(&Script::new("1 + 41"), TIMEOUT).await.unwrap_err();
		assert_eq!(err.kind, ErrorKind::Malformed);
		assert!(!session.is_broken());
	}
}
