//! In-memory connector for testing sessions, the pool, and anything above them.
//!
//! A [`FakeConnector`] answers every script with whatever its handler
//! returns, records every call, and can be told to fail upcoming connects.
//! Clones share state, so a test keeps one handle for assertions and gives
//! another to the pool.
//!
//! # Example
//!
//! ```ignore
//! let fake = FakeConnector::new(|call| {
//!     if call.script.as_str().contains("Get-ADComputer") {
//!         FakeReply::Fault(Fault::new("Cannot find an object with identity"))
//!     } else {
//!         FakeReply::Records(json!([]))
//!     }
//! });
//! let pool = SessionPool::new(Arc::new(fake.clone()), [host], PoolConfig::default(), MarkerTable::default());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dsctl_protocol::{Fault, Request, Response, Script};
use parking_lot::Mutex;
use serde_json::Value;

use crate::config::HostConfig;
use crate::error::TransportError;
use crate::transport::{BoxFuture, Connector, Transport};

/// How the fake host answers one script.
#[derive(Debug, Clone)]
pub enum FakeReply {
	/// Success with the given `records` value.
	Records(Value),
	/// Failure with the given fault.
	Fault(Fault),
	/// Never answers.
	Hang,
	/// The channel drops.
	Disconnect(String),
	/// Answers with a response id that does not match the request.
	WrongId,
}

/// One script received by the fake host.
#[derive(Debug, Clone)]
pub struct FakeCall {
	pub host: String,
	/// Ordinal of the transport that carried the call (1-based, in connect order).
	pub connection: u64,
	pub script: Script,
}

type Handler = dyn Fn(&FakeCall) -> FakeReply + Send + Sync;

#[derive(Default)]
struct FakeState {
	connects: AtomicU64,
	failing_connects: AtomicUsize,
	calls: Mutex<Vec<FakeCall>>,
}

/// Connector whose transports are answered by a handler closure.
#[derive(Clone)]
pub struct FakeConnector {
	handler: Arc<Handler>,
	state: Arc<FakeState>,
}

impl FakeConnector {
	pub fn new(handler: impl Fn(&FakeCall) -> FakeReply + Send + Sync + 'static) -> Self {
		Self {
			handler: Arc::new(handler),
			state: Arc::new(FakeState::default()),
		}
	}

	/// Answers every script with empty output.
	pub fn empty() -> Self {
		Self::new(|_| FakeReply::Records(Value::Null))
	}

	/// Makes the next `count` connects fail with a handshake error.
	pub fn fail_next_connects(&self, count: usize) {
		self.state.failing_connects.store(count, Ordering::SeqCst);
	}

	/// Number of successful connects so far.
	pub fn connects(&self) -> u64 {
		self.state.connects.load(Ordering::SeqCst)
	}

	pub fn calls(&self) -> Vec<FakeCall> {
		self.state.calls.lock().clone()
	}

	pub fn scripts(&self) -> Vec<String> {
		self.state.calls.lock().iter().map(|call| call.script.as_str().to_string()).collect()
	}
}

impl Connector for FakeConnector {
	fn connect<'a>(&'a self, target: &'a HostConfig) -> BoxFuture<'a, Result<Box<dyn Transport>, TransportError>> {
		Box::pin(async move {
			let should_fail = self
				.state
				.failing_connects
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
				.is_ok();
			if should_fail {
				return Err(TransportError::Handshake(format!("Connecting to remote server {} failed: access denied", target.address)));
			}

			let connection = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
			Ok(Box::new(FakeTransport {
				host: target.name.clone(),
				connection,
				handler: Arc::clone(&self.handler),
				state: Arc::clone(&self.state),
			}) as Box<dyn Transport>)
		})
	}
}

struct FakeTransport {
	host: String,
	connection: u64,
	handler: Arc<Handler>,
	state: Arc<FakeState>,
}

impl Transport for FakeTransport {
	fn send(&mut self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>> {
		Box::pin(async move {
			let script = request
				.script()
				.ok_or_else(|| TransportError::Closed("request payload is not base64 UTF-8".to_string()))?;
			let call = FakeCall {
				host: self.host.clone(),
				connection: self.connection,
				script,
			};
			self.state.calls.lock().push(call.clone());

			match (self.handler)(&call) {
				FakeReply::Records(records) => Ok(Response::success(request.id, records)),
				FakeReply::Fault(fault) => Ok(Response::failure(request.id, fault)),
				FakeReply::Hang => std::future::pending().await,
				FakeReply::Disconnect(reason) => Err(TransportError::Closed(reason)),
				FakeReply::WrongId => Ok(Response::success(request.id + 1000, Value::Null)),
			}
		})
	}
}
