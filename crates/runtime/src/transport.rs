//! Transport seams between sessions and session hosts.
//!
//! A [`Connector`] opens an authenticated channel to a host and yields a
//! [`Transport`]; a transport carries one request at a time and answers with
//! the correlated response frame. Deadlines are applied by the caller, so a
//! transport whose `send` future is dropped mid-flight must be treated as
//! indeterminate and discarded.

use std::future::Future;
use std::pin::Pin;

use dsctl_protocol::{Request, Response};

use crate::config::HostConfig;
use crate::error::TransportError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An open request/response channel to one session host.
pub trait Transport: Send {
	/// Sends one request and waits for its response frame.
	fn send(&mut self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>>;
}

/// Opens transports to configured hosts.
pub trait Connector: Send + Sync {
	fn connect<'a>(&'a self, target: &'a HostConfig) -> BoxFuture<'a, Result<Box<dyn Transport>, TransportError>>;
}
