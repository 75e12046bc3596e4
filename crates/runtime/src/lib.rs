// dsctl-runtime: remote management sessions for dsctl
//
// Owns everything between a script and the directory host: connecting,
// pooling sessions per host, framing requests, and classifying failures.
// Object semantics live in the `dsctl` crate.

pub mod classify;
pub mod command;
pub mod config;
pub mod error;
pub mod fake;
pub mod pool;
pub mod pwsh;
pub mod session;
pub mod transport;

pub use classify::{Classification, Marker, MarkerTable};
pub use config::{AuthMethod, HostConfig, PoolConfig, Secret};
pub use dsctl_protocol::{Fault, Record, Script, StructuredOutput};
pub use error::{ErrorKind, PoolError, RemoteError, Result, TransportError};
pub use pool::{HostStatus, PooledSession, SessionPool};
pub use pwsh::PwshConnector;
pub use session::{Session, SessionId};
pub use transport::{BoxFuture, Connector, Transport};
