// dsctl: directory object reconciliation over remote management sessions
//
// Computers, organizational units, users, and groups are read and converged
// through scripted commands on a remote PowerShell host. Session handling
// lives in `dsctl-runtime`; this crate owns the object model, script
// rendering, and convergence logic.

pub mod client;
pub mod config;
pub mod dn;
pub mod error;
pub mod marshal;
pub mod model;
pub mod plan;
pub mod reconcile;

/// Default per-operation timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub use client::DirectoryClient;
pub use config::{AbsenceConfig, ClientConfig};
pub use dn::{DistinguishedName, DnError};
pub use error::{Error, ObjectRef, Result};
pub use marshal::{DecodeError, Operation, Payload};
pub use model::{AttrValue, Attribute, DesiredState, DirectoryObject, ObjectGuid, ObjectKind, Observed, ValidationError};
pub use plan::{DedicatedChange, Plan};
pub use reconcile::{AbsencePolicy, DeleteOutcome, Executor, Reconciler, UpdateOutcome};

pub use dsctl_protocol::{Record, Script, StructuredOutput};
pub use dsctl_runtime::{HostConfig, PoolConfig, RemoteError, SessionPool};
