//! Wire types for dsctl remote management sessions.
//!
//! This crate contains the serde-serializable types exchanged with the
//! PowerShell host that fronts a directory server. These types represent the
//! "protocol layer": script payloads going out, framed responses and
//! attribute/value records coming back.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond framing and shape checks
//! * 1:1 with the frames the session bootstrap reads and writes
//! * Stable: Changes only when the frame format changes
//!
//! Typed directory objects are built on top of these types in `dsctl`.

pub mod frame;
pub mod records;
pub mod script;

pub use frame::*;
pub use records::*;
pub use script::*;
