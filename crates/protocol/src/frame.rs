//! Newline-delimited JSON frames exchanged with the session host.
//!
//! Request:
//! ```json
//! { "id": 7, "payload": "R2V0LUFEQ29tcHV0ZXIgLi4u" }
//! ```
//!
//! Success response:
//! ```json
//! { "id": 7, "ok": true, "records": [{ "ObjectGUID": "...", "Name": "WS01" }] }
//! ```
//!
//! Failure response:
//! ```json
//! {
//!   "id": 7,
//!   "ok": false,
//!   "fault": {
//!     "message": "Cannot find an object with identity: '...'",
//!     "category": "ObjectNotFound",
//!     "errorId": "ActiveDirectoryCmdlet:Microsoft.ActiveDirectory.Management.ADIdentityNotFoundException"
//!   }
//! }
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::script::Script;

/// Frame id the host emits once its remote session is ready.
pub const READY_FRAME_ID: u64 = 0;

/// Script execution request sent to the session host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
	/// Per-session request id, echoed back in the response.
	pub id: u64,
	/// Base64 of the UTF-8 script text.
	pub payload: String,
}

impl Request {
	pub fn new(id: u64, script: &Script) -> Self {
		Self {
			id,
			payload: STANDARD.encode(script.as_str()),
		}
	}

	/// Decodes the payload back into script text.
	pub fn script(&self) -> Option<Script> {
		let bytes = STANDARD.decode(&self.payload).ok()?;
		String::from_utf8(bytes).ok().map(Script::new)
	}
}

/// Response frame written by the session host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
	/// Request id this response correlates to.
	pub id: u64,
	/// Whether the script completed without a terminating error.
	pub ok: bool,
	/// Script output, present on success.
	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub records: Value,
	/// Error details, present on failure.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub fault: Option<Fault>,
}

impl Response {
	pub fn success(id: u64, records: Value) -> Self {
		Self {
			id,
			ok: true,
			records,
			fault: None,
		}
	}

	pub fn failure(id: u64, fault: Fault) -> Self {
		Self {
			id,
			ok: false,
			records: Value::Null,
			fault: Some(fault),
		}
	}
}

/// Error record reported by the remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fault {
	/// Human-readable exception message.
	pub message: String,
	/// PowerShell error category (e.g. `ObjectNotFound`).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub category: Option<String>,
	/// Fully qualified error id.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_id: Option<String>,
}

impl Fault {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			category: None,
			error_id: None,
		}
	}

	pub fn with_category(mut self, category: impl Into<String>) -> Self {
		self.category = Some(category.into());
		self
	}

	pub fn with_error_id(mut self, error_id: impl Into<String>) -> Self {
		self.error_id = Some(error_id.into());
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn request_payload_is_base64_of_script() {
		let request = Request::new(3, &Script::new("Get-ADComputer -Identity 'x'"));
		assert_eq!(request.payload, "R2V0LUFEQ29tcHV0ZXIgLUlkZW50aXR5ICd4Jw==");
		assert_eq!(request.script().unwrap().as_str(), "Get-ADComputer -Identity 'x'");
	}

	#[test]
	fn failure_frame_parses_camel_case_fault() {
		let json = r#"{"id": 4, "ok": false, "fault": {"message": "boom", "category": "ObjectNotFound", "errorId": "X"}}"#;
		let response: Response = serde_json::from_str(json).unwrap();
		assert!(!response.ok);
		assert!(response.records.is_null());
		let fault = response.fault.unwrap();
		assert_eq!(fault.category.as_deref(), Some("ObjectNotFound"));
		assert_eq!(fault.error_id.as_deref(), Some("X"));
	}

	#[test]
	fn success_frame_without_records_defaults_to_null() {
		let response: Response = serde_json::from_str(r#"{"id": 1, "ok": true}"#).unwrap();
		assert!(response.ok);
		assert!(response.records.is_null());
		assert!(response.fault.is_none());
	}
}
