//! Marker-based classification of remote faults.
//!
//! The remote error channel is free text. A [`MarkerTable`] maps substrings of
//! the fault message, category, and error id onto an [`ErrorKind`]. Entries
//! are consulted in order and the first match wins, so more specific markers
//! must precede broader ones. Matching is ASCII case-insensitive.
//!
//! The default table targets the Active Directory PowerShell module behind
//! PowerShell remoting. Other directory dialects extend it with
//! [`MarkerTable::with_overrides`].

use dsctl_protocol::Fault;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// One substring-to-kind mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
	pub pattern: String,
	pub kind: ErrorKind,
	/// The fault leaves the session's transport unusable.
	#[serde(default)]
	pub breaks_session: bool,
}

impl Marker {
	pub fn new(pattern: impl Into<String>, kind: ErrorKind) -> Self {
		Self {
			pattern: pattern.into(),
			kind,
			breaks_session: false,
		}
	}

	pub fn breaking(mut self) -> Self {
		self.breaks_session = true;
		self
	}
}

/// Result of classifying one fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
	pub kind: ErrorKind,
	pub breaks_session: bool,
}

impl Classification {
	const UNMATCHED: Classification = Classification {
		kind: ErrorKind::Other,
		breaks_session: false,
	};
}

/// Ordered marker list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerTable {
	markers: Vec<Marker>,
}

impl MarkerTable {
	pub fn empty() -> Self {
		Self { markers: Vec::new() }
	}

	/// Markers for the Active Directory module over PowerShell remoting.
	pub fn active_directory() -> Self {
		use ErrorKind::*;

		let markers = vec![
			// A missing cmdlet reports category ObjectNotFound; it must not read as absence.
			Marker::new("is not recognized as", Other),
			Marker::new("CommandNotFoundException", Other),
			Marker::new("Cannot find an object with identity", NotFound),
			Marker::new("ADIdentityNotFoundException", NotFound),
			Marker::new("Directory object not found", NotFound),
			Marker::new("ObjectNotFound", NotFound),
			Marker::new("already in use", AlreadyExists),
			Marker::new("already exists", AlreadyExists),
			Marker::new("ResourceExists", AlreadyExists),
			Marker::new("PSRemotingTransportException", Transient).breaking(),
			Marker::new("The WinRM client", Transient).breaking(),
			Marker::new("WinRM cannot complete the operation", Transient).breaking(),
			Marker::new("The I/O operation has been aborted", Transient).breaking(),
			Marker::new("Unable to contact the server", Transient),
			Marker::new("The server is not operational", Transient),
			Marker::new("The server has returned the following error: invalid enumeration context", Transient),
			Marker::new("timed out", Transient),
			Marker::new("OperationTimeout", Transient),
		];

		Self { markers }
	}

	/// Places `extra` ahead of the current markers.
	pub fn with_overrides(mut self, extra: impl IntoIterator<Item = Marker>) -> Self {
		let mut markers: Vec<Marker> = extra.into_iter().collect();
		markers.append(&mut self.markers);
		self.markers = markers;
		self
	}

	pub fn push(&mut self, marker: Marker) {
		self.markers.push(marker);
	}

	pub fn markers(&self) -> &[Marker] {
		&self.markers
	}

	pub fn classify(&self, fault: &Fault) -> Classification {
		let mut haystack = fault.message.clone();
		for part in [fault.category.as_deref(), fault.error_id.as_deref()].into_iter().flatten() {
			haystack.push('\n');
			haystack.push_str(part);
		}
		self.classify_text(&haystack)
	}

	pub fn classify_text(&self, text: &str) -> Classification {
		let text = text.to_ascii_lowercase();
		self.markers
			.iter()
			.find(|marker| !marker.pattern.is_empty() && text.contains(&marker.pattern.to_ascii_lowercase()))
			.map(|marker| Classification {
				kind: marker.kind,
				breaks_session: marker.breaks_session,
			})
			.unwrap_or(Classification::UNMATCHED)
	}
}

impl Default for MarkerTable {
	fn default() -> Self {
		Self::active_directory()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn kind_of(message: &str) -> ErrorKind {
		MarkerTable::active_directory().classify_text(message).kind
	}

	#[test]
	fn active_directory_markers_map_to_expected_kinds() {
		let cases = [
			(
				"Cannot find an object with identity: '0b6f2d1c-3c9e-4c53-9f0e-6f3c1c2b8a11' under: 'DC=example,DC=com'.",
				ErrorKind::NotFound,
			),
			("ActiveDirectoryCmdlet:Microsoft.ActiveDirectory.Management.ADIdentityNotFoundException", ErrorKind::NotFound),
			("Directory object not found", ErrorKind::NotFound),
			("The specified account already exists", ErrorKind::AlreadyExists),
			(
				"An attempt was made to add an object to the directory with a name that is already in use",
				ErrorKind::AlreadyExists,
			),
			("Connecting to remote server dc1 failed: PSRemotingTransportException", ErrorKind::Transient),
			("The WinRM client cannot process the request.", ErrorKind::Transient),
			("WinRM cannot complete the operation.", ErrorKind::Transient),
			("Unable to contact the server. This may be because this server does not exist", ErrorKind::Transient),
			("The server is not operational", ErrorKind::Transient),
			("The operation timed out", ErrorKind::Transient),
			("Access is denied", ErrorKind::Other),
		];

		for (message, expected) in cases {
			assert_eq!(kind_of(message), expected, "message: {message}");
		}
	}

	#[test]
	fn category_alone_classifies() {
		let fault = Fault::new("something odd happened").with_category("ObjectNotFound");
		assert_eq!(MarkerTable::default().classify(&fault).kind, ErrorKind::NotFound);

		let fault = Fault::new("duplicate").with_category("ResourceExists");
		assert_eq!(MarkerTable::default().classify(&fault).kind, ErrorKind::AlreadyExists);
	}

	#[test]
	fn missing_cmdlet_is_not_absence() {
		let fault = Fault::new("The term 'Get-ADComputer' is not recognized as a name of a cmdlet, function, script file, or executable program.")
			.with_category("ObjectNotFound")
			.with_error_id("CommandNotFoundException");
		assert_eq!(MarkerTable::default().classify(&fault).kind, ErrorKind::Other);
	}

	#[test]
	fn transport_markers_break_the_session() {
		let table = MarkerTable::active_directory();
		assert!(table.classify_text("System.Management.Automation.Remoting.PSRemotingTransportException").breaks_session);
		assert!(!table.classify_text("The server is not operational").breaks_session);
		assert!(!table.classify_text("Cannot find an object with identity").breaks_session);
	}

	#[test]
	fn matching_is_case_insensitive() {
		assert_eq!(kind_of("CANNOT FIND AN OBJECT WITH IDENTITY"), ErrorKind::NotFound);
	}

	#[test]
	fn overrides_take_precedence() {
		let table = MarkerTable::active_directory().with_overrides([Marker::new("already exists", ErrorKind::Other)]);
		assert_eq!(table.classify_text("The object already exists").kind, ErrorKind::Other);

		let table = MarkerTable::active_directory().with_overrides([Marker::new("No such object", ErrorKind::NotFound)]);
		assert_eq!(table.classify_text("ldap: No such object").kind, ErrorKind::NotFound);
	}

	#[test]
	fn empty_table_and_empty_patterns_never_match() {
		assert_eq!(MarkerTable::empty().classify_text("ObjectNotFound").kind, ErrorKind::Other);

		let mut table = MarkerTable::empty();
		table.push(Marker::new("", ErrorKind::NotFound));
		assert_eq!(table.classify_text("anything").kind, ErrorKind::Other);
	}
}
