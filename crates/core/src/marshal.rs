//! Object marshaling: desired state to scripts, structured output to objects.
//!
//! Everything here is pure. Each rendered [`Payload`] carries the script text
//! and a typed [`Operation`] describing what the script does, so callers can
//! log and assert on intent without parsing PowerShell.
//!
//! Read scripts pipe the object through a fixed projection so that every
//! response has the same property names with enums and identifiers already
//! rendered as strings.

use std::collections::BTreeMap;

use dsctl_protocol::{Record, Script, StructuredOutput};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::dn::DistinguishedName;
use crate::model::{AttrValue, Attribute, DesiredState, DirectoryObject, GROUP_CATEGORIES, GROUP_SCOPES, ObjectGuid, ObjectKind, ValueKind};
use crate::plan::{DedicatedChange, Plan};

/// What a payload does, independent of its script text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
	Create {
		kind: ObjectKind,
		name: String,
		container: Option<DistinguishedName>,
		/// Attributes sent at creation, without secrets.
		attributes: BTreeMap<Attribute, AttrValue>,
	},
	LookupById {
		kind: ObjectKind,
		guid: ObjectGuid,
	},
	LookupByDn {
		kind: ObjectKind,
		dn: DistinguishedName,
	},
	Move {
		kind: ObjectKind,
		guid: ObjectGuid,
		target: DistinguishedName,
	},
	Rename {
		kind: ObjectKind,
		guid: ObjectGuid,
		name: String,
	},
	Replace {
		kind: ObjectKind,
		guid: ObjectGuid,
		replace: BTreeMap<Attribute, String>,
		clear: Vec<Attribute>,
	},
	SetDedicated {
		kind: ObjectKind,
		guid: ObjectGuid,
		attribute: Attribute,
		value: AttrValue,
	},
	Delete {
		kind: ObjectKind,
		guid: ObjectGuid,
	},
	Ping,
}

impl Operation {
	pub fn name(&self) -> &'static str {
		match self {
			Operation::Create { .. } => "create",
			Operation::LookupById { .. } => "lookupById",
			Operation::LookupByDn { .. } => "lookupByDn",
			Operation::Move { .. } => "move",
			Operation::Rename { .. } => "rename",
			Operation::Replace { .. } => "replace",
			Operation::SetDedicated { .. } => "setDedicated",
			Operation::Delete { .. } => "delete",
			Operation::Ping => "ping",
		}
	}

	/// Changes directory state.
	pub fn is_mutation(&self) -> bool {
		!matches!(self, Operation::LookupById { .. } | Operation::LookupByDn { .. } | Operation::Ping)
	}
}

/// A rendered remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
	pub operation: Operation,
	pub script: Script,
}

impl Payload {
	fn new(operation: Operation, script: impl Into<Script>) -> Self {
		Self {
			operation,
			script: script.into(),
		}
	}
}

/// Output that cannot be turned into a directory object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
	#[error("command returned no objects")]
	Empty,
	#[error("object is missing required property {0}")]
	Missing(&'static str),
	#[error("property ObjectGUID is not a GUID: {0}")]
	InvalidGuid(String),
	#[error("property DistinguishedName is not a valid DN: {0}")]
	InvalidDn(String),
	#[error("property {property} has unexpected value {found}")]
	WrongType { property: &'static str, found: String },
}

/// Quotes `value` as a PowerShell single-quoted literal.
///
/// PowerShell treats the typographic single quotes as quote characters too,
/// so they are doubled along with `'`.
pub fn ps_quote(value: &str) -> String {
	let mut quoted = String::with_capacity(value.len() + 2);
	quoted.push('\'');
	for ch in value.chars() {
		if matches!(ch, '\'' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}') {
			quoted.push(ch);
		}
		quoted.push(ch);
	}
	quoted.push('\'');
	quoted
}

fn ps_bool(value: bool) -> &'static str {
	if value { "$true" } else { "$false" }
}

fn identity(guid: &ObjectGuid) -> String {
	ps_quote(&guid.to_string())
}

/// Canonical spelling of a choice value, when it is one.
fn canonical_choice(allowed: &'static [&'static str], value: &str) -> Option<&'static str> {
	allowed.iter().copied().find(|choice| choice.eq_ignore_ascii_case(value))
}

fn observable(kind: ObjectKind) -> impl Iterator<Item = Attribute> {
	kind.attributes().iter().copied().filter(|attr| attr.is_observable())
}

/// `Get-AD<noun>` for `identity_expr`, projected to the decode shape.
fn fetch(kind: ObjectKind, identity_expr: &str) -> String {
	let properties: Vec<&str> = observable(kind).map(Attribute::property).collect();
	format!(
		"Get-AD{} -Identity {} -Properties {} | {}",
		kind.noun(),
		identity_expr,
		properties.join(","),
		projection(kind)
	)
}

fn projection(kind: ObjectKind) -> String {
	let mut fields = vec![
		"ObjectGUID = [string]$_.ObjectGUID".to_string(),
		"DistinguishedName = [string]$_.DistinguishedName".to_string(),
		"Name = [string]$_.Name".to_string(),
	];
	for attr in observable(kind) {
		let cast = match attr.value_kind() {
			ValueKind::Flag => "[bool]",
			_ => "[string]",
		};
		fields.push(format!("{0} = {1}$_.{0}", attr.property(), cast));
	}
	format!("ForEach-Object {{ [pscustomobject]@{{ {} }} }}", fields.join("; "))
}

/// Wraps `body` so that OU accidental-deletion protection is lifted while it runs.
fn unprotected(guid: &ObjectGuid, body: &str) -> String {
	let id = identity(guid);
	format!(
		"$protected = (Get-ADOrganizationalUnit -Identity {id} -Properties ProtectedFromAccidentalDeletion).ProtectedFromAccidentalDeletion\n\
		 if ($protected) {{ Set-ADObject -Identity {id} -ProtectedFromAccidentalDeletion $false }}\n\
		 try {{ {body} }} finally {{ if ($protected) {{ Set-ADObject -Identity {id} -ProtectedFromAccidentalDeletion $true }} }}"
	)
}

fn create_argument(attribute: Attribute, value: &AttrValue) -> Option<String> {
	match (attribute.value_kind(), value) {
		(_, value) if value.is_blank() => None,
		(ValueKind::Flag, AttrValue::Flag(flag)) => Some(format!("-{} {}", attribute.property(), ps_bool(*flag))),
		(ValueKind::Secret, AttrValue::Text(secret)) => Some(format!(
			"-{} (ConvertTo-SecureString {} -AsPlainText -Force)",
			attribute.property(),
			ps_quote(secret)
		)),
		(ValueKind::Choice(allowed), AttrValue::Text(text)) => {
			let choice: &str = match canonical_choice(allowed, text) {
				Some(choice) => choice,
				None => text,
			};
			Some(format!("-{} {}", attribute.property(), choice))
		}
		(ValueKind::Text, AttrValue::Text(text)) => Some(format!("-{} {}", attribute.property(), ps_quote(text))),
		_ => None,
	}
}

/// Renders the creation script. The result decodes into the new object.
pub fn encode_create(desired: &DesiredState) -> Payload {
	let kind = desired.kind;
	let mut attributes = desired.attributes.clone();
	if kind == ObjectKind::Group {
		attributes.entry(Attribute::GroupScope).or_insert_with(|| AttrValue::text("Global"));
		attributes.entry(Attribute::GroupCategory).or_insert_with(|| AttrValue::text("Security"));
	}

	let mut command = format!("$created = New-AD{} -Name {}", kind.noun(), ps_quote(&desired.name));
	for (attribute, value) in &attributes {
		if let Some(argument) = create_argument(*attribute, value) {
			command.push(' ');
			command.push_str(&argument);
		}
	}
	if let Some(container) = &desired.container {
		command.push_str(" -Path ");
		command.push_str(&ps_quote(container.as_str()));
	}
	command.push_str(" -PassThru");

	let script = Script::new(command).then(fetch(kind, "$created.ObjectGUID"));
	attributes.retain(|attribute, value| attribute.is_observable() && !value.is_blank());

	Payload::new(
		Operation::Create {
			kind,
			name: desired.name.clone(),
			container: desired.container.clone(),
			attributes,
		},
		script,
	)
}

pub fn encode_lookup_by_id(kind: ObjectKind, guid: &ObjectGuid) -> Payload {
	Payload::new(Operation::LookupById { kind, guid: *guid }, fetch(kind, &identity(guid)))
}

pub fn encode_lookup_by_dn(kind: ObjectKind, dn: &DistinguishedName) -> Payload {
	Payload::new(
		Operation::LookupByDn { kind, dn: dn.clone() },
		fetch(kind, &ps_quote(dn.as_str())),
	)
}

/// Renders the ordered mutation payloads for `plan`.
///
/// Order: move, rename, one grouped replace/clear, then one payload per
/// dedicated attribute.
pub fn encode_update(kind: ObjectKind, guid: &ObjectGuid, plan: &Plan) -> Vec<Payload> {
	let id = identity(guid);
	let mut payloads = Vec::new();

	if let Some(target) = &plan.move_to {
		let body = format!("Move-ADObject -Identity {id} -TargetPath {}", ps_quote(target.as_str()));
		let script = match kind {
			ObjectKind::OrganizationalUnit => unprotected(guid, &body),
			_ => body,
		};
		payloads.push(Payload::new(
			Operation::Move {
				kind,
				guid: *guid,
				target: target.clone(),
			},
			script,
		));
	}

	if let Some(name) = &plan.rename {
		let body = format!("Rename-ADObject -Identity {id} -NewName {}", ps_quote(name));
		let script = match kind {
			ObjectKind::OrganizationalUnit => unprotected(guid, &body),
			_ => body,
		};
		payloads.push(Payload::new(
			Operation::Rename {
				kind,
				guid: *guid,
				name: name.clone(),
			},
			script,
		));
	}

	if !plan.replace.is_empty() || !plan.clear.is_empty() {
		let mut command = format!("Set-ADObject -Identity {id}");
		let replace: Vec<String> = plan
			.replace
			.iter()
			.filter_map(|(attr, value)| attr.ldap_name().map(|ldap| format!("{} = {}", ps_quote(ldap), ps_quote(value))))
			.collect();
		if !replace.is_empty() {
			command.push_str(&format!(" -Replace @{{ {} }}", replace.join("; ")));
		}
		let clear: Vec<String> = plan.clear.iter().filter_map(|attr| attr.ldap_name()).map(ps_quote).collect();
		if !clear.is_empty() {
			command.push_str(&format!(" -Clear {}", clear.join(",")));
		}
		payloads.push(Payload::new(
			Operation::Replace {
				kind,
				guid: *guid,
				replace: plan.replace.clone(),
				clear: plan.clear.iter().copied().collect(),
			},
			command,
		));
	}

	for change in &plan.dedicated {
		if let Some(script) = dedicated_script(&id, change) {
			payloads.push(Payload::new(
				Operation::SetDedicated {
					kind,
					guid: *guid,
					attribute: change.attribute,
					value: change.to.clone(),
				},
				script,
			));
		}
	}

	payloads
}

fn dedicated_script(id: &str, change: &DedicatedChange) -> Option<String> {
	match (change.attribute, &change.to) {
		(Attribute::Enabled, AttrValue::Flag(true)) => Some(format!("Enable-ADAccount -Identity {id}")),
		(Attribute::Enabled, AttrValue::Flag(false)) => Some(format!("Disable-ADAccount -Identity {id}")),
		(Attribute::Protected, AttrValue::Flag(flag)) => Some(format!(
			"Set-ADObject -Identity {id} -ProtectedFromAccidentalDeletion {}",
			ps_bool(*flag)
		)),
		(Attribute::GroupCategory, AttrValue::Text(text)) => {
			let category = canonical_choice(GROUP_CATEGORIES, text)?;
			Some(format!("Set-ADGroup -Identity {id} -GroupCategory {category}"))
		}
		(Attribute::GroupScope, AttrValue::Text(text)) => {
			let to = canonical_choice(GROUP_SCOPES, text)?;
			let from = change
				.from
				.as_ref()
				.and_then(AttrValue::as_text)
				.and_then(|from| canonical_choice(GROUP_SCOPES, from));
			// Global and DomainLocal cannot convert into each other directly.
			let script = match (from, to) {
				(Some("Global"), "DomainLocal") | (Some("DomainLocal"), "Global") => format!(
					"Set-ADGroup -Identity {id} -GroupScope Universal\nSet-ADGroup -Identity {id} -GroupScope {to}"
				),
				_ => format!("Set-ADGroup -Identity {id} -GroupScope {to}"),
			};
			Some(script)
		}
		_ => None,
	}
}

pub fn encode_delete(kind: ObjectKind, guid: &ObjectGuid) -> Payload {
	let id = identity(guid);
	let script = match kind {
		// Computers carry leaf children (BitLocker recovery, service connection points).
		ObjectKind::Computer => Script::new(format!("Remove-ADObject -Identity {id} -Recursive -Confirm:$false")),
		ObjectKind::OrganizationalUnit => Script::new(format!("Set-ADObject -Identity {id} -ProtectedFromAccidentalDeletion $false"))
			.then(format!("Remove-ADOrganizationalUnit -Identity {id} -Confirm:$false")),
		ObjectKind::User | ObjectKind::Group => Script::new(format!("Remove-AD{} -Identity {id} -Confirm:$false", kind.noun())),
	};
	Payload::new(Operation::Delete { kind, guid: *guid }, script)
}

/// Connectivity check: reports the domain the session can reach.
pub fn encode_ping() -> Payload {
	Payload::new(
		Operation::Ping,
		"Get-ADDomain | ForEach-Object { [pscustomobject]@{ DNSRoot = [string]$_.DNSRoot; PDCEmulator = [string]$_.PDCEmulator; ComputerName = $env:COMPUTERNAME } }",
	)
}

/// Decodes the first record of `output` into a `kind` object.
pub fn decode(kind: ObjectKind, output: &StructuredOutput) -> Result<DirectoryObject, DecodeError> {
	let record = output.first().ok_or(DecodeError::Empty)?;
	decode_record(kind, record)
}

pub fn decode_record(kind: ObjectKind, record: &Record) -> Result<DirectoryObject, DecodeError> {
	let guid_text = required_text(record, "ObjectGUID")?;
	let guid = guid_text
		.parse::<ObjectGuid>()
		.map_err(|_| DecodeError::InvalidGuid(guid_text.to_string()))?;
	let dn_text = required_text(record, "DistinguishedName")?;
	let distinguished_name = DistinguishedName::parse(dn_text).map_err(|err| DecodeError::InvalidDn(format!("{dn_text}: {err}")))?;
	let name = match record.text("Name") {
		Some(name) if !name.is_empty() => name.to_string(),
		_ => distinguished_name.rdn_value(),
	};

	let mut attributes = BTreeMap::new();
	for attribute in observable(kind) {
		if let Some(value) = decode_value(attribute, record.get(attribute.property()))? {
			attributes.insert(attribute, value);
		}
	}

	Ok(DirectoryObject {
		kind,
		guid,
		distinguished_name,
		name,
		attributes,
	})
}

fn required_text<'r>(record: &'r Record, property: &'static str) -> Result<&'r str, DecodeError> {
	match record.get(property) {
		Some(Value::String(text)) if !text.is_empty() => Ok(text),
		Some(Value::String(_)) | Some(Value::Null) | None => Err(DecodeError::Missing(property)),
		Some(other) => Err(DecodeError::WrongType {
			property,
			found: other.to_string(),
		}),
	}
}

fn decode_value(attribute: Attribute, value: Option<&Value>) -> Result<Option<AttrValue>, DecodeError> {
	let property = attribute.property();
	let wrong = |found: &Value| DecodeError::WrongType {
		property,
		found: found.to_string(),
	};

	match attribute.value_kind() {
		ValueKind::Flag => match value {
			None | Some(Value::Null) => Ok(None),
			Some(Value::Bool(flag)) => Ok(Some(AttrValue::Flag(*flag))),
			Some(Value::String(text)) if text.eq_ignore_ascii_case("true") => Ok(Some(AttrValue::Flag(true))),
			Some(Value::String(text)) if text.eq_ignore_ascii_case("false") => Ok(Some(AttrValue::Flag(false))),
			Some(other) => Err(wrong(other)),
		},
		ValueKind::Choice(allowed) => match value {
			None | Some(Value::Null) => Ok(Some(AttrValue::text(""))),
			Some(Value::String(text)) if text.is_empty() => Ok(Some(AttrValue::text(""))),
			Some(Value::String(text)) => canonical_choice(allowed, text)
				.map(|choice| Some(AttrValue::text(choice)))
				.ok_or_else(|| wrong(&Value::String(text.clone()))),
			// Enum values serialized without names.
			Some(number @ Value::Number(n)) => n
				.as_u64()
				.and_then(|index| allowed.get(index as usize))
				.map(|choice| Some(AttrValue::text(*choice)))
				.ok_or_else(|| wrong(number)),
			Some(other) => Err(wrong(other)),
		},
		ValueKind::Text | ValueKind::Secret => match value {
			None | Some(Value::Null) => Ok(Some(AttrValue::text(""))),
			Some(Value::String(text)) => Ok(Some(AttrValue::text(text.clone()))),
			Some(other) => Err(wrong(other)),
		},
	}
}
