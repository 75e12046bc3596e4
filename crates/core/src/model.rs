//! Directory object model: kinds, attributes, observed objects, desired state.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::dn::DistinguishedName;

/// Closed set of managed object variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectKind {
	Computer,
	#[serde(rename = "ou", alias = "organizationalUnit")]
	OrganizationalUnit,
	User,
	Group,
}

impl ObjectKind {
	pub const ALL: [ObjectKind; 4] = [
		ObjectKind::Computer,
		ObjectKind::OrganizationalUnit,
		ObjectKind::User,
		ObjectKind::Group,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			ObjectKind::Computer => "computer",
			ObjectKind::OrganizationalUnit => "ou",
			ObjectKind::User => "user",
			ObjectKind::Group => "group",
		}
	}

	/// Cmdlet noun: `New-AD<noun>`, `Get-AD<noun>`.
	pub fn noun(self) -> &'static str {
		match self {
			ObjectKind::Computer => "Computer",
			ObjectKind::OrganizationalUnit => "OrganizationalUnit",
			ObjectKind::User => "User",
			ObjectKind::Group => "Group",
		}
	}

	/// Naming attribute of the leading DN component.
	pub fn rdn_attribute(self) -> &'static str {
		match self {
			ObjectKind::OrganizationalUnit => "OU",
			_ => "CN",
		}
	}

	pub fn attributes(self) -> &'static [Attribute] {
		use Attribute::*;

		match self {
			ObjectKind::Computer => &[SamAccountName, Description, DnsHostName, Sid],
			ObjectKind::OrganizationalUnit => &[Description, DisplayName, Protected],
			ObjectKind::User => &[
				SamAccountName,
				Description,
				DisplayName,
				UserPrincipalName,
				GivenName,
				Surname,
				Enabled,
				InitialPassword,
				Sid,
			],
			ObjectKind::Group => &[SamAccountName, Description, DisplayName, GroupScope, GroupCategory, Sid],
		}
	}

	pub fn supports(self, attribute: Attribute) -> bool {
		self.attributes().contains(&attribute)
	}
}

impl fmt::Display for ObjectKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ObjectKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"computer" => Ok(ObjectKind::Computer),
			"ou" | "organizationalunit" | "organizational_unit" => Ok(ObjectKind::OrganizationalUnit),
			"user" => Ok(ObjectKind::User),
			"group" => Ok(ObjectKind::Group),
			other => Err(format!("unknown object kind `{other}` (expected computer, ou, user, or group)")),
		}
	}
}

/// How an attribute is written once the object exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
	/// Grouped into one `Set-ADObject -Replace/-Clear`.
	Replace,
	/// Needs its own cmdlet.
	Dedicated,
	/// Only settable at creation and never read back.
	CreateOnly,
	ReadOnly,
}

/// Shape of an attribute's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
	Text,
	Flag,
	Choice(&'static [&'static str]),
	Secret,
}

pub const GROUP_SCOPES: &[&str] = &["DomainLocal", "Global", "Universal"];
pub const GROUP_CATEGORIES: &[&str] = &["Distribution", "Security"];

/// Managed attribute vocabulary shared by all kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
	SamAccountName,
	Description,
	DisplayName,
	DnsHostName,
	UserPrincipalName,
	GivenName,
	Surname,
	Enabled,
	GroupScope,
	GroupCategory,
	Protected,
	InitialPassword,
	Sid,
}

impl Attribute {
	pub const ALL: [Attribute; 13] = [
		Attribute::SamAccountName,
		Attribute::Description,
		Attribute::DisplayName,
		Attribute::DnsHostName,
		Attribute::UserPrincipalName,
		Attribute::GivenName,
		Attribute::Surname,
		Attribute::Enabled,
		Attribute::GroupScope,
		Attribute::GroupCategory,
		Attribute::Protected,
		Attribute::InitialPassword,
		Attribute::Sid,
	];

	pub fn name(self) -> &'static str {
		match self {
			Attribute::SamAccountName => "sam_account_name",
			Attribute::Description => "description",
			Attribute::DisplayName => "display_name",
			Attribute::DnsHostName => "dns_host_name",
			Attribute::UserPrincipalName => "user_principal_name",
			Attribute::GivenName => "given_name",
			Attribute::Surname => "surname",
			Attribute::Enabled => "enabled",
			Attribute::GroupScope => "group_scope",
			Attribute::GroupCategory => "group_category",
			Attribute::Protected => "protected",
			Attribute::InitialPassword => "initial_password",
			Attribute::Sid => "sid",
		}
	}

	/// Property name in cmdlet output and the matching `New-AD*` parameter.
	pub fn property(self) -> &'static str {
		match self {
			Attribute::SamAccountName => "SamAccountName",
			Attribute::Description => "Description",
			Attribute::DisplayName => "DisplayName",
			Attribute::DnsHostName => "DNSHostName",
			Attribute::UserPrincipalName => "UserPrincipalName",
			Attribute::GivenName => "GivenName",
			Attribute::Surname => "Surname",
			Attribute::Enabled => "Enabled",
			Attribute::GroupScope => "GroupScope",
			Attribute::GroupCategory => "GroupCategory",
			Attribute::Protected => "ProtectedFromAccidentalDeletion",
			Attribute::InitialPassword => "AccountPassword",
			Attribute::Sid => "SID",
		}
	}

	/// LDAP display name used with `Set-ADObject -Replace/-Clear`.
	pub fn ldap_name(self) -> Option<&'static str> {
		match self {
			Attribute::SamAccountName => Some("sAMAccountName"),
			Attribute::Description => Some("description"),
			Attribute::DisplayName => Some("displayName"),
			Attribute::DnsHostName => Some("dNSHostName"),
			Attribute::UserPrincipalName => Some("userPrincipalName"),
			Attribute::GivenName => Some("givenName"),
			Attribute::Surname => Some("sn"),
			_ => None,
		}
	}

	pub fn write_mode(self) -> WriteMode {
		match self {
			Attribute::Enabled | Attribute::GroupScope | Attribute::GroupCategory | Attribute::Protected => WriteMode::Dedicated,
			Attribute::InitialPassword => WriteMode::CreateOnly,
			Attribute::Sid => WriteMode::ReadOnly,
			_ => WriteMode::Replace,
		}
	}

	pub fn value_kind(self) -> ValueKind {
		match self {
			Attribute::Enabled | Attribute::Protected => ValueKind::Flag,
			Attribute::GroupScope => ValueKind::Choice(GROUP_SCOPES),
			Attribute::GroupCategory => ValueKind::Choice(GROUP_CATEGORIES),
			Attribute::InitialPassword => ValueKind::Secret,
			_ => ValueKind::Text,
		}
	}

	/// Read back from the directory after writes.
	pub fn is_observable(self) -> bool {
		self.write_mode() != WriteMode::CreateOnly
	}
}

impl fmt::Display for Attribute {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for Attribute {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let wanted = s.trim().replace('-', "_");
		Attribute::ALL
			.into_iter()
			.find(|attr| attr.name().eq_ignore_ascii_case(&wanted) || attr.property().eq_ignore_ascii_case(&wanted))
			.ok_or_else(|| format!("unknown attribute `{s}`"))
	}
}

/// One attribute value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
	Flag(bool),
	Text(String),
}

impl AttrValue {
	pub fn text(value: impl Into<String>) -> Self {
		AttrValue::Text(value.into())
	}

	pub fn as_text(&self) -> Option<&str> {
		match self {
			AttrValue::Text(text) => Some(text),
			AttrValue::Flag(_) => None,
		}
	}

	pub fn as_flag(&self) -> Option<bool> {
		match self {
			AttrValue::Flag(flag) => Some(*flag),
			AttrValue::Text(_) => None,
		}
	}

	/// Empty text; equivalent to an absent value.
	pub fn is_blank(&self) -> bool {
		matches!(self, AttrValue::Text(text) if text.is_empty())
	}

	/// Parses command-line input according to the attribute's value kind.
	pub fn parse_for(attribute: Attribute, raw: &str) -> Result<Self, String> {
		match attribute.value_kind() {
			ValueKind::Flag => match raw.trim().to_ascii_lowercase().as_str() {
				"true" | "yes" | "1" | "on" => Ok(AttrValue::Flag(true)),
				"false" | "no" | "0" | "off" => Ok(AttrValue::Flag(false)),
				_ => Err(format!("{attribute} expects true or false, got `{raw}`")),
			},
			_ => Ok(AttrValue::Text(raw.to_string())),
		}
	}
}

impl fmt::Debug for AttrValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AttrValue::Flag(flag) => write!(f, "{flag}"),
			AttrValue::Text(text) => write!(f, "{text:?}"),
		}
	}
}

impl From<bool> for AttrValue {
	fn from(value: bool) -> Self {
		AttrValue::Flag(value)
	}
}

impl From<&str> for AttrValue {
	fn from(value: &str) -> Self {
		AttrValue::Text(value.to_string())
	}
}

impl From<String> for AttrValue {
	fn from(value: String) -> Self {
		AttrValue::Text(value)
	}
}

/// Compares two values of `attribute` the way the directory does.
///
/// Blank text equals absence; choice values compare case-insensitively.
pub fn values_match(attribute: Attribute, current: Option<&AttrValue>, desired: &AttrValue) -> bool {
	match (attribute.value_kind(), current, desired) {
		(ValueKind::Flag, Some(AttrValue::Flag(a)), AttrValue::Flag(b)) => a == b,
		(ValueKind::Flag, _, _) => false,
		(_, None, desired) => desired.is_blank(),
		(ValueKind::Choice(_), Some(AttrValue::Text(a)), AttrValue::Text(b)) => a.eq_ignore_ascii_case(b),
		(_, Some(current), desired) => current == desired || (current.is_blank() && desired.is_blank()),
	}
}

/// Server-assigned, immutable object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectGuid(Uuid);

impl ObjectGuid {
	pub fn new(uuid: Uuid) -> Self {
		Self(uuid)
	}

	pub fn as_uuid(&self) -> &Uuid {
		&self.0
	}
}

impl fmt::Display for ObjectGuid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0.hyphenated())
	}
}

impl FromStr for ObjectGuid {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s.trim().trim_start_matches('{').trim_end_matches('}')).map(Self)
	}
}

impl From<Uuid> for ObjectGuid {
	fn from(uuid: Uuid) -> Self {
		Self(uuid)
	}
}

/// A directory object as observed on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryObject {
	pub kind: ObjectKind,
	pub guid: ObjectGuid,
	pub distinguished_name: DistinguishedName,
	pub name: String,
	pub attributes: BTreeMap<Attribute, AttrValue>,
}

impl DirectoryObject {
	pub fn container(&self) -> Option<DistinguishedName> {
		self.distinguished_name.container()
	}

	pub fn get(&self, attribute: Attribute) -> Option<&AttrValue> {
		self.attributes.get(&attribute)
	}

	/// Text value, with absence read as `""`.
	pub fn text(&self, attribute: Attribute) -> &str {
		self.get(attribute).and_then(AttrValue::as_text).unwrap_or("")
	}

	pub fn flag(&self, attribute: Attribute) -> Option<bool> {
		self.get(attribute).and_then(AttrValue::as_flag)
	}

	/// Recomputes the DN after a rename or move.
	pub fn relocate(&mut self, container: Option<&DistinguishedName>, name: &str) {
		let container = container.cloned().or_else(|| self.container());
		if let Some(container) = container {
			self.distinguished_name = DistinguishedName::child_of(&container, self.kind.rdn_attribute(), name);
		}
		self.name = name.to_string();
	}
}

/// Result of a read: the object, or its confirmed absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "object", rename_all = "camelCase")]
pub enum Observed {
	Present(DirectoryObject),
	Absent,
}

impl Observed {
	pub fn is_absent(&self) -> bool {
		matches!(self, Observed::Absent)
	}

	pub fn into_object(self) -> Option<DirectoryObject> {
		match self {
			Observed::Present(object) => Some(object),
			Observed::Absent => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
	#[error("object name must not be empty")]
	EmptyName,
	#[error("{kind} objects do not have attribute {attribute}")]
	Unsupported { kind: ObjectKind, attribute: Attribute },
	#[error("attribute {0} is read-only")]
	ReadOnly(Attribute),
	#[error("attribute {attribute} expects a {expected} value")]
	WrongType { attribute: Attribute, expected: &'static str },
	#[error("attribute {attribute} does not accept `{value}` (expected one of {allowed})")]
	OutOfRange {
		attribute: Attribute,
		value: String,
		allowed: String,
	},
}

/// Caller-declared target configuration for one object.
///
/// `container: None` leaves placement unmanaged. Attributes not present in
/// `attributes` are unmanaged and never diffed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredState {
	pub kind: ObjectKind,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub container: Option<DistinguishedName>,
	#[serde(default)]
	pub attributes: BTreeMap<Attribute, AttrValue>,
}

impl DesiredState {
	pub fn new(kind: ObjectKind, name: impl Into<String>) -> Self {
		Self {
			kind,
			name: name.into(),
			container: None,
			attributes: BTreeMap::new(),
		}
	}

	pub fn in_container(mut self, container: DistinguishedName) -> Self {
		self.container = Some(container);
		self
	}

	pub fn with(mut self, attribute: Attribute, value: impl Into<AttrValue>) -> Self {
		self.attributes.insert(attribute, value.into());
		self
	}

	pub fn set(&mut self, attribute: Attribute, value: impl Into<AttrValue>) {
		self.attributes.insert(attribute, value.into());
	}

	pub fn get(&self, attribute: Attribute) -> Option<&AttrValue> {
		self.attributes.get(&attribute)
	}

	/// DN the object will have once converged, when placement is managed.
	pub fn distinguished_name(&self) -> Option<DistinguishedName> {
		self.container
			.as_ref()
			.map(|container| DistinguishedName::child_of(container, self.kind.rdn_attribute(), &self.name))
	}

	pub fn validate(&self) -> Result<(), ValidationError> {
		if self.name.trim().is_empty() {
			return Err(ValidationError::EmptyName);
		}
		for (&attribute, value) in &self.attributes {
			if !self.kind.supports(attribute) {
				return Err(ValidationError::Unsupported {
					kind: self.kind,
					attribute,
				});
			}
			if attribute.write_mode() == WriteMode::ReadOnly {
				return Err(ValidationError::ReadOnly(attribute));
			}
			match (attribute.value_kind(), value) {
				(ValueKind::Flag, AttrValue::Flag(_)) => {}
				(ValueKind::Flag, _) => return Err(ValidationError::WrongType { attribute, expected: "boolean" }),
				(_, AttrValue::Flag(_)) => return Err(ValidationError::WrongType { attribute, expected: "text" }),
				(ValueKind::Choice(allowed), AttrValue::Text(text)) => {
					if !allowed.iter().any(|choice| choice.eq_ignore_ascii_case(text)) {
						return Err(ValidationError::OutOfRange {
							attribute,
							value: text.clone(),
							allowed: allowed.join(", "),
						});
					}
				}
				_ => {}
			}
		}
		Ok(())
	}
}

impl fmt::Debug for DesiredState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let attributes: BTreeMap<&Attribute, &dyn fmt::Debug> = self
			.attributes
			.iter()
			.map(|(attr, value)| {
				let shown: &dyn fmt::Debug = if *attr == Attribute::InitialPassword { &"***" } else { value };
				(attr, shown)
			})
			.collect();
		f.debug_struct("DesiredState")
			.field("kind", &self.kind)
			.field("name", &self.name)
			.field("container", &self.container)
			.field("attributes", &attributes)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn kinds_parse_from_cli_spellings() {
		assert_eq!("Computer".parse::<ObjectKind>().unwrap(), ObjectKind::Computer);
		assert_eq!("organizational_unit".parse::<ObjectKind>().unwrap(), ObjectKind::OrganizationalUnit);
		assert!("printer".parse::<ObjectKind>().is_err());
		assert_eq!(serde_json::to_string(&ObjectKind::OrganizationalUnit).unwrap(), "\"ou\"");
	}

	#[test]
	fn attributes_parse_from_snake_or_property_names() {
		assert_eq!("description".parse::<Attribute>().unwrap(), Attribute::Description);
		assert_eq!("sam-account-name".parse::<Attribute>().unwrap(), Attribute::SamAccountName);
		assert_eq!("DNSHostName".parse::<Attribute>().unwrap(), Attribute::DnsHostName);
		assert!("colour".parse::<Attribute>().is_err());
	}

	#[test]
	fn guid_parses_braced_and_displays_hyphenated() {
		let guid: ObjectGuid = "{6F9619FF-8B86-D011-B42D-00C04FC964FF}".parse().unwrap();
		assert_eq!(guid.to_string(), "6f9619ff-8b86-d011-b42d-00c04fc964ff");
	}

	#[test]
	fn blank_text_matches_absence() {
		assert!(values_match(Attribute::Description, None, &AttrValue::text("")));
		assert!(!values_match(Attribute::Description, None, &AttrValue::text("x")));
		assert!(values_match(Attribute::GroupScope, Some(&AttrValue::text("global")), &AttrValue::text("Global")));
		assert!(!values_match(Attribute::Enabled, None, &AttrValue::Flag(false)));
	}

	#[test]
	fn validate_rejects_foreign_and_read_only_attributes() {
		let ou = DesiredState::new(ObjectKind::OrganizationalUnit, "Lab").with(Attribute::SamAccountName, "LAB$");
		assert!(matches!(ou.validate(), Err(ValidationError::Unsupported { .. })));

		let computer = DesiredState::new(ObjectKind::Computer, "WS01").with(Attribute::Sid, "S-1-5-21-1");
		assert_eq!(computer.validate(), Err(ValidationError::ReadOnly(Attribute::Sid)));

		let group = DesiredState::new(ObjectKind::Group, "Admins").with(Attribute::GroupScope, "Planetary");
		assert!(matches!(group.validate(), Err(ValidationError::OutOfRange { .. })));

		let user = DesiredState::new(ObjectKind::User, "jdoe").with(Attribute::Enabled, "yes");
		assert!(matches!(user.validate(), Err(ValidationError::WrongType { .. })));

		assert_eq!(DesiredState::new(ObjectKind::User, " ").validate(), Err(ValidationError::EmptyName));
	}

	#[test]
	fn desired_dn_is_derived_from_container_and_name() {
		let desired = DesiredState::new(ObjectKind::OrganizationalUnit, "Lab")
			.in_container(DistinguishedName::parse("DC=example,DC=com").unwrap());
		assert_eq!(desired.distinguished_name().unwrap().as_str(), "OU=Lab,DC=example,DC=com");
	}

	#[test]
	fn desired_state_debug_hides_initial_password() {
		let desired = DesiredState::new(ObjectKind::User, "jdoe").with(Attribute::InitialPassword, "Sup3r$ecret");
		let rendered = format!("{desired:?}");
		assert!(!rendered.contains("Sup3r$ecret"));
	}

	#[test]
	fn relocate_recomputes_distinguished_name() {
		let mut object = DirectoryObject {
			kind: ObjectKind::Computer,
			guid: ObjectGuid::new(Uuid::from_u128(1)),
			distinguished_name: DistinguishedName::parse("CN=WS01,CN=Computers,DC=example,DC=com").unwrap(),
			name: "WS01".to_string(),
			attributes: BTreeMap::new(),
		};
		let lab = DistinguishedName::parse("OU=Lab,DC=example,DC=com").unwrap();
		object.relocate(Some(&lab), "WS02");
		assert_eq!(object.distinguished_name.as_str(), "CN=WS02,OU=Lab,DC=example,DC=com");
		assert_eq!(object.name, "WS02");
	}
}
