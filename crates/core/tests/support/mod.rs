//! In-memory directory that executes payloads by interpreting their operations.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use dsctl::{
	AttrValue, Attribute, DirectoryObject, DistinguishedName, Executor, ObjectGuid, ObjectKind, Operation, Payload, Record, RemoteError,
	StructuredOutput,
};
use dsctl_runtime::BoxFuture;
use uuid::Uuid;

pub struct InMemoryDirectory {
	naming_context: DistinguishedName,
	containers: Vec<DistinguishedName>,
	objects: BTreeMap<ObjectGuid, DirectoryObject>,
	next_id: u128,
	log: Vec<Operation>,
}

impl InMemoryDirectory {
	pub fn new(naming_context: &str) -> Self {
		let naming_context = dn(naming_context);
		let containers = vec![
			naming_context.clone(),
			DistinguishedName::child_of(&naming_context, "CN", "Computers"),
			DistinguishedName::child_of(&naming_context, "CN", "Users"),
		];
		Self {
			naming_context,
			containers,
			objects: BTreeMap::new(),
			next_id: 0x1000,
			log: Vec::new(),
		}
	}

	pub fn naming_context(&self) -> &DistinguishedName {
		&self.naming_context
	}

	pub fn log(&self) -> &[Operation] {
		&self.log
	}

	pub fn take_log(&mut self) -> Vec<Operation> {
		std::mem::take(&mut self.log)
	}

	pub fn mutations(&self) -> Vec<&'static str> {
		self.log.iter().filter(|op| op.is_mutation()).map(Operation::name).collect()
	}

	pub fn object(&self, guid: &ObjectGuid) -> Option<&DirectoryObject> {
		self.objects.get(guid)
	}

	/// Deletes an object behind the client's back.
	pub fn remove_out_of_band(&mut self, guid: &ObjectGuid) -> Option<DirectoryObject> {
		self.objects.remove(guid)
	}

	/// Edits an attribute behind the client's back.
	pub fn set_out_of_band(&mut self, guid: &ObjectGuid, attribute: Attribute, value: AttrValue) {
		if let Some(object) = self.objects.get_mut(guid) {
			object.attributes.insert(attribute, value);
		}
	}

	fn not_found(&self, identity: impl std::fmt::Display) -> RemoteError {
		RemoteError::not_found(format!(
			"Cannot find an object with identity: '{identity}' under: '{}'.",
			self.naming_context
		))
	}

	fn container_exists(&self, container: &DistinguishedName) -> bool {
		self.containers.contains(container)
			|| self
				.objects
				.values()
				.any(|object| object.kind == ObjectKind::OrganizationalUnit && &object.distinguished_name == container)
	}

	fn find_by_dn(&self, dn: &DistinguishedName) -> Option<&DirectoryObject> {
		self.objects.values().find(|object| &object.distinguished_name == dn)
	}

	fn get_mut(&mut self, guid: &ObjectGuid) -> Result<&mut DirectoryObject, RemoteError> {
		let missing = self.not_found(guid);
		self.objects.get_mut(guid).ok_or(missing)
	}

	fn default_container(&self, kind: ObjectKind) -> DistinguishedName {
		match kind {
			ObjectKind::Computer => self.containers[1].clone(),
			ObjectKind::User | ObjectKind::Group => self.containers[2].clone(),
			ObjectKind::OrganizationalUnit => self.naming_context.clone(),
		}
	}

	/// Moves or renames `guid`, carrying descendants along.
	fn relocate(&mut self, guid: &ObjectGuid, container: Option<&DistinguishedName>, name: Option<&str>) -> Result<(), RemoteError> {
		let object = self.get_mut(guid)?;
		let old = object.distinguished_name.clone();
		let name = name.map(str::to_string).unwrap_or_else(|| object.name.clone());
		object.relocate(container, &name);
		let new = object.distinguished_name.clone();

		let suffix = format!(",{}", old.normalized());
		for other in self.objects.values_mut() {
			let normalized = other.distinguished_name.normalized();
			if let Some(prefix_len) = normalized.strip_suffix(&suffix).map(str::len) {
				let raw = other.distinguished_name.as_str();
				let head = raw.split_at(prefix_len.min(raw.len())).0;
				other.distinguished_name = dn(&format!("{head},{new}"));
			}
		}
		Ok(())
	}

	fn apply(&mut self, operation: &Operation) -> Result<StructuredOutput, RemoteError> {
		match operation {
			Operation::Create {
				kind,
				name,
				container,
				attributes,
			} => {
				let container = container.clone().unwrap_or_else(|| self.default_container(*kind));
				if !self.container_exists(&container) {
					return Err(RemoteError::not_found(format!("Directory object not found: {container}")));
				}
				let dn = DistinguishedName::child_of(&container, kind.rdn_attribute(), name);
				if self.find_by_dn(&dn).is_some() {
					return Err(RemoteError::already_exists("An attempt was made to add an object to the directory with a name that is already in use"));
				}
				if let Some(sam) = attributes.get(&Attribute::SamAccountName) {
					if self.objects.values().any(|object| object.get(Attribute::SamAccountName) == Some(sam)) {
						return Err(RemoteError::already_exists("The specified account already exists"));
					}
				}

				self.next_id += 1;
				let guid = ObjectGuid::new(Uuid::from_u128(self.next_id));
				let mut stored = BTreeMap::new();
				for attribute in kind.attributes().iter().copied().filter(|attr| attr.is_observable()) {
					let initial = match attribute {
						Attribute::Sid => AttrValue::text(format!("S-1-5-21-3623811015-3361044348-30300820-{}", self.next_id)),
						Attribute::Enabled => AttrValue::Flag(false),
						Attribute::Protected => AttrValue::Flag(true),
						_ => AttrValue::text(""),
					};
					stored.insert(attribute, attributes.get(&attribute).cloned().unwrap_or(initial));
				}
				let object = DirectoryObject {
					kind: *kind,
					guid,
					distinguished_name: dn,
					name: name.clone(),
					attributes: stored,
				};
				let record = to_record(&object);
				self.objects.insert(guid, object);
				Ok(StructuredOutput::single(record))
			}
			Operation::LookupById { kind, guid } => match self.objects.get(guid) {
				Some(object) if object.kind == *kind => Ok(StructuredOutput::single(to_record(object))),
				_ => Err(self.not_found(guid)),
			},
			Operation::LookupByDn { kind, dn } => match self.find_by_dn(dn) {
				Some(object) if object.kind == *kind => Ok(StructuredOutput::single(to_record(object))),
				_ => Err(self.not_found(dn)),
			},
			Operation::Move { guid, target, .. } => {
				if !self.container_exists(target) {
					return Err(RemoteError::not_found(format!("Directory object not found: {target}")));
				}
				self.relocate(guid, Some(target), None)?;
				Ok(StructuredOutput::empty())
			}
			Operation::Rename { guid, name, .. } => {
				self.relocate(guid, None, Some(name))?;
				Ok(StructuredOutput::empty())
			}
			Operation::Replace { guid, replace, clear, .. } => {
				let object = self.get_mut(guid)?;
				for (attribute, value) in replace {
					object.attributes.insert(*attribute, AttrValue::text(value.clone()));
				}
				for attribute in clear {
					object.attributes.insert(*attribute, AttrValue::text(""));
				}
				Ok(StructuredOutput::empty())
			}
			Operation::SetDedicated { guid, attribute, value, .. } => {
				let object = self.get_mut(guid)?;
				object.attributes.insert(*attribute, value.clone());
				Ok(StructuredOutput::empty())
			}
			Operation::Delete { guid, .. } => {
				let object = self.objects.get(guid).ok_or_else(|| self.not_found(guid))?;
				let dn = object.distinguished_name.clone();
				if self.objects.values().any(|other| other.distinguished_name.is_descendant_of(&dn)) {
					return Err(RemoteError::other("The directory service can perform the requested operation only on a leaf object."));
				}
				self.objects.remove(guid);
				Ok(StructuredOutput::empty())
			}
			Operation::Ping => Ok(StructuredOutput::single(
				Record::new().with("DNSRoot", "example.com").with("ComputerName", "DC01"),
			)),
		}
	}
}

impl Executor for InMemoryDirectory {
	fn execute<'a>(&'a mut self, payload: &'a Payload, _timeout: Duration) -> BoxFuture<'a, Result<StructuredOutput, RemoteError>> {
		self.log.push(payload.operation.clone());
		let result = self.apply(&payload.operation);
		Box::pin(async move { result })
	}
}

/// Renders an object the way the lookup projection does.
pub fn to_record(object: &DirectoryObject) -> Record {
	let mut record = Record::new()
		.with("ObjectGUID", object.guid.to_string())
		.with("DistinguishedName", object.distinguished_name.as_str())
		.with("Name", object.name.as_str());
	for (attribute, value) in &object.attributes {
		match value {
			AttrValue::Flag(flag) => record.insert(attribute.property(), *flag),
			AttrValue::Text(text) => record.insert(attribute.property(), text.as_str()),
		}
	}
	record
}

pub fn dn(value: &str) -> DistinguishedName {
	DistinguishedName::parse(value).expect("test DN should parse")
}
