//! Field-by-field diff between an observed object and its desired state.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::dn::DistinguishedName;
use crate::model::{AttrValue, Attribute, DesiredState, DirectoryObject, WriteMode, values_match};

/// Change to an attribute that needs its own cmdlet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedicatedChange {
	pub attribute: Attribute,
	pub from: Option<AttrValue>,
	pub to: AttrValue,
}

/// Mutations needed to converge one object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub move_to: Option<DistinguishedName>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub rename: Option<String>,
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub replace: BTreeMap<Attribute, String>,
	#[serde(skip_serializing_if = "BTreeSet::is_empty")]
	pub clear: BTreeSet<Attribute>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub dedicated: Vec<DedicatedChange>,
}

impl Plan {
	pub fn is_empty(&self) -> bool {
		self.move_to.is_none() && self.rename.is_none() && self.replace.is_empty() && self.clear.is_empty() && self.dedicated.is_empty()
	}

	/// Attributes this plan writes, in any group.
	pub fn changed_attributes(&self) -> Vec<Attribute> {
		let mut changed: Vec<Attribute> = self
			.replace
			.keys()
			.chain(self.clear.iter())
			.copied()
			.chain(self.dedicated.iter().map(|change| change.attribute))
			.collect();
		changed.sort();
		changed
	}
}

/// Computes the plan converging `current` onto `desired`.
///
/// Only attributes listed in `desired` are compared. Create-only and
/// read-only attributes never produce changes. The container is compared
/// only when `desired` manages it.
pub fn plan(current: &DirectoryObject, desired: &DesiredState) -> Plan {
	let mut plan = Plan::default();

	if let Some(target) = &desired.container {
		if current.container().as_ref() != Some(target) {
			plan.move_to = Some(target.clone());
		}
	}

	if current.name != desired.name {
		plan.rename = Some(desired.name.clone());
	}

	for (&attribute, value) in &desired.attributes {
		if values_match(attribute, current.get(attribute), value) {
			continue;
		}
		match attribute.write_mode() {
			WriteMode::Replace => match value {
				AttrValue::Text(text) if text.is_empty() => {
					plan.clear.insert(attribute);
				}
				AttrValue::Text(text) => {
					plan.replace.insert(attribute, text.clone());
				}
				AttrValue::Flag(_) => {}
			},
			WriteMode::Dedicated => plan.dedicated.push(DedicatedChange {
				attribute,
				from: current.get(attribute).cloned(),
				to: value.clone(),
			}),
			WriteMode::CreateOnly | WriteMode::ReadOnly => {}
		}
	}

	plan
}

/// The object as it will look once `plan` has been applied.
pub fn expected_object(current: &DirectoryObject, desired: &DesiredState, plan: &Plan) -> DirectoryObject {
	let mut expected = current.clone();
	if plan.move_to.is_some() || plan.rename.is_some() {
		expected.relocate(plan.move_to.as_ref(), &desired.name);
	}
	for (attribute, text) in &plan.replace {
		expected.attributes.insert(*attribute, AttrValue::Text(text.clone()));
	}
	for attribute in &plan.clear {
		expected.attributes.insert(*attribute, AttrValue::Text(String::new()));
	}
	for change in &plan.dedicated {
		expected.attributes.insert(change.attribute, change.to.clone());
	}
	expected
}
