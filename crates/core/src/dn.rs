//! Distinguished names.
//!
//! A DN is kept as the string the directory returned. Structure is parsed on
//! demand: components are split on unescaped commas, values are escaped per
//! RFC 4514 when composing, and comparison ignores case and the whitespace
//! around separators, matching how the directory itself compares DNs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnError {
	#[error("distinguished name is empty")]
	Empty,
	#[error("component `{0}` is not of the form attribute=value")]
	InvalidComponent(String),
	#[error("distinguished name ends inside an escape sequence")]
	DanglingEscape,
}

/// A distinguished name such as `CN=WS01,OU=Workstations,DC=example,DC=com`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DistinguishedName(String);

impl DistinguishedName {
	pub fn parse(value: impl Into<String>) -> Result<Self, DnError> {
		let value = value.into();
		let trimmed = value.trim();
		if trimmed.is_empty() {
			return Err(DnError::Empty);
		}
		for component in split_components(trimmed)? {
			let valid = component
				.split_once('=')
				.is_some_and(|(attr, _)| !attr.trim().is_empty());
			if !valid {
				return Err(DnError::InvalidComponent(component.to_string()));
			}
		}
		Ok(Self(trimmed.to_string()))
	}

	/// Builds `attr=value,container` with `value` escaped.
	pub fn child_of(container: &DistinguishedName, attr: &str, value: &str) -> Self {
		Self(format!("{attr}={},{}", escape_value(value), container.0))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Unescaped value of the leading component.
	pub fn rdn_value(&self) -> String {
		let first = self.components().into_iter().next().unwrap_or_default();
		let raw = first.split_once('=').map(|(_, value)| value).unwrap_or(first);
		unescape_value(raw.trim())
	}

	/// Attribute type of the leading component (`CN`, `OU`, ...).
	pub fn rdn_attribute(&self) -> &str {
		let first = self.components().into_iter().next().unwrap_or_default();
		first.split_once('=').map(|(attr, _)| attr.trim()).unwrap_or_default()
	}

	/// The DN of the enclosing container, or `None` for a naming context root component.
	pub fn container(&self) -> Option<DistinguishedName> {
		let components = self.components();
		if components.len() < 2 {
			return None;
		}
		let rest = components[1..].join(",");
		Some(Self(rest.trim().to_string()))
	}

	/// Whether `self` lies somewhere below `ancestor`.
	pub fn is_descendant_of(&self, ancestor: &DistinguishedName) -> bool {
		let own = self.normalized_components();
		let theirs = ancestor.normalized_components();
		own.len() > theirs.len() && own.ends_with(&theirs)
	}

	fn components(&self) -> Vec<&str> {
		// Stored values passed parse(), so splitting cannot fail.
		split_components(&self.0).unwrap_or_else(|_| vec![self.0.as_str()])
	}

	fn normalized_components(&self) -> Vec<String> {
		self.components().into_iter().map(normalize_component).collect()
	}

	/// Canonical form used for comparison.
	pub fn normalized(&self) -> String {
		self.normalized_components().join(",")
	}
}

impl PartialEq for DistinguishedName {
	fn eq(&self, other: &Self) -> bool {
		self.normalized() == other.normalized()
	}
}

impl Eq for DistinguishedName {}

impl fmt::Debug for DistinguishedName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "DistinguishedName({:?})", self.0)
	}
}

impl fmt::Display for DistinguishedName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for DistinguishedName {
	type Err = DnError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl TryFrom<String> for DistinguishedName {
	type Error = DnError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::parse(value)
	}
}

impl From<DistinguishedName> for String {
	fn from(dn: DistinguishedName) -> Self {
		dn.0
	}
}

fn split_components(dn: &str) -> Result<Vec<&str>, DnError> {
	let mut components = Vec::new();
	let mut start = 0;
	let mut escaped = false;
	for (index, ch) in dn.char_indices() {
		match ch {
			_ if escaped => escaped = false,
			'\\' => escaped = true,
			',' => {
				components.push(&dn[start..index]);
				start = index + 1;
			}
			_ => {}
		}
	}
	if escaped {
		return Err(DnError::DanglingEscape);
	}
	components.push(&dn[start..]);
	Ok(components)
}

/// Lowercases the attribute and re-escapes the value canonically, so `\,` and
/// `\2C` compare equal while an escaped edge space survives.
fn normalize_component(component: &str) -> String {
	match component.split_once('=') {
		Some((attr, value)) => {
			let value = unescape_value(trim_unescaped(value)).to_lowercase();
			format!("{}={}", attr.trim().to_lowercase(), escape_value(&value))
		}
		None => component.trim().to_lowercase(),
	}
}

/// Trims surrounding whitespace that is not part of an escape sequence.
fn trim_unescaped(value: &str) -> &str {
	let mut value = value.trim_start();
	while let Some(last) = value.chars().next_back().filter(|ch| ch.is_whitespace()) {
		let rest = &value[..value.len() - last.len_utf8()];
		let backslashes = rest.chars().rev().take_while(|&ch| ch == '\\').count();
		if backslashes % 2 == 1 {
			break;
		}
		value = rest;
	}
	value
}

/// Escapes an attribute value for use inside a DN (RFC 4514 section 2.4).
pub fn escape_value(value: &str) -> String {
	let count = value.chars().count();
	let mut escaped = String::with_capacity(value.len() + 4);
	for (index, ch) in value.chars().enumerate() {
		match ch {
			',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
				escaped.push('\\');
				escaped.push(ch);
			}
			'\0' => escaped.push_str("\\00"),
			' ' if index == 0 || index + 1 == count => escaped.push_str("\\20"),
			'#' if index == 0 => escaped.push_str("\\23"),
			_ => escaped.push(ch),
		}
	}
	escaped
}

/// Reverses [`escape_value`], including `\XX` hex pairs.
pub fn unescape_value(value: &str) -> String {
	let mut bytes = Vec::with_capacity(value.len());
	let mut chars = value.char_indices().peekable();
	while let Some((index, ch)) = chars.next() {
		if ch != '\\' {
			let mut buf = [0u8; 4];
			bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
			continue;
		}
		let hex = value.get(index + 1..index + 3).and_then(|pair| u8::from_str_radix(pair, 16).ok());
		match hex {
			Some(byte) => {
				bytes.push(byte);
				chars.next();
				chars.next();
			}
			None => {
				if let Some((_, next)) = chars.next() {
					let mut buf = [0u8; 4];
					bytes.extend_from_slice(next.encode_utf8(&mut buf).as_bytes());
				}
			}
		}
	}
	String::from_utf8_lossy(&bytes).into_owned()
}
