//! Attribute/value records returned by successful scripts.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One output object: property name to JSON value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder-style insert.
	pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.0.insert(key.into(), value.into());
		self
	}

	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
		self.0.insert(key.into(), value.into());
	}

	/// Looks up a property, falling back to a case-insensitive match.
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0.get(key).or_else(|| {
			self.0
				.iter()
				.find(|(name, _)| name.eq_ignore_ascii_case(key))
				.map(|(_, value)| value)
		})
	}

	/// Returns the property as a string when it is a JSON string.
	pub fn text(&self, key: &str) -> Option<&str> {
		self.get(key).and_then(Value::as_str)
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.0.keys().map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<Map<String, Value>> for Record {
	fn from(map: Map<String, Value>) -> Self {
		Self(map)
	}
}

/// Ordered output of one script: zero or more records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuredOutput(Vec<Record>);

impl StructuredOutput {
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn from_records(records: Vec<Record>) -> Self {
		Self(records)
	}

	pub fn single(record: Record) -> Self {
		Self(vec![record])
	}

	/// Interprets the `records` field of a response frame.
	///
	/// `ConvertTo-Json` collapses single-element arrays and renders empty
	/// output as `null`, so a bare object and `null` are both accepted.
	pub fn from_value(value: Value) -> Result<Self, ShapeError> {
		match value {
			Value::Null => Ok(Self::empty()),
			Value::Object(map) => Ok(Self::single(Record(map))),
			Value::Array(items) => items
				.into_iter()
				.enumerate()
				.filter(|(_, item)| !item.is_null())
				.map(|(index, item)| match item {
					Value::Object(map) => Ok(Record(map)),
					other => Err(ShapeError::new(Some(index), &other)),
				})
				.collect::<Result<Vec<_>, _>>()
				.map(Self),
			other => Err(ShapeError::new(None, &other)),
		}
	}

	pub fn records(&self) -> &[Record] {
		&self.0
	}

	pub fn into_records(self) -> Vec<Record> {
		self.0
	}

	pub fn first(&self) -> Option<&Record> {
		self.0.first()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn to_value(&self) -> Value {
		Value::Array(self.0.iter().map(|record| Value::Object(record.0.clone())).collect())
	}
}

/// Output did not have the attribute/value record shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeError {
	index: Option<usize>,
	found: &'static str,
}

impl ShapeError {
	fn new(index: Option<usize>, value: &Value) -> Self {
		let found = match value {
			Value::Null => "null",
			Value::Bool(_) => "boolean",
			Value::Number(_) => "number",
			Value::String(_) => "string",
			Value::Array(_) => "array",
			Value::Object(_) => "object",
		};
		Self { index, found }
	}
}

impl fmt::Display for ShapeError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.index {
			Some(index) => write!(f, "expected record object at index {index}, found {}", self.found),
			None => write!(f, "expected record object or array, found {}", self.found),
		}
	}
}

impl std::error::Error for ShapeError {}
