use std::io::{self, Write};
use std::time::Instant;

use serde::Serialize;

use crate::output::format::OutputFormat;
use crate::output::model::{CommandError, CommandResult, ErrorCode};

/// Builder for constructing command results.
pub struct ResultBuilder<T: Serialize> {
	command: String,
	host: Option<String>,
	data: Option<T>,
	error: Option<CommandError>,
	start_time: Instant,
}

impl<T: Serialize> ResultBuilder<T> {
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			host: None,
			data: None,
			error: None,
			start_time: Instant::now(),
		}
	}

	pub fn host(mut self, host: impl Into<String>) -> Self {
		self.host = Some(host.into());
		self
	}

	pub fn data(mut self, data: T) -> Self {
		self.data = Some(data);
		self
	}

	pub fn error(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
		self.error = Some(CommandError {
			code,
			message: message.into(),
			retryable: code.is_retryable(),
		});
		self
	}

	pub fn build(self) -> CommandResult<T> {
		CommandResult {
			ok: self.error.is_none() && self.data.is_some(),
			command: self.command,
			host: self.host,
			data: self.data,
			error: self.error,
			duration_ms: Some(self.start_time.elapsed().as_millis() as u64),
		}
	}
}

/// Writes a command result to stdout in the given format.
pub fn print_result<T: Serialize>(result: &CommandResult<T>, format: OutputFormat) -> anyhow::Result<()> {
	let mut stdout = io::stdout().lock();
	match format {
		OutputFormat::Json => writeln!(stdout, "{}", serde_json::to_string_pretty(result)?)?,
		OutputFormat::Ndjson => writeln!(stdout, "{}", serde_json::to_string(result)?)?,
		OutputFormat::Toon => writeln!(stdout, "{}", toon::encode(&serde_json::to_value(result)?, None))?,
		OutputFormat::Text => write_text(&mut stdout, result)?,
	}
	Ok(())
}

fn write_text<T: Serialize>(out: &mut impl Write, result: &CommandResult<T>) -> anyhow::Result<()> {
	if let Some(error) = &result.error {
		writeln!(out, "Error [{}]: {}", error.code, error.message)?;
	} else if let Some(data) = &result.data {
		writeln!(out, "{}", serde_json::to_string_pretty(data)?)?;
	}
	if let Some(duration_ms) = result.duration_ms {
		writeln!(out, "Completed {} in {duration_ms}ms", result.command)?;
	}
	Ok(())
}

#[cfg(test)]
pub(crate) fn render_text<T: Serialize>(result: &CommandResult<T>) -> String {
	let mut buffer = Vec::new();
	write_text(&mut buffer, result).expect("writing to a Vec cannot fail");
	String::from_utf8(buffer).expect("output is UTF-8")
}
