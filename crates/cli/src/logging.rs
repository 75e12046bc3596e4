//! Diagnostic logging to stderr. Stdout carries only command results.

use tracing_subscriber::EnvFilter;

/// Filter used for a given `-v` count when `RUST_LOG` is unset.
pub fn default_directive(verbose: u8) -> &'static str {
	match verbose {
		0 => "warn",
		1 => "info",
		2 => "debug",
		_ => "trace",
	}
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `-v`.
pub fn init_logging(verbose: u8) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(verbose >= 2)
		.try_init();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn verbosity_raises_level() {
		assert_eq!(default_directive(0), "warn");
		assert_eq!(default_directive(1), "info");
		assert_eq!(default_directive(2), "debug");
		assert_eq!(default_directive(9), "trace");
	}
}
