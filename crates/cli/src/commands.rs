//! Command dispatch: configuration, one client per invocation, one envelope out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dsctl::{Attribute, AttrValue, ClientConfig, DesiredState, DirectoryClient};
use dsctl_runtime::{Connector, PwshConnector};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::cli::{Cli, Commands, DesiredArgs};
use crate::error::{CliError, Result};
use crate::output::{CommandResult, ResultBuilder};

/// `<config dir>/dsctl/config.json`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("dsctl").join("config.json"))
}

pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
	match explicit {
		Some(path) => Ok(path.to_path_buf()),
		None => default_config_path().ok_or_else(|| CliError::Config("no configuration directory on this platform; pass --config".to_string())),
	}
}

/// Parses repeated `--attr key=value` flags into a desired state.
pub fn desired_state(args: &DesiredArgs) -> Result<DesiredState> {
	let mut desired = DesiredState::new(args.kind, args.name.clone());
	if let Some(container) = &args.container {
		desired = desired.in_container(container.clone());
	}
	for raw in &args.attributes {
		let (key, value) = raw
			.split_once('=')
			.ok_or_else(|| CliError::InvalidInput(format!("expected KEY=VALUE, got `{raw}`")))?;
		let attribute: Attribute = key.parse().map_err(CliError::InvalidInput)?;
		let value = AttrValue::parse_for(attribute, value).map_err(CliError::InvalidInput)?;
		desired.set(attribute, value);
	}
	desired
		.validate()
		.map_err(|reason| CliError::InvalidInput(format!("{} '{}': {reason}", desired.kind, desired.name)))?;
	Ok(desired)
}

/// Runs `cli` against PowerShell remoting sessions.
pub async fn run(cli: Cli) -> CommandResult<Value> {
	run_with_connector(cli, Arc::new(PwshConnector::new())).await
}

pub async fn run_with_connector(cli: Cli, connector: Arc<dyn Connector>) -> CommandResult<Value> {
	let builder = ResultBuilder::new(cli.command.name());
	match execute(&cli, connector).await {
		Ok((host, data)) => builder.host(host).data(data).build(),
		Err(err) => {
			warn!(target = "dsctl", command = cli.command.name(), error = %err, "command failed");
			let builder = match &cli.host {
				Some(host) => builder.host(host.clone()),
				None => builder,
			};
			builder.error(err.code(), err.to_string()).build()
		}
	}
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
	load_config_with(cli, |name| std::env::var(name).ok())
}

/// Builds the invocation's configuration; `env` supplies credential overrides
/// for the host selected by `--host` (or the file's default host).
fn load_config_with(cli: &Cli, env: impl Fn(&str) -> Option<String>) -> Result<ClientConfig> {
	let path = resolve_config_path(cli.config.as_deref())?;
	let mut config = ClientConfig::load_for_host(&path, cli.host.as_deref(), env)?;
	if let Some(timeout_ms) = cli.timeout_ms {
		if timeout_ms == 0 {
			return Err(CliError::InvalidInput("--timeout-ms must be greater than zero".to_string()));
		}
		config.default_timeout_ms = timeout_ms;
	}
	if let Commands::ConfirmAbsent {
		confirmations, interval_ms, ..
	} = &cli.command
	{
		if let Some(confirmations) = confirmations {
			config.absence.confirmations = *confirmations;
		}
		if let Some(interval_ms) = interval_ms {
			config.absence.interval_ms = *interval_ms;
		}
	}
	Ok(config)
}

async fn execute(cli: &Cli, connector: Arc<dyn Connector>) -> Result<(String, Value)> {
	// Input errors are reported before any configuration or connection work.
	let desired = match &cli.command {
		Commands::Create(args) | Commands::Update { desired: args, .. } => Some(desired_state(args)?),
		_ => None,
	};

	let config = load_config(cli)?;
	let client = DirectoryClient::with_connector(&config, connector)?;
	let host = client.host().to_string();
	debug!(target = "dsctl", command = cli.command.name(), %host, "dispatching");

	let result = dispatch(&client, &cli.command, desired.as_ref()).await;
	client.close();
	result.map(|data| (host, data))
}

async fn dispatch(client: &DirectoryClient, command: &Commands, desired: Option<&DesiredState>) -> Result<Value> {
	let missing = || CliError::InvalidInput("desired state is required".to_string());

	let value = match command {
		Commands::Create(_) => {
			let object = client.create_object(desired.ok_or_else(missing)?, None).await?;
			serde_json::to_value(object)?
		}
		Commands::Read(target) => serde_json::to_value(client.read(target.kind, target.guid, None).await?)?,
		Commands::Update { guid, .. } => serde_json::to_value(client.update(*guid, desired.ok_or_else(missing)?, None).await?)?,
		Commands::Delete(target) => {
			let outcome = client.delete(target.kind, target.guid, None).await?;
			json!({ "outcome": outcome })
		}
		Commands::Import { kind, dn } => serde_json::to_value(client.import_by_dn(*kind, dn, None).await?)?,
		Commands::ConfirmAbsent { object, .. } => {
			let absent = client.confirm_absent(object.kind, object.guid, None).await?;
			json!({ "absent": absent })
		}
		Commands::Ping => {
			let output = client.ping(None).await?;
			json!({ "host": client.host(), "records": output.to_value() })
		}
	};
	Ok(value)
}

#[cfg(test)]
mod tests {
	use clap::Parser;
	use dsctl::ObjectKind;

	use super::*;

	fn desired_args(line: &[&str]) -> DesiredArgs {
		match Cli::try_parse_from(line).unwrap().command {
			Commands::Create(args) => args,
			other => panic!("unexpected command {other:?}"),
		}
	}

	#[test]
	fn attributes_parse_by_kind() {
		let args = desired_args(&[
			"dsctl",
			"create",
			"--kind",
			"user",
			"--name",
			"Jane Doe",
			"--attr",
			"sam_account_name=jdoe",
			"--attr",
			"Enabled=yes",
		]);
		let desired = desired_state(&args).unwrap();
		assert_eq!(desired.kind, ObjectKind::User);
		assert_eq!(desired.get(Attribute::Enabled), Some(&AttrValue::Flag(true)));
		assert_eq!(desired.get(Attribute::SamAccountName), Some(&AttrValue::text("jdoe")));
	}

	#[test]
	fn values_may_contain_equals_signs() {
		let args = desired_args(&["dsctl", "create", "--kind", "computer", "--name", "PC1", "--attr", "description=a=b"]);
		let desired = desired_state(&args).unwrap();
		assert_eq!(desired.get(Attribute::Description), Some(&AttrValue::text("a=b")));
	}

	#[test]
	fn bad_attributes_are_invalid_input() {
		for attr in ["description", "bogus=1", "enabled=maybe", "sid=S-1-5", "group_scope=Galactic"] {
			let args = desired_args(&["dsctl", "create", "--kind", "group", "--name", "G", "--attr", attr]);
			let err = desired_state(&args).unwrap_err();
			assert!(matches!(err, CliError::InvalidInput(_)), "{attr}: {err}");
		}
	}

	#[test]
	fn env_password_goes_to_the_selected_host() {
		use std::io::Write;

		let mut file = tempfile::NamedTempFile::new().unwrap();
		let json = r#"{"hosts": [{"name": "dc1", "address": "dc1.example.com"}, {"name": "dc2", "address": "dc2.example.com"}]}"#;
		file.write_all(json.as_bytes()).unwrap();
		let path = file.path().to_str().unwrap();

		let cli = Cli::try_parse_from(["dsctl", "--config", path, "--host", "dc2", "ping"]).unwrap();
		let config = load_config_with(&cli, |name| (name == "DSCTL_PASSWORD").then(|| "pw".to_string())).unwrap();
		assert_eq!(config.default_host.as_deref(), Some("dc2"));
		assert!(config.hosts[0].password.is_none());
		assert_eq!(config.hosts[1].password.as_ref().map(|secret| secret.expose()), Some("pw"));

		let cli = Cli::try_parse_from(["dsctl", "--config", path, "ping"]).unwrap();
		let config = load_config_with(&cli, |name| (name == "DSCTL_PASSWORD").then(|| "pw".to_string())).unwrap();
		assert!(config.hosts[0].password.is_some());
		assert!(config.hosts[1].password.is_none());
	}

	#[test]
	fn explicit_config_path_wins() {
		let path = resolve_config_path(Some(Path::new("/etc/dsctl.json"))).unwrap();
		assert_eq!(path, PathBuf::from("/etc/dsctl.json"));
	}
}
