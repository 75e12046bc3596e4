use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use dsctl::{DistinguishedName, ObjectGuid, ObjectKind};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "dsctl")]
#[command(about = "Reconcile directory computers, OUs, users, and groups over PowerShell remoting")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Configuration file (defaults to <config dir>/dsctl/config.json)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Target host name from the configuration (defaults to its default host)
	#[arg(long, global = true)]
	pub host: Option<String>,

	/// Per-operation timeout in milliseconds
	#[arg(long, global = true, value_name = "MS")]
	pub timeout_ms: Option<u64>,

	/// Output format
	#[arg(short, long, global = true, value_enum, default_value = "json")]
	pub format: OutputFormat,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Create an object and print it as the server reports it
	Create(DesiredArgs),

	/// Read an object by GUID
	Read(ObjectArgs),

	/// Converge an existing object onto the given state
	Update {
		#[arg(long)]
		guid: ObjectGuid,
		#[command(flatten)]
		desired: DesiredArgs,
	},

	/// Delete an object; absence counts as success
	#[command(alias = "rm")]
	Delete(ObjectArgs),

	/// Look up an existing object by distinguished name
	Import {
		#[arg(long)]
		kind: ObjectKind,
		#[arg(long)]
		dn: DistinguishedName,
	},

	/// Wait until an object is consistently reported absent
	ConfirmAbsent {
		#[command(flatten)]
		object: ObjectArgs,
		/// Consecutive NotFound lookups required
		#[arg(long)]
		confirmations: Option<u32>,
		/// Delay between lookups in milliseconds
		#[arg(long, value_name = "MS")]
		interval_ms: Option<u64>,
	},

	/// Open a session and report which domain it reaches
	Ping,
}

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Create(_) => "create",
			Commands::Read(_) => "read",
			Commands::Update { .. } => "update",
			Commands::Delete(_) => "delete",
			Commands::Import { .. } => "import",
			Commands::ConfirmAbsent { .. } => "confirm-absent",
			Commands::Ping => "ping",
		}
	}
}

#[derive(Args, Debug, Clone)]
pub struct ObjectArgs {
	/// computer, ou, user, or group
	#[arg(long)]
	pub kind: ObjectKind,
	#[arg(long)]
	pub guid: ObjectGuid,
}

#[derive(Args, Debug, Clone)]
pub struct DesiredArgs {
	/// computer, ou, user, or group
	#[arg(long)]
	pub kind: ObjectKind,

	/// Relative name (CN or OU value)
	#[arg(long)]
	pub name: String,

	/// Parent container DN; placement is left alone when omitted
	#[arg(long)]
	pub container: Option<DistinguishedName>,

	/// Attribute to manage, e.g. --attr description=web
	#[arg(long = "attr", value_name = "KEY=VALUE")]
	pub attributes: Vec<String>,
}
