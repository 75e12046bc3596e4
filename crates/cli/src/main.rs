use clap::Parser;
use dsctl_cli::{cli::Cli, commands, logging, output};
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let format = cli.format;
	let result = commands::run(cli).await;
	if let Err(err) = output::print_result(&result, format) {
		error!(target = "dsctl", error = %err, "failed to write result");
		std::process::exit(1);
	}
	if !result.ok {
		std::process::exit(1);
	}
}
