//! Full command runs against a fake host, configured from a temporary file.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use dsctl_cli::cli::Cli;
use dsctl_cli::commands::run_with_connector;
use dsctl_cli::output::ErrorCode;
use dsctl_runtime::Fault;
use dsctl_runtime::fake::{FakeConnector, FakeReply};
use serde_json::{Value, json};
use tempfile::NamedTempFile;

const GUID: &str = "5b0d1f0e-2f7a-4c1b-8f4e-1d2c3b4a5968";

fn config_file() -> NamedTempFile {
	let mut file = NamedTempFile::new().unwrap();
	let config = json!({
		"hosts": [
			{ "name": "dc1", "address": "dc1.example.com" },
			{ "name": "dc2", "address": "dc2.example.com" }
		],
		"pool": { "maxSessionsPerHost": 1 },
		"absence": { "confirmations": 5, "intervalMs": 1 }
	});
	file.write_all(config.to_string().as_bytes()).unwrap();
	file
}

fn computer_record() -> Value {
	json!({
		"ObjectGUID": GUID,
		"DistinguishedName": "CN=TESTCOMPUTER,CN=Computers,DC=example,DC=com",
		"Name": "TESTCOMPUTER",
		"SamAccountName": "TESTCOMPUTER$"
	})
}

fn not_found() -> FakeReply {
	FakeReply::Fault(Fault::new(format!("Cannot find an object with identity: '{GUID}'")))
}

async fn run(fake: &FakeConnector, args: &[&str]) -> Value {
	let config = config_file();
	let path = config.path().to_str().unwrap().to_string();
	let mut line = vec!["dsctl", "--config", path.as_str(), "--timeout-ms", "500"];
	line.extend_from_slice(args);
	let cli = Cli::try_parse_from(line).unwrap();
	let result = run_with_connector(cli, Arc::new(fake.clone())).await;
	serde_json::to_value(&result).unwrap()
}

#[tokio::test]
async fn read_absent_object() {
	let fake = FakeConnector::new(|_| not_found());
	let out = run(&fake, &["read", "--kind", "computer", "--guid", GUID]).await;
	assert_eq!(out["ok"], true);
	assert_eq!(out["command"], "read");
	assert_eq!(out["host"], "dc1");
	assert_eq!(out["data"]["state"], "absent");
}

#[tokio::test]
async fn read_present_object() {
	let fake = FakeConnector::new(|_| FakeReply::Records(computer_record()));
	let out = run(&fake, &["read", "--kind", "computer", "--guid", GUID]).await;
	assert_eq!(out["data"]["state"], "present");
	assert_eq!(out["data"]["object"]["name"], "TESTCOMPUTER");
	assert_eq!(out["data"]["object"]["guid"], GUID);
}

#[tokio::test]
async fn host_flag_selects_host() {
	let fake = FakeConnector::new(|_| FakeReply::Records(json!({"DNSRoot": "example.com"})));
	let out = run(&fake, &["--host", "dc2", "ping"]).await;
	assert_eq!(out["ok"], true);
	assert_eq!(out["data"]["host"], "dc2");
	assert_eq!(fake.calls()[0].host, "dc2");
}

#[tokio::test]
async fn unknown_host_is_a_config_error() {
	let fake = FakeConnector::empty();
	let out = run(&fake, &["--host", "dc9", "ping"]).await;
	assert_eq!(out["ok"], false);
	assert_eq!(out["error"]["code"], "CONFIG_ERROR");
	assert_eq!(fake.connects(), 0);
}

#[tokio::test]
async fn update_of_missing_object_reports_drift() {
	let fake = FakeConnector::new(|_| not_found());
	let out = run(
		&fake,
		&["update", "--guid", GUID, "--kind", "computer", "--name", "TESTCOMPUTER", "--attr", "description=x"],
	)
	.await;
	assert_eq!(out["ok"], false);
	assert_eq!(out["error"]["code"], "DRIFT");
	assert_eq!(out["error"]["retryable"], false);
}

#[tokio::test]
async fn invalid_attribute_fails_before_connecting() {
	let fake = FakeConnector::empty();
	let out = run(&fake, &["create", "--kind", "ou", "--name", "Staff", "--attr", "sam_account_name=x"]).await;
	assert_eq!(out["error"]["code"], "INVALID_INPUT");
	assert_eq!(fake.connects(), 0);
}

#[tokio::test]
async fn delete_then_confirm_absent() {
	let fake = FakeConnector::new(|_| not_found());
	let out = run(&fake, &["delete", "--kind", "computer", "--guid", GUID]).await;
	assert_eq!(out["data"]["outcome"], "alreadyAbsent");

	let out = run(&fake, &["confirm-absent", "--kind", "computer", "--guid", GUID, "--confirmations", "2"]).await;
	assert_eq!(out["data"]["absent"], true);
}

#[tokio::test]
async fn transient_failure_is_retryable() {
	let fake = FakeConnector::new(|_| FakeReply::Hang);
	let out = run(&fake, &["read", "--kind", "computer", "--guid", GUID]).await;
	assert_eq!(out["error"]["code"], "TRANSIENT");
	assert_eq!(out["error"]["retryable"], true);
}

#[tokio::test]
async fn missing_config_file_is_reported() {
	let cli = Cli::try_parse_from(["dsctl", "--config", "/nonexistent/dsctl.json", "ping"]).unwrap();
	let result = run_with_connector(cli, Arc::new(FakeConnector::empty())).await;
	assert!(!result.ok);
	assert_eq!(result.error.map(|err| err.code), Some(ErrorCode::ConfigError));
}
