//! PowerShell process transport.
//!
//! Each session is one long-lived PowerShell host. The host runs a bootstrap
//! script (passed with `-EncodedCommand`) that opens a `PSSession` to the
//! target, or runs scripts in-process when the host is configured as local,
//! then serves requests:
//!
//! 1. Connector spawns the host with connection parameters in its environment
//! 2. Bootstrap opens the remote session and writes the readiness frame (id 0)
//! 3. Each request is one JSON line on stdin carrying a base64 script
//! 4. The bootstrap runs the script and writes one response frame on stdout
//!
//! Response frames are prefixed with [`FRAME_PREFIX`] so that stray console
//! output from the host never desynchronizes the channel. Stderr is drained
//! into the log. The child is killed when the transport drops.

use std::process::Stdio;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dsctl_protocol::{READY_FRAME_ID, Request, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, trace};

use crate::config::HostConfig;
use crate::error::TransportError;
use crate::transport::{BoxFuture, Connector, Transport};

/// Marks lines written by the bootstrap as frames.
pub const FRAME_PREFIX: &str = "@@dsctl ";

const BOOTSTRAP: &str = r#"
$ErrorActionPreference = 'Stop'
$ProgressPreference = 'SilentlyContinue'
$WarningPreference = 'SilentlyContinue'

function Send-Frame($frame) {
    [Console]::Out.WriteLine('@@dsctl ' + ($frame | ConvertTo-Json -Compress -Depth 8))
    [Console]::Out.Flush()
}

function New-Fault($err) {
    @{
        message = $err.Exception.Message
        category = [string]$err.CategoryInfo.Category
        errorId = [string]$err.FullyQualifiedErrorId
    }
}

$session = $null
if ($env:DSCTL_LOCAL -ne '1') {
    $options = @{ ComputerName = $env:DSCTL_HOST; Authentication = $env:DSCTL_AUTH }
    if ($env:DSCTL_PORT) { $options.Port = [int]$env:DSCTL_PORT }
    if ($env:DSCTL_USE_SSL -eq '1') { $options.UseSSL = $true }
    try {
        if ($env:DSCTL_USERNAME) {
            $secret = ConvertTo-SecureString $env:DSCTL_PASSWORD -AsPlainText -Force
            $options.Credential = New-Object System.Management.Automation.PSCredential($env:DSCTL_USERNAME, $secret)
        }
        $session = New-PSSession @options
    } catch {
        Send-Frame @{ id = 0; ok = $false; fault = (New-Fault $_) }
        exit 1
    }
}
Remove-Item Env:DSCTL_PASSWORD -ErrorAction SilentlyContinue
Send-Frame @{ id = 0; ok = $true }

while ($null -ne ($line = [Console]::In.ReadLine())) {
    if ($line.Trim().Length -eq 0) { continue }
    $request = $line | ConvertFrom-Json
    try {
        $text = [Text.Encoding]::UTF8.GetString([Convert]::FromBase64String($request.payload))
        $block = [ScriptBlock]::Create("`$ErrorActionPreference = 'Stop'`n" + $text)
        if ($null -eq $session) {
            $output = @(& $block 6>$null)
        } else {
            $output = @(Invoke-Command -Session $session -ScriptBlock $block -ErrorAction Stop 6>$null)
        }
        Send-Frame @{ id = $request.id; ok = $true; records = $output }
    } catch {
        Send-Frame @{ id = $request.id; ok = $false; fault = (New-Fault $_) }
    }
}

if ($null -ne $session) { Remove-PSSession $session }
"#;

/// Encodes a script for `-EncodedCommand` (base64 of UTF-16LE).
pub fn encode_command(script: &str) -> String {
	let bytes: Vec<u8> = script.encode_utf16().flat_map(u16::to_le_bytes).collect();
	STANDARD.encode(bytes)
}

/// Parses one stdout line into a frame, or `None` for non-frame output.
fn parse_frame(line: &str) -> Option<Result<Response, TransportError>> {
	let body = line.trim_end().strip_prefix(FRAME_PREFIX)?;
	Some(serde_json::from_str(body).map_err(TransportError::from))
}

/// Connector spawning one PowerShell host per session.
#[derive(Debug, Clone, Default)]
pub struct PwshConnector;

impl PwshConnector {
	pub fn new() -> Self {
		Self
	}
}

impl Connector for PwshConnector {
	fn connect<'a>(&'a self, target: &'a HostConfig) -> BoxFuture<'a, Result<Box<dyn Transport>, TransportError>> {
		Box::pin(async move {
			let transport = PwshTransport::spawn(target).await?;
			Ok(Box::new(transport) as Box<dyn Transport>)
		})
	}
}

/// A running PowerShell host speaking the frame protocol.
pub struct PwshTransport {
	host: String,
	_child: Child,
	stdin: ChildStdin,
	stdout: Lines<BufReader<ChildStdout>>,
}

impl PwshTransport {
	/// Spawns the host and waits for its readiness frame.
	pub async fn spawn(target: &HostConfig) -> Result<Self, TransportError> {
		let mut command = Command::new(&target.shell);
		command
			.args(["-NoLogo", "-NoProfile", "-NonInteractive", "-EncodedCommand"])
			.arg(encode_command(BOOTSTRAP))
			.env("DSCTL_HOST", &target.address)
			.env("DSCTL_AUTH", target.authentication.as_powershell())
			.env("DSCTL_LOCAL", if target.local { "1" } else { "0" })
			.env("DSCTL_USE_SSL", if target.use_ssl { "1" } else { "0" })
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);
		if let Some(port) = target.port {
			command.env("DSCTL_PORT", port.to_string());
		}
		if let Some(username) = &target.username {
			command.env("DSCTL_USERNAME", username);
		}
		if let Some(password) = &target.password {
			command.env("DSCTL_PASSWORD", password.expose());
		}

		let mut child = command.spawn().map_err(|source| TransportError::Spawn {
			program: target.shell.clone(),
			source,
		})?;

		let stdin = child
			.stdin
			.take()
			.ok_or_else(|| TransportError::Closed("stdin was not captured".to_string()))?;
		let stdout = child
			.stdout
			.take()
			.ok_or_else(|| TransportError::Closed("stdout was not captured".to_string()))?;
		if let Some(stderr) = child.stderr.take() {
			let host = target.name.clone();
			tokio::spawn(async move {
				let mut lines = BufReader::new(stderr).lines();
				while let Ok(Some(line)) = lines.next_line().await {
					debug!(target = "dsctl.transport", host = %host, line = %line, "session host stderr");
				}
			});
		}

		let mut transport = Self {
			host: target.name.clone(),
			_child: child,
			stdin,
			stdout: BufReader::new(stdout).lines(),
		};

		let ready = transport.read_frame().await?;
		if ready.id != READY_FRAME_ID {
			return Err(TransportError::Handshake(format!("expected readiness frame, got frame {}", ready.id)));
		}
		if !ready.ok {
			let message = ready
				.fault
				.map(|fault| fault.message)
				.unwrap_or_else(|| "session host reported failure without details".to_string());
			return Err(TransportError::Handshake(message));
		}

		debug!(target = "dsctl.transport", host = %transport.host, "session host ready");
		Ok(transport)
	}

	async fn read_frame(&mut self) -> Result<Response, TransportError> {
		loop {
			let Some(line) = self.stdout.next_line().await? else {
				return Err(TransportError::Closed("session host exited".to_string()));
			};
			match parse_frame(&line) {
				Some(frame) => return frame,
				None if line.trim().is_empty() => {}
				None => trace!(target = "dsctl.transport", host = %self.host, line = %line, "ignoring non-frame output"),
			}
		}
	}
}

impl Transport for PwshTransport {
	fn send(&mut self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>> {
		Box::pin(async move {
			let mut line = serde_json::to_string(&request)?;
			line.push('\n');
			self.stdin.write_all(line.as_bytes()).await?;
			self.stdin.flush().await?;
			self.read_frame().await
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn encoded_command_is_utf16le_base64() {
		// `powershell -EncodedCommand` form of "dir"
		assert_eq!(encode_command("dir"), "ZABpAHIA");
	}

	#[test]
	fn frame_lines_require_prefix() {
		assert!(parse_frame("WARNING: something").is_none());
		assert!(parse_frame("{\"id\": 1, \"ok\": true}").is_none());

		let frame = parse_frame("@@dsctl {\"id\": 1, \"ok\": true, \"records\": []}\r").unwrap().unwrap();
		assert_eq!(frame.id, 1);
		assert!(frame.ok);
	}

	#[test]
	fn garbled_frame_is_a_serialization_error() {
		let err = parse_frame("@@dsctl {not json").unwrap().unwrap_err();
		assert!(matches!(err, TransportError::Serialization(_)));
	}

	#[test]
	fn bootstrap_writes_frames_with_the_shared_prefix() {
		assert!(BOOTSTRAP.contains(&format!("'{}'", FRAME_PREFIX)));
	}

	#[test]
	fn credential_failures_surface_as_handshake_faults() {
		let guarded = BOOTSTRAP.find("try {").unwrap();
		let credential = BOOTSTRAP.find("ConvertTo-SecureString").unwrap();
		let handshake_fault = BOOTSTRAP.find("Send-Frame @{ id = 0; ok = $false").unwrap();
		assert!(guarded < credential && credential < handshake_fault);
	}

	#[tokio::test]
	async fn missing_shell_is_a_spawn_error() {
		let mut target = HostConfig::new("dc1", "dc1.example.com");
		target.shell = "dsctl-definitely-not-a-shell".to_string();
		let err = PwshTransport::spawn(&target).await.err().unwrap();
		assert!(matches!(err, TransportError::Spawn { ref program, .. } if program == "dsctl-definitely-not-a-shell"));
	}
}
