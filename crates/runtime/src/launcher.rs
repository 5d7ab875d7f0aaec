//! Server process launch.
//!
//! The server runs as a detached child process. Its output goes to two
//! per-user log files in the temp directory, named deterministically so
//! repeated launches overwrite rather than accumulate them, and the pid of
//! the launching process is written to a third file for diagnosis.
//!
//! Readiness is not awaited here: the connection manager infers it from
//! socket connectability.

use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::LazyLock;
use std::time::{Duration, SystemTime};

use anchors_protocol::Hyperparameters;
use async_trait::async_trait;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifact::ArtifactLocation;
use crate::config::{RuntimeConfig, names};
use crate::error::{Error, Result};
use crate::locator::JavaRuntime;

/// Seconds the server idles without a client before terminating itself.
pub const SERVER_IDLE_TIMEOUT_SECS: u32 = 30;

/// Maximum heap used when a Client VM is detected and no explicit maximum was given.
pub const CLIENT_VM_MAX_HEAP: &str = "1g";

/// Main class used when extra classpath entries replace `-jar`.
pub const DEFAULT_MAIN_CLASS: &str = "de.viadee.xai.anchor.server.AnchorServer";

static MEMORY_SIZE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[0-9]+[kKmMgG]?$").ok());

/// Caller-tunable launch settings; host, port and name come from the connect request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LaunchOptions {
	/// Initial heap, e.g. `512m`.
	pub min_mem: Option<String>,
	/// Maximum heap, e.g. `4g`.
	pub max_mem: Option<String>,
	/// Extra classpath entries appended after the artifact.
	pub extra_classpath: Vec<PathBuf>,
	/// Main class used with `extra_classpath`; defaults to [`DEFAULT_MAIN_CLASS`].
	pub main_class: Option<String>,
	/// Algorithm settings forwarded verbatim.
	pub params: Hyperparameters,
}

/// Immutable description of one server launch.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
	ip: String,
	port: u16,
	name: String,
	options: LaunchOptions,
}

impl LaunchSpec {
	/// Validates memory bounds and builds the spec.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidArgument`] for malformed memory sizes, an empty main class,
	/// or a classpath entry containing the platform path separator.
	pub fn new(ip: impl Into<String>, port: u16, name: impl Into<String>, options: LaunchOptions) -> Result<Self> {
		for (label, value) in [("min_mem", &options.min_mem), ("max_mem", &options.max_mem)] {
			if let Some(value) = value {
				if !is_memory_size(value) {
					return Err(Error::InvalidArgument(format!(
						"{label} must look like 512m, 4g or 1048576, got '{value}'"
					)));
				}
			}
		}
		if options.main_class.as_deref().is_some_and(|c| c.trim().is_empty()) {
			return Err(Error::InvalidArgument("main_class must not be empty".to_string()));
		}
		if let Err(e) = std::env::join_paths(&options.extra_classpath) {
			return Err(Error::InvalidArgument(format!("extra_classpath cannot be joined: {e}")));
		}

		Ok(Self {
			ip: ip.into(),
			port,
			name: name.into(),
			options,
		})
	}

	pub fn ip(&self) -> &str {
		&self.ip
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn options(&self) -> &LaunchOptions {
		&self.options
	}
}

/// A server process started by this client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessRecord {
	pub pid: u32,
	/// Session name the server was started for.
	pub name: String,
	/// Port passed to the server.
	pub port: u16,
	#[serde(skip)]
	pub started_at: SystemTime,
}

/// Starts the server process.
#[async_trait]
pub trait Launcher: Send + Sync {
	/// Spawns the server in the background.
	///
	/// # Errors
	///
	/// Returns [`Error::LaunchFailed`] if the process cannot be spawned or exits immediately
	/// with a non-zero status.
	async fn launch(&self, spec: &LaunchSpec, artifact: &ArtifactLocation, runtime: &JavaRuntime) -> Result<ProcessRecord>;
}

/// Per-user files receiving server output and the launcher pid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFiles {
	pub stdout: PathBuf,
	pub stderr: PathBuf,
	pub pid: PathBuf,
}

impl LogFiles {
	/// `<dir>/anchors_<user>_server.out`, `.err` and `anchors_<user>_client.pid`.
	pub fn for_user(dir: &Path, user: &str) -> Self {
		let base = format!("{}_{user}", names::PREFIX);
		Self {
			stdout: dir.join(format!("{base}_server.out")),
			stderr: dir.join(format!("{base}_server.err")),
			pid: dir.join(format!("{base}_client.pid")),
		}
	}
}

/// Launches the server with `java`.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
	logs: LogFiles,
	exit_check: Duration,
}

impl ProcessLauncher {
	pub fn new(logs: LogFiles, exit_check: Duration) -> Self {
		Self { logs, exit_check }
	}

	/// Log files in the configured temp directory, named after the configured user.
	pub fn from_config(config: &RuntimeConfig, exit_check: Duration) -> Self {
		Self::new(LogFiles::for_user(&config.temp_dir, &config.user), exit_check)
	}

	pub fn logs(&self) -> &LogFiles {
		&self.logs
	}
}

#[async_trait]
impl Launcher for ProcessLauncher {
	async fn launch(&self, spec: &LaunchSpec, artifact: &ArtifactLocation, runtime: &JavaRuntime) -> Result<ProcessRecord> {
		let args = build_args(spec, artifact, runtime)?;

		let stdout = create_log(&self.logs.stdout)?;
		let stderr = create_log(&self.logs.stderr)?;

		let mut cmd = Command::new(&runtime.executable);
		cmd.args(&args).stdin(Stdio::null()).stdout(stdout).stderr(stderr);
		detach(&mut cmd);

		info!(
			target = "anchors",
			java = %runtime.executable.display(),
			jar = %artifact.path.display(),
			port = spec.port(),
			stdout = %self.logs.stdout.display(),
			stderr = %self.logs.stderr.display(),
			"Launching anchors server"
		);

		let mut child = cmd
			.spawn()
			.map_err(|e| Error::LaunchFailed(format!("failed to spawn {}: {e}", runtime.executable.display())))?;

		if let Err(e) = std::fs::write(&self.logs.pid, std::process::id().to_string()) {
			warn!(target = "anchors", path = %self.logs.pid.display(), error = %e, "could not write pid file");
		}

		tokio::time::sleep(self.exit_check).await;

		match child.try_wait() {
			Ok(Some(status)) if !status.success() => {
				return Err(Error::LaunchFailed(format!(
					"server process exited immediately with {status}; see {}",
					self.logs.stderr.display()
				)));
			}
			Ok(Some(status)) => {
				warn!(target = "anchors", %status, "server process exited right after launch");
			}
			Ok(None) => {}
			Err(e) => {
				return Err(Error::LaunchFailed(format!("failed to check process status: {e}")));
			}
		}

		let record = ProcessRecord {
			pid: child.id(),
			name: spec.name().to_string(),
			port: spec.port(),
			started_at: SystemTime::now(),
		};
		reap(child);
		Ok(record)
	}
}

/// Waits on the child in the background so it never lingers as a zombie.
fn reap(mut child: Child) {
	let pid = child.id();
	let spawned = std::thread::Builder::new().name(format!("anchors-reap-{pid}")).spawn(move || match child.wait() {
		Ok(status) => debug!(target = "anchors", pid, %status, "server process exited"),
		Err(e) => warn!(target = "anchors", pid, error = %e, "failed to wait on server process"),
	});
	if let Err(e) = spawned {
		warn!(target = "anchors", pid, error = %e, "could not start reaper thread");
	}
}

/// Composes the server argv (excluding the `java` executable).
///
/// `[-Xms<min>] [-Xmx<max>] -jar <artifact> -port <port> -timeout 30 <hyperparameters>`
///
/// With extra classpath entries, `-jar <artifact>` becomes
/// `-cp <artifact><sep><entries> <main class>`.
///
/// # Errors
///
/// Returns [`Error::LaunchFailed`] if the artifact path cannot be placed on a classpath.
pub fn build_args(spec: &LaunchSpec, artifact: &ArtifactLocation, runtime: &JavaRuntime) -> Result<Vec<OsString>> {
	let options = spec.options();
	let mut args: Vec<OsString> = Vec::new();

	if let Some(min) = &options.min_mem {
		args.push(format!("-Xms{min}").into());
	}
	let max_mem = options
		.max_mem
		.clone()
		.or_else(|| runtime.client_vm.then(|| CLIENT_VM_MAX_HEAP.to_string()));
	if let Some(max) = max_mem {
		args.push(format!("-Xmx{max}").into());
	}

	if options.extra_classpath.is_empty() {
		args.push("-jar".into());
		args.push(artifact.path.clone().into_os_string());
	} else {
		let entries = std::iter::once(artifact.path.clone()).chain(options.extra_classpath.iter().cloned());
		let classpath = std::env::join_paths(entries).map_err(|e| {
			Error::LaunchFailed(format!("cannot put {} on the classpath: {e}", artifact.path.display()))
		})?;
		args.push("-cp".into());
		args.push(classpath);
		args.push(options.main_class.as_deref().unwrap_or(DEFAULT_MAIN_CLASS).into());
	}

	args.push("-port".into());
	args.push(spec.port().to_string().into());
	args.push("-timeout".into());
	args.push(SERVER_IDLE_TIMEOUT_SECS.to_string().into());
	args.extend(options.params.args().into_iter().map(OsString::from));

	Ok(args)
}

fn is_memory_size(value: &str) -> bool {
	MEMORY_SIZE.as_ref().is_some_and(|re| re.is_match(value))
}

fn create_log(path: &Path) -> Result<File> {
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent)
			.map_err(|e| Error::LaunchFailed(format!("cannot create log directory {}: {e}", parent.display())))?;
	}
	File::create(path).map_err(|e| Error::LaunchFailed(format!("cannot create log file {}: {e}", path.display())))
}

/// Keeps the server alive independently of the launching terminal.
fn detach(cmd: &mut Command) {
	#[cfg(unix)]
	std::os::unix::process::CommandExt::process_group(cmd, 0);

	#[cfg(windows)]
	{
		use std::os::windows::process::CommandExt;
		const CREATE_NO_WINDOW: u32 = 0x0800_0000;
		const DETACHED_PROCESS: u32 = 0x0000_0008;
		cmd.creation_flags(CREATE_NO_WINDOW | DETACHED_PROCESS);
	}

	#[cfg(not(any(unix, windows)))]
	let _ = cmd;
}
