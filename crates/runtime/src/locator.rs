//! Java runtime discovery and version gating.
//!
//! Resolution order:
//! 1. `JAVA_HOME` with the platform executable subpath appended
//! 2. A platform [`RuntimeDiscovery`] strategy: scanning install roots on
//!    Windows, a `which`-style `PATH` lookup elsewhere
//!
//! A found executable is then asked for `-version` and checked by
//! [`check_version`] before it is handed to the launcher.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex_lite::Regex;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};

/// A Java executable that passed the version gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaRuntime {
	/// Absolute path of the `java` executable.
	pub executable: PathBuf,
	/// First line of `java -version` output.
	pub version: String,
	/// Whether the runtime reported a Client VM (smaller default heap).
	pub client_vm: bool,
}

/// Supplies a usable Java runtime to the connection manager.
#[async_trait]
pub trait RuntimeProvider: Send + Sync {
	/// Locates and validates a runtime.
	///
	/// # Errors
	///
	/// Returns [`Error::RuntimeNotFound`] or [`Error::RuntimeVersionRejected`].
	async fn resolve(&self) -> Result<JavaRuntime>;
}

/// Platform strategy for finding `java` when `JAVA_HOME` is not usable.
pub trait RuntimeDiscovery: Send + Sync + std::fmt::Debug {
	/// Returns the first existing candidate executable.
	fn discover(&self) -> Option<PathBuf>;

	/// Human-readable description of where this strategy looked.
	fn describe(&self) -> String;
}

/// Scans installation roots for versioned Java folders (Windows layout).
#[derive(Debug, Clone)]
pub struct InstallRootScan {
	roots: Vec<PathBuf>,
}

impl InstallRootScan {
	pub fn new(roots: Vec<PathBuf>) -> Self {
		Self { roots }
	}

	/// `Java` folders below `PROGRAMFILES` and `PROGRAMFILES(X86)`.
	pub fn windows_defaults() -> Self {
		let mut roots = Vec::new();
		for key in ["PROGRAMFILES", "PROGRAMFILES(X86)"] {
			if let Ok(value) = std::env::var(key) {
				roots.push(PathBuf::from(value).join("Java"));
			}
		}
		if roots.is_empty() {
			roots.push(PathBuf::from(r"C:\Program Files\Java"));
			roots.push(PathBuf::from(r"C:\Program Files (x86)\Java"));
		}
		Self { roots }
	}
}

impl RuntimeDiscovery for InstallRootScan {
	fn discover(&self) -> Option<PathBuf> {
		for root in &self.roots {
			let Ok(entries) = std::fs::read_dir(root) else {
				continue;
			};
			let mut versions: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).filter(|p| p.is_dir()).collect();
			// Highest Java version first; ties fall back to the folder name.
			versions.sort_by_cached_key(|dir| std::cmp::Reverse((install_version(dir), dir.clone())));

			for version_dir in versions {
				let candidate = java_executable_in(&version_dir);
				debug!(target = "anchors", candidate = %candidate.display(), "checking Java install folder");
				if candidate.is_file() {
					return Some(candidate);
				}
			}
		}
		None
	}

	fn describe(&self) -> String {
		let roots: Vec<String> = self.roots.iter().map(|r| r.display().to_string()).collect();
		format!("install roots [{}]", roots.join(", "))
	}
}

static VERSION_PART: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[0-9]+").ok());

/// Numeric version parts of an install folder name, with the legacy `1.` prefix
/// dropped so `jdk1.8.0_402` reads as `[8, 0, 402]` and sorts below `jdk-17`.
fn install_version(dir: &Path) -> Vec<u64> {
	let name = dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
	let Some(re) = VERSION_PART.as_ref() else {
		return Vec::new();
	};
	let mut parts: Vec<u64> = re.find_iter(&name).filter_map(|m| m.as_str().parse().ok()).collect();
	if parts.len() > 1 && parts[0] == 1 {
		parts.remove(0);
	}
	parts
}

/// Resolves `java` through the `PATH`.
#[derive(Debug, Clone)]
pub struct PathLookup {
	program: String,
}

impl PathLookup {
	pub fn new(program: impl Into<String>) -> Self {
		Self { program: program.into() }
	}
}

impl Default for PathLookup {
	fn default() -> Self {
		Self::new("java")
	}
}

impl RuntimeDiscovery for PathLookup {
	fn discover(&self) -> Option<PathBuf> {
		which::which(&self.program).ok()
	}

	fn describe(&self) -> String {
		format!("PATH lookup for '{}'", self.program)
	}
}

/// Picks the discovery strategy for the current platform.
pub fn discovery_for_platform() -> Box<dyn RuntimeDiscovery> {
	if cfg!(windows) {
		Box::new(InstallRootScan::windows_defaults())
	} else {
		Box::new(PathLookup::default())
	}
}

/// Locates `java` on this machine and validates its version.
#[derive(Debug)]
pub struct RuntimeLocator {
	java_home: Option<PathBuf>,
	discovery: Box<dyn RuntimeDiscovery>,
}

impl RuntimeLocator {
	pub fn new(java_home: Option<PathBuf>, discovery: Box<dyn RuntimeDiscovery>) -> Self {
		Self { java_home, discovery }
	}

	/// Uses `JAVA_HOME` from `config` and the platform discovery strategy.
	pub fn from_config(config: &RuntimeConfig) -> Self {
		Self::new(config.java_home.clone(), discovery_for_platform())
	}

	/// Finds a Java executable without running it.
	///
	/// # Errors
	///
	/// Returns [`Error::RuntimeNotFound`] when no candidate exists.
	pub fn locate(&self) -> Result<PathBuf> {
		let mut searched = Vec::new();

		if let Some(home) = &self.java_home {
			let candidate = java_executable_in(home);
			if candidate.is_file() {
				return Ok(candidate);
			}
			warn!(
				target = "anchors",
				java_home = %home.display(),
				"JAVA_HOME is set but contains no java executable; falling back"
			);
			searched.push(format!("JAVA_HOME={}", home.display()));
		}

		if let Some(candidate) = self.discovery.discover() {
			return Ok(candidate);
		}
		searched.push(self.discovery.describe());

		Err(Error::RuntimeNotFound {
			searched: searched.join("; "),
		})
	}
}

#[async_trait]
impl RuntimeProvider for RuntimeLocator {
	async fn resolve(&self) -> Result<JavaRuntime> {
		let executable = self.locate()?;
		info!(target = "anchors", java = %executable.display(), "Checking Java version");

		let output = Command::new(&executable).arg("-version").output().await.map_err(|e| Error::RuntimeVersionRejected {
			path: executable.clone(),
			reason: format!("could not run '-version': {e}"),
		})?;

		// `java -version` writes to stderr; some builds use stdout.
		let text = format!("{}{}", String::from_utf8_lossy(&output.stderr), String::from_utf8_lossy(&output.stdout));
		let lines: Vec<&str> = text.lines().collect();

		let report = check_version(&lines).map_err(|reason| Error::RuntimeVersionRejected {
			path: executable.clone(),
			reason,
		})?;

		if report.client_vm {
			warn!(
				target = "anchors",
				java = %executable.display(),
				"32-bit Client VM detected; the server will start with a reduced maximum heap. Install a 64-bit Java for larger models"
			);
		}

		Ok(JavaRuntime {
			executable,
			version: lines.first().map(|l| l.trim().to_string()).unwrap_or_default(),
			client_vm: report.client_vm,
		})
	}
}

/// Outcome of a successful version check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionReport {
	/// A Client VM marker was present. Not fatal.
	pub client_vm: bool,
}

static LEGACY_VERSION: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r#"version\s+"1\.[1-7](?:[._"]|$)"#).ok());

/// Validates `java -version` output.
///
/// Rejects GNU libgcj and any runtime older than Java 8 (`1.1` through `1.7`).
/// A `Client VM` marker is reported but accepted.
///
/// # Errors
///
/// Returns the rejection reason.
pub fn check_version<S: AsRef<str>>(lines: &[S]) -> std::result::Result<VersionReport, String> {
	let mut report = VersionReport::default();

	for line in lines.iter().map(AsRef::as_ref) {
		if line.contains("gcj") {
			return Err(format!("GNU libgcj is not supported ({})", line.trim()));
		}
		if LEGACY_VERSION.as_ref().is_some_and(|re| re.is_match(line)) {
			return Err(format!("Java 8 or newer is required, found {}", line.trim()));
		}
		if line.contains("Client VM") {
			report.client_vm = true;
		}
	}

	Ok(report)
}

fn java_executable_in(home: &Path) -> PathBuf {
	home.join("bin").join(if cfg!(windows) { "java.exe" } else { "java" })
}
