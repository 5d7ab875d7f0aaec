//! Runtime configuration gathered from the environment.
//!
//! Everything the lifecycle components read from the process environment is
//! captured once in [`RuntimeConfig`], so tests can build one explicitly
//! instead of mutating environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable names consulted by [`RuntimeConfig::from_env`].
pub mod env_vars {
	/// Java installation directory; `bin/java` is appended.
	pub const JAVA_HOME: &str = "JAVA_HOME";
	/// Local path or `http(s)://` URL of the server artifact.
	pub const ARTIFACT: &str = "ANCHORS_JAR";
	/// Base repository used to compose download URLs.
	pub const REPOSITORY: &str = "ANCHORS_REPOSITORY";
	/// Package directory holding `java/anchorj.jar` and `java/anchorj.version`.
	pub const HOME: &str = "ANCHORS_HOME";
	/// Directory for downloaded artifacts.
	pub const CACHE_DIR: &str = "ANCHORS_CACHE_DIR";
	/// Expected SHA-256 (hex) of downloaded artifacts.
	pub const ARTIFACT_SHA256: &str = "ANCHORS_JAR_SHA256";
	/// User name on POSIX systems.
	pub const USER: &str = "USER";
	/// User name on Windows.
	pub const USERNAME: &str = "USERNAME";
}

/// File and directory names of the server artifact layout.
pub mod names {
	/// Artifact name used in repository paths and cached file names.
	pub const ARTIFACT: &str = "anchorj";
	/// Directory inside the package holding the bundled artifact.
	pub const JAVA_DIR: &str = "java";
	/// Cached and bundled artifact file name.
	pub const ARTIFACT_FILE: &str = "anchorj.jar";
	/// Version manifest file name.
	pub const VERSION_FILE: &str = "anchorj.version";
	/// Prefix of generated session names and temp files.
	pub const PREFIX: &str = "anchors";
}

/// Default base repository for composed download URLs.
pub const DEFAULT_REPOSITORY: &str = "https://github.com/viadee/javaAnchorServer/releases/download";

/// Settings shared by the runtime locator, artifact resolver, and launcher.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
	/// Explicit Java home (`JAVA_HOME`).
	pub java_home: Option<PathBuf>,
	/// Artifact override, either a local path or a URL.
	pub artifact_override: Option<String>,
	/// Base repository for composed download URLs.
	pub repository: String,
	/// Package directory containing the bundled artifact and version manifest.
	pub package_dir: PathBuf,
	/// Cache directory for downloaded artifacts.
	pub cache_dir: PathBuf,
	/// Expected SHA-256 of downloaded artifacts, lowercase hex.
	pub artifact_sha256: Option<String>,
	/// Sanitized OS user name.
	pub user: String,
	/// Directory receiving the server logs and pid file.
	pub temp_dir: PathBuf,
}

impl RuntimeConfig {
	/// Reads configuration from the current process environment.
	pub fn from_env() -> Self {
		let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

		let package_dir = var(env_vars::HOME).map(PathBuf::from).unwrap_or_else(default_package_dir);
		let cache_dir = var(env_vars::CACHE_DIR).map(PathBuf::from).unwrap_or_else(default_cache_dir);
		let user = var(env_vars::USER).or_else(|| var(env_vars::USERNAME)).unwrap_or_default();

		Self {
			java_home: var(env_vars::JAVA_HOME).map(PathBuf::from),
			artifact_override: var(env_vars::ARTIFACT),
			repository: var(env_vars::REPOSITORY).unwrap_or_else(|| DEFAULT_REPOSITORY.to_string()),
			package_dir,
			cache_dir,
			artifact_sha256: var(env_vars::ARTIFACT_SHA256).map(|s| s.trim().to_ascii_lowercase()),
			user: sanitize_user(&user),
			temp_dir: std::env::temp_dir(),
		}
	}

	/// Builds a configuration rooted at explicit directories, ignoring the environment.
	pub fn with_dirs(package_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
		Self {
			java_home: None,
			artifact_override: None,
			repository: DEFAULT_REPOSITORY.to_string(),
			package_dir: package_dir.into(),
			cache_dir: cache_dir.into(),
			artifact_sha256: None,
			user: sanitize_user(""),
			temp_dir: temp_dir.into(),
		}
	}

	/// Path of the artifact shipped alongside the package.
	pub fn bundled_artifact(&self) -> PathBuf {
		self.package_dir.join(names::JAVA_DIR).join(names::ARTIFACT_FILE)
	}

	/// Path of the version manifest shipped alongside the package.
	pub fn version_manifest(&self) -> PathBuf {
		self.package_dir.join(names::JAVA_DIR).join(names::VERSION_FILE)
	}

	/// Final path of a downloaded artifact.
	pub fn cached_artifact(&self) -> PathBuf {
		self.cache_dir.join(names::ARTIFACT_FILE)
	}
}

/// Timing parameters of the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectTimeouts {
	/// Bound on the initial probe of an already running server.
	pub probe: Duration,
	/// Pause after launching before the reconnect attempt.
	pub settle: Duration,
	/// Bound on the single post-launch reconnect attempt.
	pub reconnect: Duration,
	/// How long the launcher waits before checking for an immediate exit.
	pub exit_check: Duration,
}

impl Default for ConnectTimeouts {
	fn default() -> Self {
		Self {
			probe: Duration::from_secs(1),
			settle: Duration::from_secs(3),
			reconnect: Duration::from_secs(10),
			exit_check: Duration::from_millis(100),
		}
	}
}

/// Replaces characters that are unsafe in file names; empty input becomes `unknown`.
pub fn sanitize_user(user: &str) -> String {
	let cleaned: String = user
		.trim()
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
		.collect();
	if cleaned.is_empty() { "unknown".to_string() } else { cleaned }
}

/// Directory of the running executable when it carries a `java/` folder,
/// otherwise this crate's source directory (which ships the version manifest).
fn default_package_dir() -> PathBuf {
	let exe_dir = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf));
	match exe_dir {
		Some(dir) if dir.join(names::JAVA_DIR).is_dir() => dir,
		_ => PathBuf::from(env!("CARGO_MANIFEST_DIR")),
	}
}

fn default_cache_dir() -> PathBuf {
	dirs::cache_dir()
		.unwrap_or_else(std::env::temp_dir)
		.join(names::PREFIX)
		.join(names::JAVA_DIR)
}
