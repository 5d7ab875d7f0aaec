//! Server artifact resolution and caching.
//!
//! The analysis server ships as a single versioned jar. [`ArtifactResolver`]
//! finds it in the following order:
//!
//! 1. `ANCHORS_JAR` pointing at a local file (must exist, no fallback)
//! 2. The artifact bundled alongside the package (skipped on force refresh)
//! 3. A previously downloaded artifact in the cache (skipped on force refresh)
//! 4. A download from `ANCHORS_JAR` (when it is a URL) or from the repository,
//!    using the version read from the package's version manifest
//!
//! Downloads are written to a temporary sibling file and renamed into place
//! once complete, so the final cache path only ever holds a whole artifact.
//! A lock file next to the cache path keeps concurrent processes from
//! downloading at the same time.

#[cfg(test)]
mod tests;

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{RuntimeConfig, env_vars, names};
use crate::error::{Error, Result};

/// Version recorded when no manifest is readable for a bundled, cached, or overridden artifact.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Upper bound on a single HTTP transfer.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Lock files older than this are considered abandoned. Must exceed
/// [`TRANSFER_TIMEOUT`] so a live download never loses its lock.
const STALE_LOCK_AGE: Duration = Duration::from_secs(35 * 60);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(40 * 60);

/// A resolved server artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
	/// Absolute path of the jar.
	pub path: PathBuf,
	/// Declared artifact version.
	pub version: String,
}

impl ArtifactLocation {
	fn new(path: PathBuf, version: String) -> Self {
		let path = std::path::absolute(&path).unwrap_or(path);
		Self { path, version }
	}
}

/// Supplies the server artifact to the connection manager.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
	/// Returns the artifact, downloading it if needed.
	///
	/// `force_refresh` skips the bundled and cached copies and downloads again.
	///
	/// # Errors
	///
	/// Returns [`Error::ArtifactUnavailable`] with the attempted path or URL.
	async fn resolve(&self, force_refresh: bool) -> Result<ArtifactLocation>;
}

/// Transfers a remote file to a local path.
#[async_trait]
pub trait Downloader: Send + Sync {
	/// Writes the body of `url` to `dest`, returning the number of bytes written.
	async fn fetch(&self, url: &str, dest: &Path) -> io::Result<u64>;
}

/// [`Downloader`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
	client: reqwest::Client,
}

impl HttpDownloader {
	/// Creates a client with a connect timeout and an overall transfer timeout.
	///
	/// # Errors
	///
	/// Returns [`Error::ArtifactUnavailable`] if the TLS backend cannot be initialised.
	pub fn new() -> Result<Self> {
		let client = reqwest::Client::builder()
			.connect_timeout(Duration::from_secs(30))
			.timeout(TRANSFER_TIMEOUT)
			.build()
			.map_err(|e| Error::ArtifactUnavailable(format!("failed to create HTTP client: {e}")))?;
		Ok(Self { client })
	}
}

#[async_trait]
impl Downloader for HttpDownloader {
	async fn fetch(&self, url: &str, dest: &Path) -> io::Result<u64> {
		let response = self
			.client
			.get(url)
			.send()
			.await
			.map_err(|e| io::Error::other(format!("Download failed: {e}")))?;

		if !response.status().is_success() {
			return Err(io::Error::other(format!("Download failed with status: {}", response.status())));
		}

		let mut file = tokio::fs::File::create(dest).await?;
		let mut stream = response.bytes_stream();
		let mut written: u64 = 0;

		while let Some(chunk) = stream.next().await {
			let chunk = chunk.map_err(|e| io::Error::other(format!("Failed to read response: {e}")))?;
			file.write_all(&chunk).await?;
			written += chunk.len() as u64;
		}

		file.flush().await?;
		file.sync_all().await?;
		debug!(target = "anchors", url, bytes = written, "artifact transfer complete");
		Ok(written)
	}
}

/// Locates, validates, or downloads the server artifact.
pub struct ArtifactResolver {
	config: RuntimeConfig,
	downloader: Box<dyn Downloader>,
	resolved: Mutex<Option<ArtifactLocation>>,
	lock_wait: Duration,
}

impl std::fmt::Debug for ArtifactResolver {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ArtifactResolver")
			.field("config", &self.config)
			.field("resolved", &*self.resolved.lock())
			.finish_non_exhaustive()
	}
}

impl ArtifactResolver {
	pub fn new(config: RuntimeConfig, downloader: Box<dyn Downloader>) -> Self {
		Self {
			config,
			downloader,
			resolved: Mutex::new(None),
			lock_wait: DEFAULT_LOCK_WAIT,
		}
	}

	/// Resolver that downloads over HTTP.
	///
	/// # Errors
	///
	/// See [`HttpDownloader::new`].
	pub fn from_config(config: RuntimeConfig) -> Result<Self> {
		Ok(Self::new(config, Box::new(HttpDownloader::new()?)))
	}

	/// Sets how long to wait for another process's download to finish.
	pub fn with_lock_wait(mut self, wait: Duration) -> Self {
		self.lock_wait = wait;
		self
	}

	async fn resolve_uncached(&self, force_refresh: bool) -> Result<ArtifactLocation> {
		let mut override_url = None;

		if let Some(value) = &self.config.artifact_override {
			if is_url(value) {
				override_url = Some(value.clone());
			} else {
				let path = PathBuf::from(value);
				if !path.is_file() {
					return Err(Error::ArtifactUnavailable(format!(
						"{} is set to '{}' but no file exists there",
						env_vars::ARTIFACT,
						path.display()
					)));
				}
				info!(target = "anchors", path = %path.display(), "Using server artifact from {}", env_vars::ARTIFACT);
				return Ok(ArtifactLocation::new(path, self.declared_version()));
			}
		}

		if !force_refresh {
			let bundled = self.config.bundled_artifact();
			if bundled.is_file() {
				debug!(target = "anchors", path = %bundled.display(), "using bundled server artifact");
				return Ok(ArtifactLocation::new(bundled, self.declared_version()));
			}

			let cached = self.config.cached_artifact();
			if cached.is_file() {
				debug!(target = "anchors", path = %cached.display(), "using cached server artifact");
				return Ok(ArtifactLocation::new(cached, self.declared_version()));
			}
		}

		let (url, version) = match override_url {
			Some(url) => (url, self.declared_version()),
			None => {
				let version = read_manifest(&self.config.version_manifest())?;
				(compose_download_url(&self.config.repository, &version), version)
			}
		};

		self.download(&url, version, force_refresh).await
	}

	async fn download(&self, url: &str, version: String, force_refresh: bool) -> Result<ArtifactLocation> {
		let cache_dir = &self.config.cache_dir;
		let dest = self.config.cached_artifact();

		tokio::fs::create_dir_all(cache_dir).await.map_err(|e| {
			Error::ArtifactUnavailable(format!("could not create cache directory {}: {e}", cache_dir.display()))
		})?;

		let _lock = DownloadLock::acquire(&dest, self.lock_wait).await?;

		if !force_refresh && dest.is_file() {
			info!(target = "anchors", path = %dest.display(), "Server artifact was downloaded by another process");
			return Ok(ArtifactLocation::new(dest, version));
		}

		let tmp = temp_path_for(&dest);
		info!(target = "anchors", url, dest = %dest.display(), "Downloading anchors server artifact");

		if let Err(e) = self.downloader.fetch(url, &tmp).await {
			discard(&tmp).await;
			return Err(Error::ArtifactUnavailable(format!(
				"downloading {url} into {} failed: {e}. Download the file manually and place it at {}, or point {} at a local copy",
				cache_dir.display(),
				dest.display(),
				env_vars::ARTIFACT
			)));
		}

		if let Err(reason) = self.verify(&tmp).await {
			discard(&tmp).await;
			return Err(Error::ArtifactUnavailable(format!("downloaded artifact from {url} is invalid: {reason}")));
		}

		if let Err(e) = tokio::fs::rename(&tmp, &dest).await {
			discard(&tmp).await;
			return Err(Error::ArtifactUnavailable(format!(
				"could not move {} into place at {}: {e}",
				tmp.display(),
				dest.display()
			)));
		}

		info!(target = "anchors", path = %dest.display(), version = %version, "Server artifact ready");
		Ok(ArtifactLocation::new(dest, version))
	}

	/// Checks a finished transfer before it is published.
	async fn verify(&self, tmp: &Path) -> std::result::Result<(), String> {
		let metadata = tokio::fs::metadata(tmp).await.map_err(|e| format!("{} is missing: {e}", tmp.display()))?;
		if metadata.len() == 0 {
			return Err("file is empty".to_string());
		}

		if let Some(expected) = &self.config.artifact_sha256 {
			let bytes = tokio::fs::read(tmp).await.map_err(|e| e.to_string())?;
			let actual = format!("{:x}", Sha256::digest(&bytes));
			if !actual.eq_ignore_ascii_case(expected) {
				return Err(format!("sha256 mismatch: expected {expected}, got {actual}"));
			}
		}

		Ok(())
	}

	fn declared_version(&self) -> String {
		read_manifest(&self.config.version_manifest()).unwrap_or_else(|_| UNKNOWN_VERSION.to_string())
	}
}

#[async_trait]
impl ArtifactSource for ArtifactResolver {
	async fn resolve(&self, force_refresh: bool) -> Result<ArtifactLocation> {
		if force_refresh {
			self.resolved.lock().take();
		} else if let Some(location) = self.resolved.lock().clone() {
			if location.path.is_file() {
				return Ok(location);
			}
		}

		let location = self.resolve_uncached(force_refresh).await?;
		*self.resolved.lock() = Some(location.clone());
		Ok(location)
	}
}

/// Reads the artifact version from the first line of the manifest.
///
/// # Errors
///
/// Returns [`Error::ArtifactUnavailable`] if the manifest is missing or empty.
pub fn read_manifest(path: &Path) -> Result<String> {
	let contents = std::fs::read_to_string(path)
		.map_err(|e| Error::ArtifactUnavailable(format!("version manifest {} could not be read: {e}", path.display())))?;
	let version = contents.lines().next().unwrap_or_default().trim();
	if version.is_empty() {
		return Err(Error::ArtifactUnavailable(format!("version manifest {} is empty", path.display())));
	}
	Ok(version.to_string())
}

/// `<repository>/<name>/<version>/<name>-<version>-with-dependencies.jar`
pub fn compose_download_url(repository: &str, version: &str) -> String {
	let name = names::ARTIFACT;
	format!(
		"{}/{name}/{version}/{name}-{version}-with-dependencies.jar",
		repository.trim_end_matches('/')
	)
}

fn is_url(value: &str) -> bool {
	let lower = value.trim().to_ascii_lowercase();
	lower.starts_with("http://") || lower.starts_with("https://")
}

/// Per-process temporary sibling of `dest`.
fn temp_path_for(dest: &Path) -> PathBuf {
	let file_name = dest.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
	dest.with_file_name(format!("{file_name}.{}.tmp", std::process::id()))
}

fn lock_path_for(dest: &Path) -> PathBuf {
	let file_name = dest.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
	dest.with_file_name(format!("{file_name}.lock"))
}

async fn discard(path: &Path) {
	if let Err(e) = tokio::fs::remove_file(path).await {
		if e.kind() != io::ErrorKind::NotFound {
			warn!(target = "anchors", path = %path.display(), error = %e, "failed to remove partial download");
		}
	}
}

/// Exclusive download lock held as a `create_new` file.
///
/// The file holds a token unique to this acquisition. On drop the file is
/// only removed while it still carries that token, so a holder whose lock was
/// taken over as stale never deletes its successor's lock.
#[derive(Debug)]
struct DownloadLock {
	path: PathBuf,
	token: String,
}

impl DownloadLock {
	async fn acquire(dest: &Path, wait: Duration) -> Result<Self> {
		let path = lock_path_for(dest);
		let deadline = Instant::now() + wait;
		let token = format!("{}:{}", std::process::id(), Uuid::new_v4().simple());

		loop {
			match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
				Ok(mut file) => {
					let lock = Self { path, token };
					if let Err(e) = lock.write_token(&mut file).await {
						discard(&lock.path).await;
						return Err(e);
					}
					return Ok(lock);
				}
				Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
					if lock_is_stale(&path).await {
						warn!(target = "anchors", lock = %path.display(), "removing stale download lock");
						discard(&path).await;
						continue;
					}
					if Instant::now() >= deadline {
						return Err(Error::ArtifactUnavailable(format!(
							"another process is downloading the server artifact (lock {} still held after {}s)",
							path.display(),
							wait.as_secs()
						)));
					}
					debug!(target = "anchors", lock = %path.display(), "waiting for concurrent artifact download");
					tokio::time::sleep(LOCK_POLL_INTERVAL).await;
				}
				Err(e) => {
					return Err(Error::ArtifactUnavailable(format!(
						"could not create download lock {}: {e}",
						path.display()
					)));
				}
			}
		}
	}

	async fn write_token(&self, file: &mut tokio::fs::File) -> Result<()> {
		let written = async {
			file.write_all(self.token.as_bytes()).await?;
			file.flush().await?;
			file.sync_all().await
		}
		.await;
		written.map_err(|e| {
			Error::ArtifactUnavailable(format!("could not write download lock {}: {e}", self.path.display()))
		})
	}

	fn is_held(&self) -> bool {
		std::fs::read_to_string(&self.path).is_ok_and(|contents| contents == self.token)
	}
}

impl Drop for DownloadLock {
	fn drop(&mut self) {
		if !self.is_held() {
			debug!(target = "anchors", lock = %self.path.display(), "download lock no longer ours, leaving it");
			return;
		}
		let _ = std::fs::remove_file(&self.path);
	}
}

async fn lock_is_stale(path: &Path) -> bool {
	let Ok(metadata) = tokio::fs::metadata(path).await else {
		return false;
	};
	metadata
		.modified()
		.ok()
		.and_then(|modified| SystemTime::now().duration_since(modified).ok())
		.is_some_and(|age| age > STALE_LOCK_AGE)
}
