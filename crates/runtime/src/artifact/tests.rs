use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex as PlMutex;
use tempfile::TempDir;

use super::*;

/// What the spy does when asked to fetch.
#[derive(Clone)]
enum Transfer {
	Complete(Vec<u8>),
	/// Writes a partial body to the temp file, then fails.
	Interrupted(Vec<u8>),
}

#[derive(Clone)]
struct SpyDownloader {
	transfer: Transfer,
	calls: Arc<AtomicUsize>,
	urls: Arc<PlMutex<Vec<String>>>,
}

impl SpyDownloader {
	fn new(transfer: Transfer) -> Self {
		Self {
			transfer,
			calls: Arc::new(AtomicUsize::new(0)),
			urls: Arc::new(PlMutex::new(Vec::new())),
		}
	}

	fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Downloader for SpyDownloader {
	async fn fetch(&self, url: &str, dest: &Path) -> io::Result<u64> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.urls.lock().push(url.to_string());
		match &self.transfer {
			Transfer::Complete(body) => {
				fs::write(dest, body)?;
				Ok(body.len() as u64)
			}
			Transfer::Interrupted(partial) => {
				fs::write(dest, partial)?;
				Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer"))
			}
		}
	}
}

struct Fixture {
	_temp: TempDir,
	config: RuntimeConfig,
}

impl Fixture {
	fn new() -> Self {
		let temp = TempDir::new().unwrap();
		let config = RuntimeConfig::with_dirs(temp.path().join("package"), temp.path().join("cache"), temp.path().join("tmp"));
		fs::create_dir_all(config.package_dir.join(names::JAVA_DIR)).unwrap();
		Self { _temp: temp, config }
	}

	fn with_manifest(self, version: &str) -> Self {
		fs::write(self.config.version_manifest(), format!("{version}\n")).unwrap();
		self
	}

	fn with_cached(self, body: &[u8]) -> Self {
		fs::create_dir_all(&self.config.cache_dir).unwrap();
		fs::write(self.config.cached_artifact(), body).unwrap();
		self
	}

	fn resolver(&self, spy: &SpyDownloader) -> ArtifactResolver {
		ArtifactResolver::new(self.config.clone(), Box::new(spy.clone())).with_lock_wait(Duration::from_millis(600))
	}

	fn leftovers(&self) -> Vec<String> {
		let Ok(entries) = fs::read_dir(&self.config.cache_dir) else {
			return Vec::new();
		};
		entries
			.filter_map(|e| e.ok())
			.map(|e| e.file_name().to_string_lossy().into_owned())
			.filter(|n| n.ends_with(".tmp") || n.ends_with(".lock"))
			.collect()
	}
}

#[tokio::test]
async fn missing_override_path_fails_without_fallback() {
	let mut fixture = Fixture::new().with_manifest("1.0.7").with_cached(b"cached jar");
	fixture.config.artifact_override = Some(fixture.config.package_dir.join("nope.jar").display().to_string());
	let spy = SpyDownloader::new(Transfer::Complete(b"jar".to_vec()));

	let err = fixture.resolver(&spy).resolve(false).await.unwrap_err();
	match err {
		Error::ArtifactUnavailable(msg) => {
			assert!(msg.contains("ANCHORS_JAR"));
			assert!(msg.contains("nope.jar"));
		}
		other => panic!("expected ArtifactUnavailable, got {other:?}"),
	}
	assert_eq!(spy.calls(), 0);
}

#[tokio::test]
async fn existing_override_path_wins_even_on_force_refresh() {
	let mut fixture = Fixture::new().with_manifest("1.0.7").with_cached(b"cached jar");
	let custom = fixture.config.package_dir.join("custom.jar");
	fs::write(&custom, b"custom jar").unwrap();
	fixture.config.artifact_override = Some(custom.display().to_string());
	let spy = SpyDownloader::new(Transfer::Complete(b"jar".to_vec()));

	let location = fixture.resolver(&spy).resolve(true).await.unwrap();
	assert_eq!(location.path, std::path::absolute(&custom).unwrap());
	assert_eq!(location.version, "1.0.7");
	assert_eq!(spy.calls(), 0);
}

#[tokio::test]
async fn bundled_artifact_is_preferred_over_cache() {
	let fixture = Fixture::new().with_manifest("1.0.7").with_cached(b"cached jar");
	fs::write(fixture.config.bundled_artifact(), b"bundled jar").unwrap();
	let spy = SpyDownloader::new(Transfer::Complete(b"jar".to_vec()));

	let location = fixture.resolver(&spy).resolve(false).await.unwrap();
	assert!(location.path.ends_with("java/anchorj.jar"));
	assert_eq!(spy.calls(), 0);
}

#[tokio::test]
async fn cached_artifact_resolves_identically_without_download() {
	let fixture = Fixture::new().with_manifest("1.0.7").with_cached(b"cached jar");
	let spy = SpyDownloader::new(Transfer::Complete(b"jar".to_vec()));
	let resolver = fixture.resolver(&spy);

	let first = resolver.resolve(false).await.unwrap();
	let second = resolver.resolve(false).await.unwrap();

	assert_eq!(first, second);
	assert_eq!(first.path, std::path::absolute(fixture.config.cached_artifact()).unwrap());
	assert_eq!(spy.calls(), 0);
}

#[tokio::test]
async fn cached_artifact_without_manifest_reports_unknown_version() {
	let fixture = Fixture::new().with_cached(b"cached jar");
	let spy = SpyDownloader::new(Transfer::Complete(b"jar".to_vec()));

	let location = fixture.resolver(&spy).resolve(false).await.unwrap();
	assert_eq!(location.version, UNKNOWN_VERSION);
}

#[tokio::test]
async fn missing_manifest_is_fatal_when_download_needed() {
	let fixture = Fixture::new();
	let spy = SpyDownloader::new(Transfer::Complete(b"jar".to_vec()));

	let err = fixture.resolver(&spy).resolve(false).await.unwrap_err();
	match err {
		Error::ArtifactUnavailable(msg) => assert!(msg.contains("anchorj.version")),
		other => panic!("expected ArtifactUnavailable, got {other:?}"),
	}
	assert_eq!(spy.calls(), 0);
}

#[tokio::test]
async fn download_uses_manifest_version_and_renames_into_place() {
	let mut fixture = Fixture::new().with_manifest("1.0.7");
	fixture.config.repository = "https://repo.example.org/releases/".to_string();
	let spy = SpyDownloader::new(Transfer::Complete(b"complete jar".to_vec()));
	let resolver = fixture.resolver(&spy);

	let location = resolver.resolve(false).await.unwrap();

	assert_eq!(location.version, "1.0.7");
	assert_eq!(fs::read(&location.path).unwrap(), b"complete jar");
	assert_eq!(
		spy.urls.lock().as_slice(),
		["https://repo.example.org/releases/anchorj/1.0.7/anchorj-1.0.7-with-dependencies.jar"]
	);
	assert!(fixture.leftovers().is_empty(), "leftover files: {:?}", fixture.leftovers());

	// Memoised: no second transfer.
	resolver.resolve(false).await.unwrap();
	assert_eq!(spy.calls(), 1);
}

#[tokio::test]
async fn interrupted_download_never_touches_final_path() {
	let fixture = Fixture::new().with_manifest("1.0.7");
	let spy = SpyDownloader::new(Transfer::Interrupted(b"half a j".to_vec()));

	let err = fixture.resolver(&spy).resolve(false).await.unwrap_err();

	assert!(!fixture.config.cached_artifact().exists());
	assert!(fixture.leftovers().is_empty(), "leftover files: {:?}", fixture.leftovers());
	match err {
		Error::ArtifactUnavailable(msg) => {
			assert!(msg.contains("anchorj-1.0.7-with-dependencies.jar"));
			assert!(msg.contains(&fixture.config.cache_dir.display().to_string()));
		}
		other => panic!("expected ArtifactUnavailable, got {other:?}"),
	}
}

#[tokio::test]
async fn interrupted_refresh_keeps_previous_artifact() {
	let fixture = Fixture::new().with_manifest("1.0.7").with_cached(b"previous jar");
	let spy = SpyDownloader::new(Transfer::Interrupted(b"half".to_vec()));

	assert!(fixture.resolver(&spy).resolve(true).await.is_err());
	assert_eq!(fs::read(fixture.config.cached_artifact()).unwrap(), b"previous jar");
	assert_eq!(spy.calls(), 1);
}

#[tokio::test]
async fn force_refresh_downloads_over_existing_cache() {
	let fixture = Fixture::new().with_manifest("1.0.7").with_cached(b"previous jar");
	let spy = SpyDownloader::new(Transfer::Complete(b"fresh jar".to_vec()));
	let resolver = fixture.resolver(&spy);

	resolver.resolve(false).await.unwrap();
	let refreshed = resolver.resolve(true).await.unwrap();

	assert_eq!(spy.calls(), 1);
	assert_eq!(fs::read(refreshed.path).unwrap(), b"fresh jar");
}

#[tokio::test]
async fn url_override_is_downloaded_when_nothing_is_cached() {
	let mut fixture = Fixture::new();
	fixture.config.artifact_override = Some("https://mirror.example.org/anchorj.jar".to_string());
	let spy = SpyDownloader::new(Transfer::Complete(b"mirror jar".to_vec()));

	let location = fixture.resolver(&spy).resolve(false).await.unwrap();

	assert_eq!(spy.urls.lock().as_slice(), ["https://mirror.example.org/anchorj.jar"]);
	assert_eq!(location.version, UNKNOWN_VERSION);
	assert_eq!(fs::read(location.path).unwrap(), b"mirror jar");
}

#[tokio::test]
async fn checksum_mismatch_discards_download() {
	let mut fixture = Fixture::new().with_manifest("1.0.7");
	fixture.config.artifact_sha256 = Some("00".repeat(32));
	let spy = SpyDownloader::new(Transfer::Complete(b"tampered jar".to_vec()));

	let err = fixture.resolver(&spy).resolve(false).await.unwrap_err();

	assert!(err.to_string().contains("sha256 mismatch"));
	assert!(!fixture.config.cached_artifact().exists());
	assert!(fixture.leftovers().is_empty());
}

#[tokio::test]
async fn matching_checksum_is_accepted() {
	let mut fixture = Fixture::new().with_manifest("1.0.7");
	let body = b"genuine jar".to_vec();
	fixture.config.artifact_sha256 = Some(format!("{:x}", Sha256::digest(&body)));
	let spy = SpyDownloader::new(Transfer::Complete(body));

	assert!(fixture.resolver(&spy).resolve(false).await.is_ok());
}

#[tokio::test]
async fn empty_download_is_rejected() {
	let fixture = Fixture::new().with_manifest("1.0.7");
	let spy = SpyDownloader::new(Transfer::Complete(Vec::new()));

	let err = fixture.resolver(&spy).resolve(false).await.unwrap_err();
	assert!(err.to_string().contains("empty"));
	assert!(!fixture.config.cached_artifact().exists());
}

#[tokio::test]
async fn held_lock_times_out_without_downloading() {
	let fixture = Fixture::new().with_manifest("1.0.7");
	fs::create_dir_all(&fixture.config.cache_dir).unwrap();
	let lock = lock_path_for(&fixture.config.cached_artifact());
	fs::write(&lock, b"4242").unwrap();
	let spy = SpyDownloader::new(Transfer::Complete(b"jar".to_vec()));

	let err = fixture.resolver(&spy).resolve(false).await.unwrap_err();

	assert!(err.to_string().contains("another process"));
	assert_eq!(spy.calls(), 0);
	assert!(lock.exists(), "a foreign lock must not be removed");
}

#[tokio::test]
async fn lock_records_a_per_acquire_token() {
	let dir = TempDir::new().unwrap();
	let dest = dir.path().join("anchorj.jar");

	let first = DownloadLock::acquire(&dest, Duration::from_millis(100)).await.unwrap();
	let contents = fs::read_to_string(lock_path_for(&dest)).unwrap();
	assert_eq!(contents, first.token);
	assert!(contents.starts_with(&format!("{}:", std::process::id())));
	drop(first);

	let second = DownloadLock::acquire(&dest, Duration::from_millis(100)).await.unwrap();
	assert_ne!(fs::read_to_string(lock_path_for(&dest)).unwrap(), contents);
	drop(second);
	assert!(!lock_path_for(&dest).exists());
}

#[tokio::test]
async fn stale_takeover_is_not_released_by_previous_holder() {
	let dir = TempDir::new().unwrap();
	let dest = dir.path().join("anchorj.jar");
	let lock = lock_path_for(&dest);

	let first = DownloadLock::acquire(&dest, Duration::from_millis(100)).await.unwrap();
	let aged = SystemTime::now() - STALE_LOCK_AGE - Duration::from_secs(60);
	fs::File::options().write(true).open(&lock).unwrap().set_modified(aged).unwrap();

	let second = DownloadLock::acquire(&dest, Duration::from_millis(100)).await.unwrap();
	drop(first);
	assert!(lock.exists(), "releasing a taken-over lock must leave the new holder's file");

	let err = DownloadLock::acquire(&dest, Duration::from_millis(300)).await.unwrap_err();
	assert!(err.to_string().contains("another process"));

	drop(second);
	assert!(!lock.exists());
}

#[test]
fn stale_age_outlasts_a_transfer() {
	assert!(STALE_LOCK_AGE > TRANSFER_TIMEOUT);
	assert!(DEFAULT_LOCK_WAIT > STALE_LOCK_AGE);
}

#[tokio::test]
async fn waiter_reuses_artifact_finished_while_waiting() {
	let fixture = Fixture::new().with_manifest("1.0.7");
	fs::create_dir_all(&fixture.config.cache_dir).unwrap();
	let dest = fixture.config.cached_artifact();
	let lock = lock_path_for(&dest);
	fs::write(&lock, b"4242").unwrap();
	let spy = SpyDownloader::new(Transfer::Complete(b"jar".to_vec()));
	let resolver = fixture.resolver(&spy);

	let finisher = {
		let dest = dest.clone();
		let lock = lock.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(100)).await;
			fs::write(&dest, b"other process jar").unwrap();
			fs::remove_file(&lock).unwrap();
		})
	};

	// The bundled and cached checks run before the lock; force the download path
	// by resolving before the other process has published its file.
	let location = resolver.download("https://unused.example.org/a.jar", "1.0.7".to_string(), false).await.unwrap();
	finisher.await.unwrap();

	assert_eq!(fs::read(location.path).unwrap(), b"other process jar");
	assert_eq!(spy.calls(), 0);
}

#[test]
fn compose_download_url_trims_trailing_slash() {
	assert_eq!(
		compose_download_url("https://repo.example.org/", "2.0.0"),
		"https://repo.example.org/anchorj/2.0.0/anchorj-2.0.0-with-dependencies.jar"
	);
}

#[test]
fn url_detection_is_scheme_based() {
	assert!(is_url("https://example.org/a.jar"));
	assert!(is_url("HTTP://example.org/a.jar"));
	assert!(!is_url("/opt/anchors/a.jar"));
	assert!(!is_url(r"C:\anchors\a.jar"));
}

#[test]
fn temp_and_lock_paths_are_siblings() {
	let dest = PathBuf::from("/cache/anchorj.jar");
	let tmp = temp_path_for(&dest);
	assert_eq!(tmp.parent(), dest.parent());
	assert!(tmp.to_string_lossy().ends_with(&format!("anchorj.jar.{}.tmp", std::process::id())));
	assert_eq!(lock_path_for(&dest), PathBuf::from("/cache/anchorj.jar.lock"));
}
