//! Connection state machine.
//!
//! ```text
//! Probing ──ok──────────────────────────────────────────► Connected
//!    │ fail
//!    ├─ auto start off ───────────────────────────────────► NoServerFound
//!    ├─ host not loopback ────────────────────────────────► RemoteStartUnsupported
//!    └─ Launching (runtime → artifact → process) ─fail────► StartFailed
//!          │ ok
//!          └─ settle, Reconnecting (one attempt) ─fail────► ConnectionFailed
//!                 │ ok
//!                 └──────────────────────────────────────► Connected
//! ```

use std::net::IpAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::artifact::{ArtifactResolver, ArtifactSource};
use crate::config::{ConnectTimeouts, RuntimeConfig, names};
use crate::error::{Error, Result};
use crate::launcher::{LaunchOptions, LaunchSpec, Launcher, ProcessLauncher};
use crate::locator::{RuntimeLocator, RuntimeProvider};
use crate::registry::ProcessRegistry;
use crate::session::SessionHandle;

/// Port used when none is given.
pub const DEFAULT_PORT: u16 = 6666;

/// Arguments of [`ConnectionManager::connect`].
///
/// `port` is kept wide so out-of-range caller input reaches validation
/// instead of being truncated.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectRequest {
	pub ip: String,
	pub port: i64,
	/// Session name; `None` generates `anchors_<user>_<suffix>`.
	pub name: Option<String>,
	/// Launch a local server when none answers.
	pub auto_start: bool,
	/// Launch settings; defaults are used when `None`.
	pub launch: Option<LaunchOptions>,
	/// Skip bundled and cached artifacts and download again.
	pub force_refresh: bool,
}

impl ConnectRequest {
	pub fn new(ip: impl Into<String>, port: i64) -> Self {
		Self {
			ip: ip.into(),
			port,
			name: None,
			auto_start: false,
			launch: None,
			force_refresh: false,
		}
	}

	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	pub fn auto_start(mut self, auto_start: bool) -> Self {
		self.auto_start = auto_start;
		self
	}

	pub fn launch(mut self, options: LaunchOptions) -> Self {
		self.launch = Some(options);
		self
	}

	pub fn force_refresh(mut self, force_refresh: bool) -> Self {
		self.force_refresh = force_refresh;
		self
	}
}

impl Default for ConnectRequest {
	fn default() -> Self {
		Self::new("localhost", i64::from(DEFAULT_PORT))
	}
}

/// A request that passed validation.
#[derive(Debug)]
struct Target {
	host: String,
	port: u16,
	name: String,
	launch: Option<LaunchSpec>,
}

/// Connects to a running server, starting one locally when allowed.
///
/// Owns its collaborators and a [`ProcessRegistry`] of the servers it started.
pub struct ConnectionManager {
	runtime: Box<dyn RuntimeProvider>,
	artifacts: Box<dyn ArtifactSource>,
	launcher: Box<dyn Launcher>,
	registry: ProcessRegistry,
	timeouts: ConnectTimeouts,
	user: String,
}

impl std::fmt::Debug for ConnectionManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ConnectionManager")
			.field("registry", &self.registry)
			.field("timeouts", &self.timeouts)
			.field("user", &self.user)
			.finish_non_exhaustive()
	}
}

impl ConnectionManager {
	pub fn new(
		runtime: Box<dyn RuntimeProvider>,
		artifacts: Box<dyn ArtifactSource>,
		launcher: Box<dyn Launcher>,
		user: impl Into<String>,
	) -> Self {
		Self {
			runtime,
			artifacts,
			launcher,
			registry: ProcessRegistry::new(),
			timeouts: ConnectTimeouts::default(),
			user: user.into(),
		}
	}

	/// Wires the production locator, resolver and launcher from `config`.
	///
	/// # Errors
	///
	/// Returns an error if the HTTP client cannot be built.
	pub fn from_config(config: RuntimeConfig, timeouts: ConnectTimeouts) -> Result<Self> {
		let runtime = RuntimeLocator::from_config(&config);
		let launcher = ProcessLauncher::from_config(&config, timeouts.exit_check);
		let user = config.user.clone();
		let artifacts = ArtifactResolver::from_config(config)?;

		Ok(Self::new(Box::new(runtime), Box::new(artifacts), Box::new(launcher), user).with_timeouts(timeouts))
	}

	/// [`ConnectionManager::from_config`] with [`RuntimeConfig::from_env`] and default timeouts.
	pub fn from_env() -> Result<Self> {
		Self::from_config(RuntimeConfig::from_env(), ConnectTimeouts::default())
	}

	pub fn with_timeouts(mut self, timeouts: ConnectTimeouts) -> Self {
		self.timeouts = timeouts;
		self
	}

	pub fn timeouts(&self) -> &ConnectTimeouts {
		&self.timeouts
	}

	pub fn registry(&self) -> &ProcessRegistry {
		&self.registry
	}

	/// Returns a session to the server at `request.ip:request.port`.
	///
	/// # Errors
	///
	/// - [`Error::InvalidArgument`] before any I/O for a malformed request
	/// - [`Error::NoServerFound`] when nothing answers and auto start is off
	/// - [`Error::RemoteStartUnsupported`] when auto start targets another host
	/// - [`Error::StartFailed`] wrapping the runtime, artifact or launch error
	/// - [`Error::ConnectionFailed`] when the launched server never accepts
	pub async fn connect(&mut self, request: ConnectRequest) -> Result<SessionHandle> {
		let force_refresh = request.force_refresh;
		let Target { host, port, name, launch } = self.validate(request)?;

		info!(target = "anchors", %host, port, "Probing for anchors server");
		match probe(&host, port, self.timeouts.probe).await {
			Ok(stream) => return Ok(self.connected(stream, host, port, name, false)),
			Err(reason) => debug!(target = "anchors", %host, port, %reason, "no server answered"),
		}

		let Some(spec) = launch else {
			return Err(Error::NoServerFound { host, port });
		};
		if !is_loopback(&host) {
			return Err(Error::RemoteStartUnsupported { host });
		}

		self.start(&spec, force_refresh)
			.await
			.map_err(|e| Error::start_failed(&host, port, e))?;

		info!(
			target = "anchors",
			%host,
			port,
			timeout_ms = self.timeouts.reconnect.as_millis() as u64,
			"Reconnecting to launched anchors server"
		);
		tokio::time::sleep(self.timeouts.settle).await;

		match probe(&host, port, self.timeouts.reconnect).await {
			Ok(stream) => Ok(self.connected(stream, host, port, name, true)),
			Err(reason) => Err(Error::ConnectionFailed { host, port, reason }),
		}
	}

	fn validate(&self, request: ConnectRequest) -> Result<Target> {
		let host = request.ip.trim().to_string();
		if host.is_empty() {
			return Err(Error::InvalidArgument("ip must not be empty".to_string()));
		}
		let port = u16::try_from(request.port)
			.map_err(|_| Error::InvalidArgument(format!("port must be between 0 and 65535, got {}", request.port)))?;
		let name = match request.name {
			Some(name) if name.trim().is_empty() => {
				return Err(Error::InvalidArgument("name must not be empty".to_string()));
			}
			Some(name) => name,
			None => session_name(&self.user),
		};
		let launch = if request.auto_start {
			Some(LaunchSpec::new(&host, port, &name, request.launch.unwrap_or_default())?)
		} else {
			None
		};

		Ok(Target { host, port, name, launch })
	}

	async fn start(&mut self, spec: &LaunchSpec, force_refresh: bool) -> Result<()> {
		info!(target = "anchors", host = spec.ip(), port = spec.port(), "Launching anchors server");

		let runtime = self.runtime.resolve().await?;
		let artifact = self.artifacts.resolve(force_refresh).await?;
		let record = self.launcher.launch(spec, &artifact, &runtime).await?;

		info!(target = "anchors", pid = record.pid, port = record.port, version = %artifact.version, "anchors server started");
		self.registry.record_launch(record);
		Ok(())
	}

	fn connected(&mut self, stream: TcpStream, host: String, port: u16, name: String, launched: bool) -> SessionHandle {
		info!(target = "anchors", %host, port, %name, launched, "Connected to anchors server");
		self.registry.record_connected(port, &name);
		SessionHandle::new(stream, host, port, name, launched)
	}
}

/// One bounded connect attempt.
async fn probe(host: &str, port: u16, limit: Duration) -> std::result::Result<TcpStream, String> {
	match tokio::time::timeout(limit, TcpStream::connect((host, port))).await {
		Ok(Ok(stream)) => Ok(stream),
		Ok(Err(e)) => Err(e.to_string()),
		Err(_) => Err(format!("timed out after {}ms", limit.as_millis())),
	}
}

/// True for `localhost` and loopback IP literals; no DNS lookup is made.
pub fn is_loopback(host: &str) -> bool {
	if host.eq_ignore_ascii_case("localhost") {
		return true;
	}
	host.trim_start_matches('[')
		.trim_end_matches(']')
		.parse::<IpAddr>()
		.is_ok_and(|ip| ip.is_loopback())
}

/// `anchors_<user>_<8 hex chars>`.
pub fn session_name(user: &str) -> String {
	let suffix = Uuid::new_v4().simple().to_string();
	format!("{}_{user}_{}", names::PREFIX, &suffix[..8])
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn loopback_detection() {
		for host in ["localhost", "LocalHost", "127.0.0.1", "127.1.2.3", "::1", "[::1]"] {
			assert!(is_loopback(host), "{host} should be loopback");
		}
		for host in ["example.com", "10.0.0.5", "0.0.0.0", "192.168.1.1", "localhost.example.com"] {
			assert!(!is_loopback(host), "{host} should not be loopback");
		}
	}

	#[test]
	fn generated_session_names_are_prefixed_and_unique() {
		let a = session_name("jdoe");
		let b = session_name("jdoe");
		assert!(a.starts_with("anchors_jdoe_"));
		assert_eq!(a.len(), "anchors_jdoe_".len() + 8);
		assert_ne!(a, b);
	}

	#[test]
	fn request_builder_sets_fields() {
		let request = ConnectRequest::new("127.0.0.1", 7000)
			.name("mine")
			.auto_start(true)
			.force_refresh(true);
		assert_eq!(request.name.as_deref(), Some("mine"));
		assert!(request.auto_start && request.force_refresh);
		assert!(request.launch.is_none());

		let default = ConnectRequest::default();
		assert_eq!((default.ip.as_str(), default.port), ("localhost", 6666));
	}
}
