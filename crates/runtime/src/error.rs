//! Error types for the anchors runtime.

use std::path::PathBuf;

use thiserror::Error;

/// Where users are pointed when no usable Java runtime exists.
pub const JAVA_DOWNLOAD_URL: &str = "https://adoptium.net/temurin/releases/";

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while establishing or tearing down a server session.
#[derive(Debug, Error)]
pub enum Error {
	/// Caller input rejected before any I/O happened.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// No Java executable was found in any search location.
	#[error("Java runtime not found (searched: {searched}). Install Java 8 or newer from {} or set JAVA_HOME.", JAVA_DOWNLOAD_URL)]
	RuntimeNotFound { searched: String },

	/// A Java executable was found but its version is not supported.
	#[error("Java runtime at {} rejected: {reason}. Install Java 8 or newer from {}.", .path.display(), JAVA_DOWNLOAD_URL)]
	RuntimeVersionRejected { path: PathBuf, reason: String },

	/// The server artifact could not be located, read, or downloaded.
	#[error("Server artifact unavailable: {0}")]
	ArtifactUnavailable(String),

	/// The server process could not be spawned or exited immediately.
	#[error("Failed to launch anchors server: {0}")]
	LaunchFailed(String),

	/// A server was launched but never became connectable.
	#[error("Failed to connect to anchors server at {host}:{port}: {reason}")]
	ConnectionFailed { host: String, port: u16, reason: String },

	/// Nothing listens on the endpoint and auto start was disabled.
	#[error("No anchors server found at {host}:{port}. Start one or connect with auto start enabled.")]
	NoServerFound { host: String, port: u16 },

	/// Auto start was requested for a host that is not this machine.
	#[error("Cannot start an anchors server on remote host '{host}'; only localhost servers can be started automatically.")]
	RemoteStartUnsupported { host: String },

	/// Launch sequence failed; `source` is the originating runtime, artifact, or launch error.
	#[error("Could not start anchors server for {host}:{port}: {source}")]
	StartFailed {
		host: String,
		port: u16,
		#[source]
		source: Box<Error>,
	},

	/// Shutdown was requested on a handle without a live connection.
	#[error("No active connection to an anchors server")]
	NoActiveConnection,

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns the innermost error, unwrapping [`Error::StartFailed`].
	pub fn cause(&self) -> &Error {
		match self {
			Error::StartFailed { source, .. } => source.cause(),
			other => other,
		}
	}

	/// Returns true for terminal states of the connection state machine.
	pub fn is_connection_error(&self) -> bool {
		matches!(
			self,
			Error::ConnectionFailed { .. } | Error::NoServerFound { .. } | Error::RemoteStartUnsupported { .. }
		)
	}

	/// Returns true when the call was rejected before touching the network or filesystem.
	pub fn is_fatal_precondition(&self) -> bool {
		matches!(self, Error::InvalidArgument(_) | Error::NoActiveConnection)
	}

	pub(crate) fn start_failed(host: &str, port: u16, source: Error) -> Self {
		Error::StartFailed {
			host: host.to_string(),
			port,
			source: Box::new(source),
		}
	}
}
