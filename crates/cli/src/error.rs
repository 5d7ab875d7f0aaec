use anchors_runtime::Error as RuntimeError;
use serde_json::json;
use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Runtime(#[from] RuntimeError),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl CliError {
	/// Converts this error to the structured error payload.
	///
	/// The code follows the innermost runtime error, so a launch that failed
	/// because `java` is missing reports `RUNTIME_NOT_FOUND`. The message keeps
	/// the full chain.
	pub fn to_command_error(&self) -> CommandError {
		let (code, details) = match self {
			CliError::Runtime(err) => classify(err),
			CliError::Io(_) => (ErrorCode::IoError, None),
			CliError::Json(_) => (ErrorCode::InternalError, None),
		};

		CommandError {
			code,
			message: self.to_string(),
			details,
		}
	}
}

fn classify(err: &RuntimeError) -> (ErrorCode, Option<serde_json::Value>) {
	let endpoint = match err {
		RuntimeError::StartFailed { host, port, .. }
		| RuntimeError::ConnectionFailed { host, port, .. }
		| RuntimeError::NoServerFound { host, port } => Some(json!({ "host": host, "port": port })),
		RuntimeError::RemoteStartUnsupported { host } => Some(json!({ "host": host })),
		_ => None,
	};

	let code = match err.cause() {
		RuntimeError::InvalidArgument(_) => ErrorCode::InvalidInput,
		RuntimeError::RuntimeNotFound { .. } => ErrorCode::RuntimeNotFound,
		RuntimeError::RuntimeVersionRejected { .. } => ErrorCode::RuntimeRejected,
		RuntimeError::ArtifactUnavailable(_) => ErrorCode::ArtifactUnavailable,
		RuntimeError::LaunchFailed(_) => ErrorCode::LaunchFailed,
		RuntimeError::ConnectionFailed { .. } => ErrorCode::ConnectionFailed,
		RuntimeError::NoServerFound { .. } => ErrorCode::NoServerFound,
		RuntimeError::RemoteStartUnsupported { .. } => ErrorCode::RemoteStartUnsupported,
		RuntimeError::NoActiveConnection => ErrorCode::NoActiveConnection,
		RuntimeError::Io(_) => ErrorCode::IoError,
		RuntimeError::StartFailed { .. } | RuntimeError::Json(_) => ErrorCode::InternalError,
	};

	(code, endpoint)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn start_failure_reports_innermost_code_and_endpoint() {
		let inner = RuntimeError::RuntimeNotFound {
			searched: "PATH".to_string(),
		};
		let err = CliError::from(RuntimeError::StartFailed {
			host: "localhost".to_string(),
			port: 6666,
			source: Box::new(inner),
		});

		let payload = err.to_command_error();
		assert_eq!(payload.code, ErrorCode::RuntimeNotFound);
		assert!(payload.message.contains("localhost:6666"));
		assert_eq!(payload.details, Some(json!({ "host": "localhost", "port": 6666 })));
	}

	#[test]
	fn connection_states_map_to_codes() {
		let cases = [
			(
				RuntimeError::NoServerFound {
					host: "localhost".to_string(),
					port: 6666,
				},
				ErrorCode::NoServerFound,
			),
			(
				RuntimeError::RemoteStartUnsupported {
					host: "10.0.0.5".to_string(),
				},
				ErrorCode::RemoteStartUnsupported,
			),
			(RuntimeError::InvalidArgument("port".to_string()), ErrorCode::InvalidInput),
			(RuntimeError::NoActiveConnection, ErrorCode::NoActiveConnection),
		];

		for (err, code) in cases {
			assert_eq!(CliError::from(err).to_command_error().code, code);
		}
	}

	#[test]
	fn error_code_serializes_screaming_snake() {
		let json = serde_json::to_string(&ErrorCode::RemoteStartUnsupported).unwrap();
		assert_eq!(json, "\"REMOTE_START_UNSUPPORTED\"");
		assert_eq!(ErrorCode::NoServerFound.to_string(), "NO_SERVER_FOUND");
	}
}
