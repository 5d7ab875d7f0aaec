//! Control messages sent from the client to a running server.
//!
//! The protocol is one-way: the client writes a single compact JSON object
//! terminated by `\n` and never waits for an answer. The only command the
//! server understands today is quit:
//!
//! ```text
//! {"quit":1}
//! ```

use serde::{Deserialize, Serialize};

/// Command understood by the server's control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
	/// Ask the server to terminate.
	Quit,
}

/// On-the-wire object. Every command is a top-level integer flag.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WireMessage {
	#[serde(skip_serializing_if = "Option::is_none")]
	quit: Option<i64>,
}

impl ControlMessage {
	/// Serializes the message as compact JSON without the line terminator.
	pub fn to_json(&self) -> serde_json::Result<String> {
		let wire = match self {
			ControlMessage::Quit => WireMessage { quit: Some(1) },
		};
		serde_json::to_string(&wire)
	}

	/// Serializes the message as one newline-terminated line.
	pub fn to_line(&self) -> serde_json::Result<String> {
		let mut line = self.to_json()?;
		line.push('\n');
		Ok(line)
	}

	/// Decodes a single line received on the server side.
	///
	/// Returns `None` for malformed JSON, unknown commands, or a zero flag.
	pub fn parse_line(line: &str) -> Option<Self> {
		let wire: WireMessage = serde_json::from_str(line.trim_end()).ok()?;
		match wire.quit {
			Some(flag) if flag != 0 => Some(ControlMessage::Quit),
			_ => None,
		}
	}
}
