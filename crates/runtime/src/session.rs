//! Live sessions and the client-to-server control channel.

use anchors_protocol::ControlMessage;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// A connection to a running anchors server.
///
/// The handle exclusively owns the socket. Liveness was observed when the
/// handle was built and is not re-checked afterwards; a server that exits on
/// its own leaves the handle stale until the next write fails.
#[derive(Debug)]
pub struct SessionHandle {
	stream: Option<TcpStream>,
	host: String,
	port: u16,
	name: String,
	launched: bool,
}

impl SessionHandle {
	pub(crate) fn new(stream: TcpStream, host: String, port: u16, name: String, launched: bool) -> Self {
		Self {
			stream: Some(stream),
			host,
			port,
			name,
			launched,
		}
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	/// Session name, user-supplied or generated.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Whether the connect call that produced this handle started the server.
	pub fn launched(&self) -> bool {
		self.launched
	}

	pub fn is_connected(&self) -> bool {
		self.stream.is_some()
	}

	/// Drops the socket without telling the server; it exits on its idle timeout.
	pub fn close(&mut self) {
		if self.stream.take().is_some() {
			debug!(target = "anchors", host = %self.host, port = self.port, "session closed");
		}
	}

	/// Sends quit and invalidates the handle. See [`shutdown`].
	pub async fn shutdown(&mut self) -> Result<()> {
		shutdown(self).await
	}
}

/// One-shot writer of a single control message.
///
/// Borrows the socket for exactly one send; [`ControlChannel::send`] consumes
/// the channel so a second message cannot be written through it.
pub struct ControlChannel<'a, S> {
	stream: &'a mut S,
}

impl<'a, S> ControlChannel<'a, S>
where
	S: AsyncWrite + Unpin,
{
	pub fn new(stream: &'a mut S) -> Self {
		Self { stream }
	}

	/// Writes `message` as one line, flushes, and closes the write side.
	///
	/// No answer is awaited.
	pub async fn send(self, message: ControlMessage) -> Result<()> {
		let line = message.to_line()?;
		self.stream.write_all(line.as_bytes()).await?;
		self.stream.flush().await?;
		self.stream.shutdown().await?;
		Ok(())
	}
}

/// Asks the server behind `handle` to quit, then closes the connection.
///
/// The socket is detached from the handle before any I/O, so the handle is
/// invalidated even when the write fails.
///
/// # Errors
///
/// Returns [`Error::NoActiveConnection`] without any I/O if the handle holds no socket,
/// or an I/O error if the write fails.
pub async fn shutdown(handle: &mut SessionHandle) -> Result<()> {
	let Some(mut stream) = handle.stream.take() else {
		return Err(Error::NoActiveConnection);
	};

	info!(
		target = "anchors",
		host = %handle.host,
		port = handle.port,
		name = %handle.name,
		"Shutting down anchors server"
	);
	ControlChannel::new(&mut stream).send(ControlMessage::Quit).await
}
