//! Bookkeeping of servers started by a [`ConnectionManager`](crate::ConnectionManager).
//!
//! Each manager owns its own registry, so two managers in one process never
//! see each other's launches. The registry is informational: it is used for
//! logging and reporting, never to decide whether a shutdown is allowed.

use crate::launcher::ProcessRecord;

#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
	launched: Vec<ProcessRecord>,
	last_port: Option<u16>,
	last_name: Option<String>,
}

impl ProcessRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records a server process started by this manager.
	pub fn record_launch(&mut self, record: ProcessRecord) {
		self.launched.push(record);
	}

	/// Records the endpoint of the most recent successful connection.
	pub fn record_connected(&mut self, port: u16, name: &str) {
		self.last_port = Some(port);
		self.last_name = Some(name.to_string());
	}

	/// Processes launched so far, oldest first.
	pub fn launched(&self) -> &[ProcessRecord] {
		&self.launched
	}

	pub fn last_port(&self) -> Option<u16> {
		self.last_port
	}

	pub fn last_name(&self) -> Option<&str> {
		self.last_name.as_deref()
	}

	/// Most recent launch on `port`, if this manager started a server there.
	pub fn launched_on(&self, port: u16) -> Option<&ProcessRecord> {
		self.launched.iter().rev().find(|r| r.port == port)
	}
}
