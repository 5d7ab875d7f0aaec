//! Connect to a server, starting one locally when `--start` is given.
//!
//! The CLI process exits right after printing, so without `--shutdown` the
//! socket is simply closed and a started server lives on until its idle
//! timeout.

use anchors_runtime::ConnectionManager;

use crate::cli::ConnectArgs;
use crate::error::Result;
use crate::output::{OutputFormat, ResultBuilder, SessionData, print_result};

pub async fn execute(args: ConnectArgs, format: OutputFormat) -> Result<()> {
	let mut manager = ConnectionManager::from_env()?;
	let mut handle = manager.connect(args.to_request()).await?;

	let pid = manager.registry().launched_on(handle.port()).map(|r| r.pid);

	if args.shutdown {
		handle.shutdown().await?;
	} else {
		handle.close();
	}

	let data = SessionData {
		host: handle.host().to_string(),
		port: handle.port(),
		name: handle.name().to_string(),
		launched: handle.launched(),
		pid,
		shutdown: args.shutdown,
	};
	print_result(&ResultBuilder::new("connect").data(data).build(), format);
	Ok(())
}
