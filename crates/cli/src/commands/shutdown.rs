use anchors_runtime::{ConnectRequest, ConnectionManager};
use tracing::debug;

use crate::cli::EndpointArgs;
use crate::error::Result;
use crate::output::{OutputFormat, ResultBuilder, ShutdownData, print_result};

/// Connects without auto start and sends quit.
pub async fn execute(endpoint: EndpointArgs, format: OutputFormat) -> Result<()> {
	let mut manager = ConnectionManager::from_env()?;
	let mut handle = manager.connect(ConnectRequest::new(endpoint.ip, endpoint.port)).await?;
	debug!(target = "anchors", name = handle.name(), "sending quit");
	handle.shutdown().await?;

	let data = ShutdownData {
		host: handle.host().to_string(),
		port: handle.port(),
	};
	print_result(&ResultBuilder::new("shutdown").data(data).build(), format);
	Ok(())
}
