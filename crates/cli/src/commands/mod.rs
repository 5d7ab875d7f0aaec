mod connect;
mod fetch;
mod runtime;
mod shutdown;

use crate::cli::Commands;
use crate::error::Result;
use crate::output::OutputFormat;

pub async fn dispatch(command: Commands, format: OutputFormat) -> Result<()> {
	match command {
		Commands::Connect(args) => connect::execute(args, format).await,
		Commands::Shutdown(endpoint) => shutdown::execute(endpoint, format).await,
		Commands::Fetch { force } => fetch::execute(force, format).await,
		Commands::Runtime => runtime::execute(format).await,
	}
}
