use anchors_runtime::{RuntimeConfig, RuntimeLocator, RuntimeProvider};

use crate::error::Result;
use crate::output::{OutputFormat, ResultBuilder, RuntimeData, print_result};

pub async fn execute(format: OutputFormat) -> Result<()> {
	let locator = RuntimeLocator::from_config(&RuntimeConfig::from_env());
	let runtime = locator.resolve().await?;

	let data = RuntimeData {
		executable: runtime.executable,
		version: runtime.version,
		client_vm: runtime.client_vm,
	};
	print_result(&ResultBuilder::new("runtime").data(data).build(), format);
	Ok(())
}
