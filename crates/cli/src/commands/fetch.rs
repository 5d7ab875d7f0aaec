use anchors_runtime::{ArtifactResolver, ArtifactSource, RuntimeConfig};

use crate::error::Result;
use crate::output::{ArtifactData, OutputFormat, ResultBuilder, print_result};

pub async fn execute(force: bool, format: OutputFormat) -> Result<()> {
	let resolver = ArtifactResolver::from_config(RuntimeConfig::from_env())?;
	let location = resolver.resolve(force).await?;

	let data = ArtifactData {
		path: location.path,
		version: location.version,
	};
	print_result(&ResultBuilder::new("fetch").data(data).build(), format);
	Ok(())
}
