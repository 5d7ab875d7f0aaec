use std::path::PathBuf;

use anchors_protocol::Hyperparameters;
use anchors_runtime::{ConnectRequest, DEFAULT_PORT, LaunchOptions};
use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "anchors")]
#[command(about = "Connect to, start and stop the anchors analysis server")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: text (default) or json
	#[arg(short = 'f', long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Connect to a server, optionally starting one on this machine
	Connect(ConnectArgs),

	/// Ask a running server to quit
	Shutdown(EndpointArgs),

	/// Resolve the server jar, downloading it when missing
	Fetch {
		/// Ignore bundled and cached copies and download again
		#[arg(long)]
		force: bool,
	},

	/// Locate and check the Java runtime
	Runtime,
}

impl Commands {
	/// Name used in the result envelope.
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Connect(_) => "connect",
			Commands::Shutdown(_) => "shutdown",
			Commands::Fetch { .. } => "fetch",
			Commands::Runtime => "runtime",
		}
	}
}

#[derive(Args, Debug, Clone)]
pub struct EndpointArgs {
	/// Server host
	#[arg(long, env = "ANCHORS_IP", default_value = "localhost")]
	pub ip: String,

	/// Server port
	#[arg(long, env = "ANCHORS_PORT", default_value_t = i64::from(DEFAULT_PORT), allow_negative_numbers = true)]
	pub port: i64,
}

#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
	#[command(flatten)]
	pub endpoint: EndpointArgs,

	/// Session name (default: anchors_<user>_<random>)
	#[arg(long)]
	pub name: Option<String>,

	/// Start a local server when none answers
	#[arg(long)]
	pub start: bool,

	/// Download the server jar again before starting
	#[arg(long)]
	pub force_refresh: bool,

	/// Initial Java heap, e.g. 512m
	#[arg(long, value_name = "SIZE")]
	pub min_mem: Option<String>,

	/// Maximum Java heap, e.g. 4g
	#[arg(long, value_name = "SIZE")]
	pub max_mem: Option<String>,

	/// Extra classpath entry (repeatable)
	#[arg(long = "classpath", value_name = "PATH")]
	pub classpath: Vec<PathBuf>,

	/// Main class used together with --classpath
	#[arg(long, value_name = "CLASS")]
	pub main_class: Option<String>,

	#[command(flatten)]
	pub params: HyperparameterArgs,

	/// Send quit right after connecting
	#[arg(long)]
	pub shutdown: bool,
}

impl ConnectArgs {
	pub fn to_request(&self) -> ConnectRequest {
		let launch = LaunchOptions {
			min_mem: self.min_mem.clone(),
			max_mem: self.max_mem.clone(),
			extra_classpath: self.classpath.clone(),
			main_class: self.main_class.clone(),
			params: self.params.apply(Hyperparameters::default()),
		};

		let mut request = ConnectRequest::new(self.endpoint.ip.clone(), self.endpoint.port)
			.auto_start(self.start)
			.force_refresh(self.force_refresh)
			.launch(launch);
		request.name = self.name.clone();
		request
	}
}

/// Algorithm settings forwarded to a started server. Unset flags keep the server defaults.
#[derive(Args, Debug, Clone, Default)]
#[command(next_help_heading = "Algorithm")]
pub struct HyperparameterArgs {
	#[arg(long, value_name = "N")]
	pub max_anchor_size: Option<u32>,

	#[arg(long, value_name = "N")]
	pub beam_size: Option<u32>,

	#[arg(long)]
	pub delta: Option<f64>,

	#[arg(long)]
	pub epsilon: Option<f64>,

	#[arg(long)]
	pub tau: Option<f64>,

	#[arg(long)]
	pub tau_discrepancy: Option<f64>,

	#[arg(long, value_name = "N")]
	pub init_sample_count: Option<u32>,

	#[arg(long, value_name = "BOOL")]
	pub allow_suboptimal_steps: Option<bool>,

	#[arg(long, value_name = "N")]
	pub batch_size: Option<u32>,
}

impl HyperparameterArgs {
	pub fn apply(&self, mut params: Hyperparameters) -> Hyperparameters {
		if let Some(v) = self.max_anchor_size {
			params.max_anchor_size = v;
		}
		if let Some(v) = self.beam_size {
			params.beam_size = v;
		}
		if let Some(v) = self.delta {
			params.delta = v;
		}
		if let Some(v) = self.epsilon {
			params.epsilon = v;
		}
		if let Some(v) = self.tau {
			params.tau = v;
		}
		if let Some(v) = self.tau_discrepancy {
			params.tau_discrepancy = v;
		}
		if let Some(v) = self.init_sample_count {
			params.init_sample_count = v;
		}
		if let Some(v) = self.allow_suboptimal_steps {
			params.allow_suboptimal_steps = v;
		}
		if let Some(v) = self.batch_size {
			params.batch_size = v;
		}
		params
	}
}
