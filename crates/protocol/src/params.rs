//! Algorithm hyperparameters forwarded to the server process.
//!
//! The client never interprets these values. They are rendered into the
//! launch command line in a fixed order:
//!
//! ```text
//! -maxAnchorSize <n> -beamSize <n> -delta <f> -epsilon <f> -tau <f>
//! -tauDiscrepancy <f> -initSampleCount <n> -allowSuboptimalSteps <bool> -batchSize <n>
//! ```

use serde::{Deserialize, Serialize};

/// Search settings of the explanation algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Hyperparameters {
	/// Largest rule (number of features) the search may return.
	pub max_anchor_size: u32,
	/// Number of candidates kept per beam search round.
	pub beam_size: u32,
	/// Confidence parameter of the bandit.
	pub delta: f64,
	/// Tolerance of the bandit.
	pub epsilon: f64,
	/// Required precision of an anchor.
	pub tau: f64,
	/// Allowed slack when comparing precision against `tau`.
	pub tau_discrepancy: f64,
	/// Samples drawn per candidate before the bandit starts.
	pub init_sample_count: u32,
	pub allow_suboptimal_steps: bool,
	/// Samples evaluated per model call.
	pub batch_size: u32,
}

impl Default for Hyperparameters {
	fn default() -> Self {
		Self {
			max_anchor_size: 6,
			beam_size: 2,
			delta: 0.1,
			epsilon: 0.1,
			tau: 0.9,
			tau_discrepancy: 0.05,
			init_sample_count: 1,
			allow_suboptimal_steps: true,
			batch_size: 100,
		}
	}
}

impl Hyperparameters {
	/// Renders the flags passed after `-timeout` on the server command line.
	pub fn args(&self) -> Vec<String> {
		vec![
			"-maxAnchorSize".to_string(),
			self.max_anchor_size.to_string(),
			"-beamSize".to_string(),
			self.beam_size.to_string(),
			"-delta".to_string(),
			self.delta.to_string(),
			"-epsilon".to_string(),
			self.epsilon.to_string(),
			"-tau".to_string(),
			self.tau.to_string(),
			"-tauDiscrepancy".to_string(),
			self.tau_discrepancy.to_string(),
			"-initSampleCount".to_string(),
			self.init_sample_count.to_string(),
			"-allowSuboptimalSteps".to_string(),
			self.allow_suboptimal_steps.to_string(),
			"-batchSize".to_string(),
			self.batch_size.to_string(),
		]
	}
}
