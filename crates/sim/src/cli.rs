use std::path::PathBuf;

use clap::Parser;

use crate::scenario::ScenarioOptions;

#[derive(Parser, Debug)]
#[command(name = "prewarm-sim")]
#[command(about = "Warm and consume a session against a simulated avatar provider")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Pool config file (JSON, camelCase keys)
	#[arg(long, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Avatar resource to warm
	#[arg(long, default_value = "avatar-1")]
	pub resource: String,

	/// Context payload variant label
	#[arg(long)]
	pub variant: Option<String>,

	/// Locale hint passed to the provider
	#[arg(long)]
	pub locale: Option<String>,

	/// Fetch tokens from this endpoint instead of a static token
	#[arg(long, value_name = "URL")]
	pub token_endpoint: Option<String>,

	/// Number of starts the provider rejects as over capacity
	#[arg(long, default_value_t = 0)]
	pub capacity_failures: u32,

	/// Provider never reports the media stream
	#[arg(long)]
	pub no_stream: bool,

	/// Provider drops the stream before it is ready
	#[arg(long, value_name = "REASON", conflicts_with = "no_stream")]
	pub disconnect: Option<String>,

	/// Delay inside every provider start (ms)
	#[arg(long, default_value_t = 0)]
	pub start_latency_ms: u64,

	/// Delay between start and stream readiness (ms)
	#[arg(long, default_value_t = 0)]
	pub stream_latency_ms: u64,

	/// Restart warming for this variant before consuming
	#[arg(long, value_name = "VARIANT")]
	pub restart_variant: Option<String>,

	/// Prefetch the token before warming
	#[arg(long)]
	pub prefetch: bool,

	/// Pretty-print the JSON report
	#[arg(long)]
	pub pretty: bool,
}

impl Cli {
	pub fn scenario_options(&self) -> ScenarioOptions {
		ScenarioOptions {
			config_path: self.config.clone(),
			resource: self.resource.clone(),
			variant: self.variant.clone(),
			locale: self.locale.clone(),
			token_endpoint: self.token_endpoint.clone(),
			capacity_failures: self.capacity_failures,
			no_stream: self.no_stream,
			disconnect: self.disconnect.clone(),
			start_latency_ms: self.start_latency_ms,
			stream_latency_ms: self.stream_latency_ms,
			restart_variant: self.restart_variant.clone(),
			prefetch: self.prefetch,
		}
	}
}
