use tracing_subscriber::EnvFilter;

/// Environment variable overriding the verbosity flags.
pub const LOG_ENV: &str = "PREWARM_LOG";

/// Installs the stderr subscriber. Stdout is reserved for the report.
pub fn init_logging(verbosity: u8) {
	let level = match verbosity {
		0 => "warn",
		1 => "info",
		2 => "debug",
		_ => "trace",
	};

	let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(format!("prewarm={level},prewarm_sim={level}")));

	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(true)
		.with_writer(std::io::stderr)
		.try_init();
}
