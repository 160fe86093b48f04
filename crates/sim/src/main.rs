use clap::Parser;
use prewarm_sim::cli::Cli;
use prewarm_sim::{logging, scenario};
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let report = match scenario::run(&cli.scenario_options()).await {
		Ok(report) => report,
		Err(err) => {
			error!(target = "prewarm.sim", error = %format!("{err:#}"), "scenario failed");
			std::process::exit(1);
		}
	};

	let rendered = if cli.pretty {
		serde_json::to_string_pretty(&report)
	} else {
		serde_json::to_string(&report)
	};
	match rendered {
		Ok(json) => println!("{json}"),
		Err(err) => {
			error!(target = "prewarm.sim", error = %err, "failed to render report");
			std::process::exit(1);
		}
	}
}
