//! Warm, optionally restart, then consume twice, and report what happened.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use prewarm::provider::fake::{FakeProviderBuilder, FakeProviderController, FakeStart};
use prewarm::{
	ConsumeMiss, HandleSummary, HttpTokenSource, PrewarmConfig, PrewarmPool, StaticTokenSource, StatsSnapshot, TokenSource,
	WarmConfig, WarmOutcome, WarmingStatus,
};
use serde::Serialize;
use tracing::{info, warn};

/// Token handed out when no endpoint is configured.
pub const STATIC_TOKEN: &str = "sim-token";

#[derive(Debug, Clone)]
pub struct ScenarioOptions {
	pub config_path: Option<PathBuf>,
	pub resource: String,
	pub variant: Option<String>,
	pub locale: Option<String>,
	pub token_endpoint: Option<String>,
	pub capacity_failures: u32,
	pub no_stream: bool,
	pub disconnect: Option<String>,
	pub start_latency_ms: u64,
	pub stream_latency_ms: u64,
	pub restart_variant: Option<String>,
	pub prefetch: bool,
}

impl Default for ScenarioOptions {
	fn default() -> Self {
		Self {
			config_path: None,
			resource: "avatar-1".to_string(),
			variant: None,
			locale: None,
			token_endpoint: None,
			capacity_failures: 0,
			no_stream: false,
			disconnect: None,
			start_latency_ms: 0,
			stream_latency_ms: 0,
			restart_variant: None,
			prefetch: false,
		}
	}
}

/// Result of one consume call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum ConsumeReport {
	Hit { handle: HandleSummary },
	Miss { reason: ConsumeMiss },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
	pub warm: WarmOutcome,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub restart: Option<WarmOutcome>,
	pub status: WarmingStatus,
	pub token_prefetched: Option<bool>,
	pub consumes: Vec<ConsumeReport>,
	pub sessions_created: usize,
	pub sessions_live: Vec<String>,
	pub stats: StatsSnapshot,
}

fn load_config(options: &ScenarioOptions) -> Result<PrewarmConfig> {
	let mut config = match &options.config_path {
		Some(path) => PrewarmConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))?,
		None => PrewarmConfig::default(),
	};
	if let Some(endpoint) = &options.token_endpoint {
		config.token_endpoint = Some(endpoint.clone());
	}
	config.validate()?;
	Ok(config)
}

fn token_source(config: &PrewarmConfig) -> Result<Arc<dyn TokenSource>> {
	let source: Arc<dyn TokenSource> = match &config.token_endpoint {
		Some(endpoint) => Arc::new(HttpTokenSource::new(endpoint.clone(), config.token_request_timeout())?),
		None => Arc::new(StaticTokenSource(STATIC_TOKEN.to_string())),
	};
	Ok(source)
}

fn provider(options: &ScenarioOptions) -> FakeProviderBuilder {
	let mut builder = FakeProviderBuilder::new()
		.start_latency(Duration::from_millis(options.start_latency_ms))
		.stream_latency(Duration::from_millis(options.stream_latency_ms));

	for _ in 0..options.capacity_failures {
		builder = builder.script(FakeStart::capacity_limit());
	}
	if let Some(reason) = &options.disconnect {
		builder = builder.script(FakeStart::Disconnect(reason.clone()));
	} else if options.no_stream {
		builder = builder.script(FakeStart::NoStream);
	}
	builder
}

fn warm_config(options: &ScenarioOptions, variant: Option<&String>) -> WarmConfig {
	let mut config = WarmConfig::new(options.resource.clone());
	if let Some(variant) = variant {
		config = config.with_variant(variant.clone());
	}
	if let Some(locale) = &options.locale {
		config = config.with_locale(locale.clone());
	}
	config
}

async fn consume_once(pool: &PrewarmPool, expected: &WarmConfig) -> ConsumeReport {
	match pool.try_consume(Some(expected)).await {
		Ok(handle) => {
			let summary = handle.summary();
			// The consumer owns the session; the simulation ends it immediately.
			if let Err(err) = handle.session.stop().await {
				warn!(target = "prewarm.sim", error = %err, "failed to stop consumed session");
			}
			ConsumeReport::Hit { handle: summary }
		}
		Err(reason) => ConsumeReport::Miss { reason },
	}
}

/// Runs the scenario and returns the report.
pub async fn run(options: &ScenarioOptions) -> Result<Report> {
	let config = load_config(options)?;
	let (factory, controller): (_, FakeProviderController) = provider(options).build();
	let pool = PrewarmPool::new(config.clone(), token_source(&config)?, Arc::new(factory));

	let token_prefetched = if options.prefetch {
		Some(pool.prefetch_token_only().await)
	} else {
		None
	};

	let initial = warm_config(options, options.variant.as_ref());
	let warm = pool.start_warming(initial.clone()).await;
	info!(target = "prewarm.sim", outcome = ?warm, "warming settled");

	let (restart, target) = match &options.restart_variant {
		Some(variant) => {
			let target = warm_config(options, Some(variant));
			let outcome = pool.restart_warming(target.clone()).await;
			info!(target = "prewarm.sim", outcome = ?outcome, "restart settled");
			(Some(outcome), target)
		}
		None => (None, initial.clone()),
	};
	let status = pool.status();

	// A consumer on the latest target, then a late one still on the initial config.
	let mut consumes = vec![consume_once(&pool, &target).await];
	consumes.push(consume_once(&pool, &initial).await);

	pool.cancel_warming().await;

	Ok(Report {
		warm,
		restart,
		status,
		token_prefetched,
		consumes,
		sessions_created: controller.created_count(),
		sessions_live: controller.live_sessions(),
		stats: pool.stats(),
	})
}
