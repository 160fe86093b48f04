//! Token cache behavior against counting and HTTP token sources.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::post;
use common::GatedTokenSource;
use prewarm::provider::fake::FakeProviderBuilder;
use prewarm::{Error, HttpTokenSource, PrewarmConfig, PrewarmPool, TokenCache, TokenSource, WarmConfig};
use tokio::net::TcpListener;

const TTL: Duration = Duration::from_secs(600);

#[tokio::test]
async fn concurrent_callers_share_one_fetch() {
	common::init_tracing();
	let source = GatedTokenSource::held();
	let cache = Arc::new(TokenCache::new(source.clone(), TTL));

	let callers: Vec<_> = (0..5)
		.map(|_| {
			let cache = Arc::clone(&cache);
			tokio::spawn(async move { cache.get_token(false).await })
		})
		.collect();

	// Let every caller reach the pending fetch before it resolves.
	while source.calls() == 0 {
		tokio::task::yield_now().await;
	}
	for _ in 0..10 {
		tokio::task::yield_now().await;
	}
	source.release(1);

	for caller in callers {
		assert_eq!(caller.await.unwrap().as_deref(), Some("token-1"));
	}
	assert_eq!(source.calls(), 1);
	assert_eq!(cache.fetch_count(), 1);
}

#[tokio::test]
async fn cached_token_is_reused_until_forced() {
	let source = GatedTokenSource::open();
	let cache = TokenCache::new(source.clone(), TTL);

	assert_eq!(cache.get_token(false).await.as_deref(), Some("token-1"));
	assert_eq!(cache.get_token(false).await.as_deref(), Some("token-1"));
	assert_eq!(source.calls(), 1);

	assert_eq!(cache.get_token(true).await.as_deref(), Some("token-2"));
	assert_eq!(cache.cached().map(|t| t.value).as_deref(), Some("token-2"));
}

#[tokio::test(start_paused = true)]
async fn expired_token_is_refetched() {
	let source = GatedTokenSource::open();
	let cache = TokenCache::new(source.clone(), TTL);

	assert_eq!(cache.get_token(false).await.as_deref(), Some("token-1"));
	tokio::time::advance(TTL - Duration::from_secs(1)).await;
	assert_eq!(cache.get_token(false).await.as_deref(), Some("token-1"));

	tokio::time::advance(Duration::from_secs(2)).await;
	assert!(cache.cached().is_none());
	assert_eq!(cache.get_token(false).await.as_deref(), Some("token-2"));
	assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn failed_fetch_does_not_block_next_attempt() {
	let source = GatedTokenSource::failing(1);
	let cache = TokenCache::new(source.clone(), TTL);

	assert_eq!(cache.get_token(false).await, None);
	assert!(cache.cached().is_none());
	assert_eq!(cache.get_token(false).await.as_deref(), Some("token-2"));
}

#[tokio::test]
async fn invalidate_forces_refetch() {
	let source = GatedTokenSource::open();
	let cache = TokenCache::new(source.clone(), TTL);

	cache.get_token(false).await;
	cache.invalidate();
	assert_eq!(cache.get_token(false).await.as_deref(), Some("token-2"));
}

async fn serve(router: Router) -> String {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		axum::serve(listener, router).await.unwrap();
	});
	format!("http://{addr}/api/token")
}

#[tokio::test]
async fn http_source_trims_response_body() {
	let endpoint = serve(Router::new().route("/api/token", post(|| async { "  abc123\n" }))).await;
	let source = HttpTokenSource::new(endpoint, Duration::from_secs(5)).unwrap();

	assert_eq!(source.fetch_token().await.unwrap(), "abc123");
}

#[tokio::test]
async fn http_source_rejects_error_status() {
	let endpoint = serve(Router::new().route(
		"/api/token",
		post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
	))
	.await;
	let source = HttpTokenSource::new(endpoint, Duration::from_secs(5)).unwrap();

	let err = source.fetch_token().await.unwrap_err();
	assert!(matches!(err, Error::TokenFetch(ref msg) if msg.contains("500")), "{err}");
}

#[tokio::test]
async fn http_source_rejects_empty_body() {
	let endpoint = serve(Router::new().route("/api/token", post(|| async { "   " }))).await;
	let source = HttpTokenSource::new(endpoint, Duration::from_secs(5)).unwrap();

	let err = source.fetch_token().await.unwrap_err();
	assert!(matches!(err, Error::TokenFetch(_)), "{err}");
}

#[tokio::test]
async fn http_source_failure_surfaces_as_none_from_cache() {
	let endpoint = serve(Router::new().route(
		"/api/token",
		post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "") }),
	))
	.await;
	let source = HttpTokenSource::new(endpoint, Duration::from_secs(5)).unwrap();
	let cache = TokenCache::new(Arc::new(source), TTL);

	assert_eq!(cache.get_token(false).await, None);
}

#[tokio::test]
async fn pool_from_config_fetches_tokens_over_http() {
	common::init_tracing();
	let endpoint = serve(Router::new().route("/api/token", post(|| async { "live-token\n" }))).await;
	let (provider, controller) = FakeProviderBuilder::new().build();
	let config = PrewarmConfig {
		token_endpoint: Some(endpoint),
		..PrewarmConfig::default()
	};

	let pool = PrewarmPool::from_config(config, Arc::new(provider)).unwrap();

	assert!(pool.start_warming(WarmConfig::new("avatar-1")).await.is_ready());
	assert_eq!(controller.tokens(), vec!["live-token"]);
}

#[test]
fn pool_from_config_requires_endpoint() {
	let (provider, _controller) = FakeProviderBuilder::new().build();

	let err = PrewarmPool::from_config(PrewarmConfig::default(), Arc::new(provider)).err().unwrap();
	assert!(matches!(err, Error::Config(_)), "{err}");
}
