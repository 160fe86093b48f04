//! Pool counters: warming cycles, retries, hand-outs and teardowns.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
	pub cycles_started: u64,
	pub cycles_ready: u64,
	pub cycles_failed: u64,
	pub cycles_cancelled: u64,
	pub capacity_retries: u64,
	pub consume_hits: u64,
	pub consume_misses: u64,
	pub sessions_torn_down: u64,
}

#[derive(Debug, Default)]
pub struct PoolStats {
	cycles_started: AtomicU64,
	cycles_ready: AtomicU64,
	cycles_failed: AtomicU64,
	cycles_cancelled: AtomicU64,
	capacity_retries: AtomicU64,
	consume_hits: AtomicU64,
	consume_misses: AtomicU64,
	sessions_torn_down: AtomicU64,
}

impl PoolStats {
	pub fn record_cycle_started(&self) {
		self.cycles_started.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_cycle_ready(&self) {
		self.cycles_ready.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_cycle_failed(&self) {
		self.cycles_failed.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_cycle_cancelled(&self) {
		self.cycles_cancelled.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_capacity_retry(&self) {
		self.capacity_retries.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a consumption attempt and whether it handed out a session.
	pub fn record_consume(&self, hit: bool) {
		if hit {
			self.consume_hits.fetch_add(1, Ordering::Relaxed);
		} else {
			self.consume_misses.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub fn record_teardowns(&self, count: usize) {
		self.sessions_torn_down.fetch_add(count as u64, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> StatsSnapshot {
		StatsSnapshot {
			cycles_started: self.cycles_started.load(Ordering::Relaxed),
			cycles_ready: self.cycles_ready.load(Ordering::Relaxed),
			cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
			cycles_cancelled: self.cycles_cancelled.load(Ordering::Relaxed),
			capacity_retries: self.capacity_retries.load(Ordering::Relaxed),
			consume_hits: self.consume_hits.load(Ordering::Relaxed),
			consume_misses: self.consume_misses.load(Ordering::Relaxed),
			sessions_torn_down: self.sessions_torn_down.load(Ordering::Relaxed),
		}
	}
}
