//! Change notification for UI surfaces observing the pool.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::warn;

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
	next_id: u64,
	callbacks: Vec<(u64, Callback)>,
}

/// Ordered set of zero-argument callbacks invoked on every pool state change.
///
/// Callbacks carry no payload; they read whatever they need from the pool.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
	inner: Arc<Mutex<Registry>>,
}

impl SubscriberRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `callback`. It stays registered until the returned
	/// [`Subscription`] is dropped or unsubscribed.
	pub fn subscribe<F>(&self, callback: F) -> Subscription
	where
		F: Fn() + Send + Sync + 'static,
	{
		let mut registry = self.inner.lock();
		let id = registry.next_id;
		registry.next_id += 1;
		registry.callbacks.push((id, Arc::new(callback)));

		Subscription {
			id,
			registry: Arc::downgrade(&self.inner),
		}
	}

	/// Invokes every registered callback in registration order.
	///
	/// The registry lock is released before any callback runs, so callbacks may
	/// subscribe or unsubscribe. A panicking callback does not stop the rest.
	pub fn publish(&self) {
		let callbacks: Vec<Callback> = self.inner.lock().callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect();

		for callback in callbacks {
			if catch_unwind(AssertUnwindSafe(|| (*callback)())).is_err() {
				warn!(target = "prewarm.pool", "subscriber callback panicked");
			}
		}
	}

	pub fn len(&self) -> usize {
		self.inner.lock().callbacks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Registration handle returned by [`SubscriberRegistry::subscribe`].
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
	id: u64,
	registry: Weak<Mutex<Registry>>,
}

impl Subscription {
	pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(registry) = self.registry.upgrade() {
			registry.lock().callbacks.retain(|(id, _)| *id != self.id);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	#[test]
	fn publishes_in_registration_order() {
		let registry = SubscriberRegistry::new();
		let seen = Arc::new(Mutex::new(Vec::new()));

		let subs: Vec<Subscription> = (0..3)
			.map(|i| {
				let seen = Arc::clone(&seen);
				registry.subscribe(move || seen.lock().push(i))
			})
			.collect();

		registry.publish();
		assert_eq!(*seen.lock(), vec![0, 1, 2]);
		drop(subs);
	}

	#[test]
	fn unsubscribe_removes_only_that_callback() {
		let registry = SubscriberRegistry::new();
		let count = Arc::new(AtomicUsize::new(0));

		let first = {
			let count = Arc::clone(&count);
			registry.subscribe(move || {
				count.fetch_add(1, Ordering::SeqCst);
			})
		};
		let _second = {
			let count = Arc::clone(&count);
			registry.subscribe(move || {
				count.fetch_add(10, Ordering::SeqCst);
			})
		};

		first.unsubscribe();
		assert_eq!(registry.len(), 1);
		registry.publish();
		assert_eq!(count.load(Ordering::SeqCst), 10);
	}

	#[test]
	fn panicking_callback_does_not_block_others() {
		let registry = SubscriberRegistry::new();
		let count = Arc::new(AtomicUsize::new(0));

		let _bad = registry.subscribe(|| panic!("boom"));
		let _good = {
			let count = Arc::clone(&count);
			registry.subscribe(move || {
				count.fetch_add(1, Ordering::SeqCst);
			})
		};

		registry.publish();
		registry.publish();
		assert_eq!(count.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn callback_may_unsubscribe_during_publish() {
		let registry = SubscriberRegistry::new();
		let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

		let sub = {
			let slot = Arc::clone(&slot);
			registry.subscribe(move || {
				slot.lock().take();
			})
		};
		*slot.lock() = Some(sub);

		registry.publish();
		assert!(registry.is_empty());
	}
}
