use crate::driver::{BusError, Driver};
use std::collections::{hash_map::Entry, HashMap};
use tokio::sync::Mutex;

/// Reference-counted view of the process's bus subscriptions.
///
/// A channel is acquired once per reason to listen: a bound namespace, a
/// non-empty local room, an in-flight clients query. The bus sees a
/// single `SUBSCRIBE` on the first acquire and a single `UNSUBSCRIBE`
/// when the last holder releases. The table lock is held across the
/// driver call, so a concurrent acquire of the same channel waits behind
/// the in-flight subscribe instead of issuing its own.
#[derive(Debug, Default)]
pub(crate) struct Subscriptions {
	channels: Mutex<HashMap<String, usize>>,
}

impl Subscriptions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Ensures the process is subscribed to `channel`. On driver failure
	/// the refcount is left untouched so the caller may retry.
	pub async fn acquire<D: Driver>(&self, driver: &D, channel: &str) -> Result<(), BusError> {
		let mut channels = self.channels.lock().await;
		match channels.entry(channel.to_owned()) {
			Entry::Occupied(mut entry) => {
				*entry.get_mut() += 1;
				Ok(())
			}
			Entry::Vacant(entry) => {
				driver.subscribe(channel).await?;
				entry.insert(1);
				Ok(())
			}
		}
	}

	/// Drops one hold on `channel`, unsubscribing when it was the last.
	/// On driver failure the refcount is restored so the caller may
	/// retry.
	pub async fn release<D: Driver>(&self, driver: &D, channel: &str) -> Result<(), BusError> {
		let mut channels = self.channels.lock().await;
		match channels.get_mut(channel) {
			Some(count) if *count > 1 => {
				*count -= 1;
				Ok(())
			}
			Some(_) => {
				driver.unsubscribe(channel).await?;
				channels.remove(channel);
				Ok(())
			}
			None => {
				tracing::debug!(channel, "release of a channel that is not held");
				Ok(())
			}
		}
	}

	/// Current hold count for `channel`.
	#[cfg(test)]
	pub async fn count(&self, channel: &str) -> usize {
		self.channels.lock().await.get(channel).copied().unwrap_or(0)
	}
}

#[cfg(test)]
mod tests {
	use super::Subscriptions;
	use crate::driver::{Driver, MemoryBus};

	#[tokio::test]
	async fn one_bus_subscription_regardless_of_holds() {
		let bus = MemoryBus::new();
		let (driver, _rx) = bus.driver();
		let subscriptions = Subscriptions::new();

		subscriptions.acquire(&driver, "chan").await.unwrap();
		subscriptions.acquire(&driver, "chan").await.unwrap();
		assert_eq!(subscriptions.count("chan").await, 2);
		assert_eq!(driver.subscriber_count("chan").await.unwrap(), 1);

		subscriptions.release(&driver, "chan").await.unwrap();
		assert_eq!(driver.subscriber_count("chan").await.unwrap(), 1);

		subscriptions.release(&driver, "chan").await.unwrap();
		assert_eq!(subscriptions.count("chan").await, 0);
		assert_eq!(driver.subscriber_count("chan").await.unwrap(), 0);
	}

	#[tokio::test]
	async fn failed_driver_calls_roll_the_refcount_back() {
		let bus = MemoryBus::new();
		let (driver, _rx) = bus.driver();
		let subscriptions = Subscriptions::new();

		driver.disconnect();
		assert!(subscriptions.acquire(&driver, "chan").await.is_err());
		assert_eq!(subscriptions.count("chan").await, 0);

		driver.reconnect();
		subscriptions.acquire(&driver, "chan").await.unwrap();

		driver.disconnect();
		assert!(subscriptions.release(&driver, "chan").await.is_err());
		assert_eq!(subscriptions.count("chan").await, 1);

		driver.reconnect();
		subscriptions.release(&driver, "chan").await.unwrap();
		assert_eq!(subscriptions.count("chan").await, 0);
		assert_eq!(driver.subscriber_count("chan").await.unwrap(), 0);
	}

	#[tokio::test]
	async fn releasing_an_unheld_channel_is_a_no_op() {
		let bus = MemoryBus::new();
		let (driver, _rx) = bus.driver();
		let subscriptions = Subscriptions::new();

		subscriptions.release(&driver, "chan").await.unwrap();
		assert_eq!(driver.subscriber_count("chan").await.unwrap(), 0);
	}
}
