use super::{BusError, BusMessage, Driver, MessageRx};
use bytes::Bytes;
use std::{
	collections::{HashMap, HashSet},
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex,
	},
};
use tokio::sync::{broadcast, mpsc};

const BUS_CAPACITY: usize = 1024;

/// An in-process bus with the same contract as a real deployment.
///
/// Every [`MemoryDriver`] connected to the same bus sees messages
/// published by any of them, and `subscriber_count` reflects the drivers
/// currently subscribed to a channel. Useful for tests and single-node
/// setups.
#[derive(Clone, Debug)]
pub struct MemoryBus {
	inner: Arc<BusShared>,
}

#[derive(Debug)]
struct BusShared {
	messages: broadcast::Sender<BusMessage>,
	subscribers: Mutex<HashMap<String, usize>>,
}

impl MemoryBus {
	pub fn new() -> Self {
		let (messages, _) = broadcast::channel(BUS_CAPACITY);
		Self {
			inner: Arc::new(BusShared {
				messages,
				subscribers: Mutex::new(HashMap::new()),
			}),
		}
	}

	/// Connects a new driver, returning it with its message stream.
	pub fn driver(&self) -> (MemoryDriver, MessageRx) {
		let (tx, rx) = mpsc::unbounded_channel();
		let subscriptions = Arc::new(Mutex::new(HashSet::new()));

		let mut bus_rx = self.inner.messages.subscribe();
		let filter = Arc::clone(&subscriptions);
		tokio::spawn(async move {
			loop {
				match bus_rx.recv().await {
					Ok((channel, payload)) => {
						if !filter.lock().unwrap().contains(channel.as_str()) {
							continue;
						}
						if tx.send((channel, payload)).is_err() {
							break;
						}
					}
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						tracing::warn!(skipped, "memory bus receiver lagged");
					}
					Err(broadcast::error::RecvError::Closed) => break,
				}
			}
		});

		(
			MemoryDriver {
				bus: self.clone(),
				subscriptions,
				connected: Arc::new(AtomicBool::new(true)),
			},
			rx,
		)
	}
}

impl Default for MemoryBus {
	fn default() -> Self {
		Self::new()
	}
}

/// One connection to a [`MemoryBus`].
#[derive(Clone, Debug)]
pub struct MemoryDriver {
	bus: MemoryBus,
	subscriptions: Arc<Mutex<HashSet<String>>>,
	connected: Arc<AtomicBool>,
}

impl MemoryDriver {
	/// Simulates losing the bus connection: every following operation
	/// fails with [`BusError::Closed`] until
	/// [`reconnect`](MemoryDriver::reconnect). Clones of the driver share
	/// the switch. Messages already in flight still deliver.
	pub fn disconnect(&self) {
		self.connected.store(false, Ordering::SeqCst);
	}

	/// Undoes [`disconnect`](MemoryDriver::disconnect).
	pub fn reconnect(&self) {
		self.connected.store(true, Ordering::SeqCst);
	}

	fn ensure_connected(&self) -> Result<(), BusError> {
		if self.connected.load(Ordering::SeqCst) {
			Ok(())
		} else {
			Err(BusError::Closed)
		}
	}
}

impl Driver for MemoryDriver {
	async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BusError> {
		self.ensure_connected()?;
		// A send error only means nobody is subscribed right now.
		let _ = self
			.bus
			.inner
			.messages
			.send((channel.to_owned(), Bytes::from(payload)));
		Ok(())
	}

	async fn subscribe(&self, channel: &str) -> Result<(), BusError> {
		self.ensure_connected()?;
		if self.subscriptions.lock().unwrap().insert(channel.to_owned()) {
			*self
				.bus
				.inner
				.subscribers
				.lock()
				.unwrap()
				.entry(channel.to_owned())
				.or_insert(0) += 1;
		}
		Ok(())
	}

	async fn unsubscribe(&self, channel: &str) -> Result<(), BusError> {
		self.ensure_connected()?;
		if self.subscriptions.lock().unwrap().remove(channel) {
			let mut subscribers = self.bus.inner.subscribers.lock().unwrap();
			if let Some(count) = subscribers.get_mut(channel) {
				*count -= 1;
				if *count == 0 {
					subscribers.remove(channel);
				}
			}
		}
		Ok(())
	}

	async fn subscriber_count(&self, channel: &str) -> Result<usize, BusError> {
		self.ensure_connected()?;
		Ok(self
			.bus
			.inner
			.subscribers
			.lock()
			.unwrap()
			.get(channel)
			.copied()
			.unwrap_or(0))
	}
}

#[cfg(test)]
mod tests {
	use super::{Driver, MemoryBus};
	use tokio::time::{timeout, Duration};

	#[tokio::test]
	async fn delivers_to_subscribed_drivers_only() {
		let bus = MemoryBus::new();
		let (a, mut rx_a) = bus.driver();
		let (b, mut rx_b) = bus.driver();

		a.subscribe("chan").await.unwrap();
		b.publish("chan", b"payload".to_vec()).await.unwrap();

		let (channel, payload) = timeout(Duration::from_secs(1), rx_a.recv())
			.await
			.unwrap()
			.unwrap();
		assert_eq!(channel, "chan");
		assert_eq!(&payload[..], b"payload");

		// The publisher itself never subscribed.
		assert!(rx_b.try_recv().is_err());
	}

	#[tokio::test]
	async fn unsubscribe_stops_delivery() {
		let bus = MemoryBus::new();
		let (a, mut rx_a) = bus.driver();
		let (b, _rx_b) = bus.driver();

		a.subscribe("chan").await.unwrap();
		a.unsubscribe("chan").await.unwrap();
		b.publish("chan", b"dropped".to_vec()).await.unwrap();

		tokio::task::yield_now().await;
		assert!(rx_a.try_recv().is_err());
	}

	#[tokio::test]
	async fn disconnect_fails_every_operation() {
		let bus = MemoryBus::new();
		let (driver, _rx) = bus.driver();

		driver.disconnect();
		assert!(driver.publish("chan", b"x".to_vec()).await.is_err());
		assert!(driver.subscribe("chan").await.is_err());
		assert!(driver.unsubscribe("chan").await.is_err());
		assert!(driver.subscriber_count("chan").await.is_err());

		driver.reconnect();
		assert!(driver.subscribe("chan").await.is_ok());
		assert_eq!(driver.subscriber_count("chan").await.unwrap(), 1);
	}

	#[tokio::test]
	async fn counts_subscribers_per_channel() {
		let bus = MemoryBus::new();
		let (a, _rx_a) = bus.driver();
		let (b, _rx_b) = bus.driver();

		assert_eq!(a.subscriber_count("chan").await.unwrap(), 0);

		a.subscribe("chan").await.unwrap();
		a.subscribe("chan").await.unwrap();
		b.subscribe("chan").await.unwrap();
		assert_eq!(a.subscriber_count("chan").await.unwrap(), 2);

		b.unsubscribe("chan").await.unwrap();
		assert_eq!(a.subscriber_count("chan").await.unwrap(), 1);

		a.unsubscribe("chan").await.unwrap();
		assert_eq!(a.subscriber_count("chan").await.unwrap(), 0);
	}
}
