//! The pub/sub bus seam.
//!
//! A [`Driver`] publishes raw bytes to named channels and manages which
//! channels the process receives; everything a node hears arrives on the
//! [`MessageRx`] handed out with the driver at construction. The crate
//! ships a redis driver for production and an in-process bus for tests
//! and single-node deployments.

use bytes::Bytes;
use std::future::Future;
use tokio::sync::mpsc;

mod memory;
pub use memory::{MemoryBus, MemoryDriver};

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::RedisDriver;

/// A raw message delivered on a subscribed channel.
pub type BusMessage = (String, Bytes);

/// Inbound half of a bus connection.
pub type MessageRx = mpsc::UnboundedReceiver<BusMessage>;

/// Transport-level bus failure.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BusError {
	/// The underlying client reported an error.
	#[error("bus transport error: {0}")]
	Transport(String),
	/// The connection to the bus is gone.
	#[error("bus connection closed")]
	Closed,
}

/// Connection to the shared pub/sub bus.
///
/// Payloads are opaque bytes in both directions; within one channel,
/// messages from a single publisher are delivered in publish order.
pub trait Driver: Send + Sync + 'static {
	/// Publishes `payload` to `channel`.
	fn publish(
		&self,
		channel: &str,
		payload: Vec<u8>,
	) -> impl Future<Output = Result<(), BusError>> + Send;

	/// Starts delivery for `channel`.
	fn subscribe(&self, channel: &str) -> impl Future<Output = Result<(), BusError>> + Send;

	/// Stops delivery for `channel`.
	fn unsubscribe(&self, channel: &str) -> impl Future<Output = Result<(), BusError>> + Send;

	/// Number of bus-wide subscribers of `channel` (`PUBSUB NUMSUB`).
	fn subscriber_count(
		&self,
		channel: &str,
	) -> impl Future<Output = Result<usize, BusError>> + Send;
}
