use super::{BusError, Driver, MessageRx};
use crate::{Error, Options};
use bytes::Bytes;
use futures_util::StreamExt;
use redis::aio::{MultiplexedConnection, PubSubSink};
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex};

/// Bus driver backed by a redis server.
///
/// Holds three connections, the way a production deployment splits them:
/// one for `PUBLISH`, one kept in subscriber mode, and one for the
/// `PUBSUB NUMSUB` introspection behind clients queries. Payloads stay
/// raw bytes end to end.
pub struct RedisDriver {
	publish: MultiplexedConnection,
	metadata: MultiplexedConnection,
	subscriber: Mutex<PubSubSink>,
}

impl RedisDriver {
	/// Connects to the server named by `options`, returning the driver
	/// and its inbound message stream. The stream ends when the
	/// subscriber connection does.
	pub async fn connect(options: &Options) -> Result<(Self, MessageRx), Error> {
		let client = redis::Client::open(options.redis_url()).map_err(transport)?;
		let publish = client
			.get_multiplexed_tokio_connection()
			.await
			.map_err(transport)?;
		let metadata = client
			.get_multiplexed_tokio_connection()
			.await
			.map_err(transport)?;
		let (sink, mut stream) = client.get_async_pubsub().await.map_err(transport)?.split();

		let (tx, rx) = mpsc::unbounded_channel();
		tokio::spawn(async move {
			while let Some(message) = stream.next().await {
				let channel = message.get_channel_name().to_owned();
				let payload = Bytes::copy_from_slice(message.get_payload_bytes());
				if tx.send((channel, payload)).is_err() {
					break;
				}
			}
			tracing::debug!("redis subscriber stream ended");
		});

		Ok((
			Self {
				publish,
				metadata,
				subscriber: Mutex::new(sink),
			},
			rx,
		))
	}
}

fn transport(error: redis::RedisError) -> BusError {
	BusError::Transport(error.to_string())
}

impl Driver for RedisDriver {
	async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BusError> {
		let mut connection = self.publish.clone();
		let _: redis::Value = redis::cmd("PUBLISH")
			.arg(channel)
			.arg(payload)
			.query_async(&mut connection)
			.await
			.map_err(transport)?;
		Ok(())
	}

	async fn subscribe(&self, channel: &str) -> Result<(), BusError> {
		self.subscriber
			.lock()
			.await
			.subscribe(channel)
			.await
			.map_err(transport)
	}

	async fn unsubscribe(&self, channel: &str) -> Result<(), BusError> {
		self.subscriber
			.lock()
			.await
			.unsubscribe(channel)
			.await
			.map_err(transport)
	}

	async fn subscriber_count(&self, channel: &str) -> Result<usize, BusError> {
		let mut connection = self.metadata.clone();
		let counts: HashMap<String, usize> = redis::cmd("PUBSUB")
			.arg("NUMSUB")
			.arg(channel)
			.query_async(&mut connection)
			.await
			.map_err(transport)?;
		Ok(counts.get(channel).copied().unwrap_or(0))
	}
}
