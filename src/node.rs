use crate::{
	channel::{ChannelKind, Channels},
	codec,
	driver::{Driver, MessageRx},
	subscriptions::Subscriptions,
	Adapter, BroadcastOptions, Emitter, Error, Options, Packet, Room, Sid, Uid,
};
use core::time::Duration;
use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
};
use tokio::sync::{broadcast, oneshot};

const ERROR_CAPACITY: usize = 16;

/// One process's presence on the bus, and the constructor from which
/// per-namespace adapters are made.
///
/// Every adapter produced by a node shares its driver, channel key, uid
/// and clients-query timeout. Two nodes in one process carry distinct
/// uids and treat each other as peers.
pub struct Node<D> {
	inner: Arc<NodeInner<D>>,
}

impl<D> Clone for Node<D> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

pub(crate) struct NodeInner<D> {
	pub(crate) driver: D,
	pub(crate) uid: Uid,
	pub(crate) channels: Channels,
	pub(crate) requests_timeout: Duration,
	pub(crate) subscriptions: Subscriptions,
	pub(crate) queries: Mutex<HashMap<String, PendingQuery>>,
	pub(crate) namespaces: Mutex<HashMap<String, Arc<dyn NamespaceHandler>>>,
	pub(crate) errors: broadcast::Sender<Error>,
}

/// A clients query waiting for peer responses.
pub(crate) struct PendingQuery {
	pub remaining: usize,
	pub sids: Vec<Sid>,
	pub tx: oneshot::Sender<Vec<Sid>>,
}

/// What the dispatcher needs from a bound namespace, independent of its
/// emitter type.
pub(crate) trait NamespaceHandler: Send + Sync {
	fn local_clients(&self, rooms: &[Room]) -> Vec<Sid>;
	fn deliver(&self, packet: &Packet, opts: &BroadcastOptions);
}

impl<D: Driver> Node<D> {
	/// Creates a node over `driver` and starts its dispatch task, which
	/// runs until `messages` closes.
	pub fn new(driver: D, messages: MessageRx, options: Options) -> Self {
		let (errors, _) = broadcast::channel(ERROR_CAPACITY);
		let inner = Arc::new(NodeInner {
			driver,
			uid: Uid::generate(),
			channels: Channels::new(options.key),
			requests_timeout: options.requests_timeout,
			subscriptions: Subscriptions::new(),
			queries: Mutex::new(HashMap::new()),
			namespaces: Mutex::new(HashMap::new()),
			errors,
		});

		tokio::spawn(dispatch(Arc::clone(&inner), messages));

		Self { inner }
	}

	/// The tag peers see on this node's broadcasts.
	pub fn uid(&self) -> &Uid {
		&self.inner.uid
	}

	/// Subscribes to the bus-level failures surfaced by this node's
	/// adapters.
	pub fn errors(&self) -> broadcast::Receiver<Error> {
		self.inner.errors.subscribe()
	}

	/// Binds an adapter for `nsp`, delivering local packets through
	/// `emitter`.
	///
	/// Subscribes the namespace's broadcast channel and the fleet-wide
	/// clients-request channel before returning.
	pub async fn adapter<E: Emitter>(
		&self,
		nsp: impl Into<String>,
		emitter: E,
	) -> Result<Adapter<D, E>, Error> {
		let nsp = nsp.into();
		if !nsp.starts_with('/') {
			return Err(Error::InvalidNamespace(nsp));
		}
		Adapter::bind(Arc::clone(&self.inner), nsp, emitter).await
	}
}

impl<D: Driver> NodeInner<D> {
	/// Emits `error` on the error stream and the log.
	pub(crate) fn report(&self, error: &Error) {
		tracing::error!(%error, "bus failure");
		let _ = self.errors.send(error.clone());
	}

	fn handler(&self, nsp: &str) -> Option<Arc<dyn NamespaceHandler>> {
		self.namespaces.lock().unwrap().get(nsp).cloned()
	}

	fn on_broadcast(&self, channel_nsp: &str, room: Option<&str>, payload: &[u8]) {
		let (uid, packet, opts) = match codec::decode_broadcast(payload) {
			Ok(frame) => frame,
			Err(error) => {
				tracing::debug!(%error, "dropping undecodable broadcast");
				return;
			}
		};

		if uid == self.uid {
			tracing::debug!(%uid, "ignoring own broadcast");
			return;
		}

		let Some(handler) = self.handler(channel_nsp) else {
			tracing::debug!(nsp = channel_nsp, "no adapter bound for channel namespace");
			return;
		};

		if packet.nsp() != channel_nsp {
			tracing::debug!(
				packet_nsp = packet.nsp(),
				nsp = channel_nsp,
				"dropping broadcast for another namespace"
			);
			return;
		}

		tracing::trace!(nsp = channel_nsp, room, "delivering remote broadcast");
		handler.deliver(&packet, &opts);
	}

	async fn on_request(&self, payload: &[u8]) {
		let (nsp, uid, muid, rooms) = match codec::decode_request(payload) {
			Ok(frame) => frame,
			Err(error) => {
				tracing::debug!(%error, "dropping undecodable clients request");
				return;
			}
		};

		if uid == self.uid {
			tracing::debug!(%uid, "ignoring own clients request");
			return;
		}

		let Some(handler) = self.handler(&nsp) else {
			tracing::debug!(%nsp, "clients request for a namespace not served here");
			return;
		};

		let sids = handler.local_clients(&rooms);
		let response = match codec::encode_response(&sids) {
			Ok(payload) => payload,
			Err(error) => {
				self.report(&error);
				return;
			}
		};

		let channel = self.channels.response(muid.as_str());
		if let Err(error) = self.driver.publish(&channel, response).await {
			self.report(&Error::Bus(error));
		}
	}

	fn on_response(&self, muid: &str, payload: &[u8]) {
		let sids = match codec::decode_response(payload) {
			Ok(sids) => sids,
			Err(error) => {
				tracing::debug!(%error, "dropping undecodable clients response");
				return;
			}
		};

		let mut queries = self.queries.lock().unwrap();
		let done = {
			let Some(query) = queries.get_mut(muid) else {
				tracing::debug!(muid, "response for an unknown or finished query");
				return;
			};
			query.sids.extend(sids);
			query.remaining = query.remaining.saturating_sub(1);
			query.remaining == 0
		};

		if done {
			if let Some(query) = queries.remove(muid) {
				let _ = query.tx.send(query.sids);
			}
		}
	}
}

/// Routes every inbound bus message to the matching path: remote
/// broadcasts to their namespace, clients requests to the responder,
/// responses to the query that is waiting on them.
async fn dispatch<D: Driver>(node: Arc<NodeInner<D>>, mut messages: MessageRx) {
	while let Some((channel, payload)) = messages.recv().await {
		match node.channels.parse(&channel) {
			Some(ChannelKind::Broadcast { nsp, room }) => node.on_broadcast(nsp, room, &payload),
			Some(ChannelKind::Request) => node.on_request(&payload).await,
			Some(ChannelKind::Response { muid }) => node.on_response(muid, &payload),
			None => tracing::debug!(%channel, "ignoring message on a foreign channel"),
		}
	}
	tracing::debug!("bus message stream closed, dispatch ending");
}
