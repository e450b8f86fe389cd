use crate::{
	codec,
	driver::Driver,
	local::LocalAdapter,
	node::{NamespaceHandler, NodeInner, PendingQuery},
	BroadcastOptions, Emitter, Error, Packet, Room, Sid, Uid,
};
use std::{collections::hash_map::Entry, sync::Arc};
use tokio::{
	sync::{broadcast, oneshot},
	time,
};

/// Per-namespace adapter handed to the socket server.
///
/// Membership changes go through [`add`](Adapter::add),
/// [`del`](Adapter::del) and [`del_all`](Adapter::del_all);
/// [`broadcast`](Adapter::broadcast) reaches the namespace's clients on
/// every node of the fleet, and [`clients`](Adapter::clients) aggregates
/// client ids across it.
pub struct Adapter<D, E> {
	node: Arc<NodeInner<D>>,
	shared: Arc<Shared<E>>,
}

impl<D, E> Clone for Adapter<D, E> {
	fn clone(&self) -> Self {
		Self {
			node: Arc::clone(&self.node),
			shared: Arc::clone(&self.shared),
		}
	}
}

struct Shared<E> {
	nsp: String,
	local: LocalAdapter<E>,
}

impl<E: Emitter> NamespaceHandler for Shared<E> {
	fn local_clients(&self, rooms: &[Room]) -> Vec<Sid> {
		self.local.clients(rooms)
	}

	fn deliver(&self, packet: &Packet, opts: &BroadcastOptions) {
		self.local.broadcast(packet, opts);
	}
}

impl<D: Driver, E: Emitter> Adapter<D, E> {
	pub(crate) async fn bind(
		node: Arc<NodeInner<D>>,
		nsp: String,
		emitter: E,
	) -> Result<Self, Error> {
		let shared = Arc::new(Shared {
			nsp: nsp.clone(),
			local: LocalAdapter::new(emitter),
		});

		let namespace_channel = node.channels.namespace(&nsp);
		let request_channel = node.channels.request();

		node.subscriptions
			.acquire(&node.driver, &namespace_channel)
			.await?;
		if let Err(error) = node.subscriptions.acquire(&node.driver, &request_channel).await {
			let _ = node
				.subscriptions
				.release(&node.driver, &namespace_channel)
				.await;
			return Err(error.into());
		}

		let taken = {
			let mut namespaces = node.namespaces.lock().unwrap();
			match namespaces.entry(nsp.clone()) {
				Entry::Occupied(_) => true,
				Entry::Vacant(entry) => {
					entry.insert(Arc::clone(&shared) as Arc<dyn NamespaceHandler>);
					false
				}
			}
		};
		if taken {
			let _ = node
				.subscriptions
				.release(&node.driver, &namespace_channel)
				.await;
			let _ = node
				.subscriptions
				.release(&node.driver, &request_channel)
				.await;
			return Err(Error::NamespaceTaken(nsp));
		}

		Ok(Self { node, shared })
	}

	/// The namespace this adapter serves.
	pub fn nsp(&self) -> &str {
		&self.shared.nsp
	}

	/// Subscribes to bus-level failures; the same stream as
	/// [`Node::errors`](crate::Node::errors).
	pub fn errors(&self) -> broadcast::Receiver<Error> {
		self.node.errors.subscribe()
	}

	/// Joins `sid` to `room`, subscribing the room's bus channel when
	/// the room gains its first local member.
	///
	/// The membership change is kept even when the bus subscribe fails;
	/// the caller may [`del`](Adapter::del) to roll it back.
	pub async fn add(&self, sid: &str, room: &str) -> Result<(), Error> {
		if room.is_empty() {
			return Err(Error::EmptyRoom);
		}

		if self.shared.local.add(sid, room) {
			let channel = self.node.channels.room(&self.shared.nsp, room);
			if let Err(error) = self.node.subscriptions.acquire(&self.node.driver, &channel).await {
				let error = Error::Bus(error);
				self.node.report(&error);
				return Err(error);
			}
		}
		Ok(())
	}

	/// Removes `sid` from `room`, unsubscribing the room's bus channel
	/// when no local member remains.
	pub async fn del(&self, sid: &str, room: &str) -> Result<(), Error> {
		if self.shared.local.del(sid, room) {
			let channel = self.node.channels.room(&self.shared.nsp, room);
			if let Err(error) = self.node.subscriptions.release(&self.node.driver, &channel).await {
				let error = Error::Bus(error);
				self.node.report(&error);
				return Err(error);
			}
		}
		Ok(())
	}

	/// Removes `sid` from every room it belongs to.
	///
	/// Best effort: every emptied room's channel is released even when
	/// an earlier release fails, and the first failure is reported after
	/// all attempts.
	pub async fn del_all(&self, sid: &str) -> Result<(), Error> {
		let departure = self.shared.local.del_all(sid);

		let mut first_error = None;
		for room in &departure.emptied {
			let channel = self.node.channels.room(&self.shared.nsp, room);
			if let Err(error) = self.node.subscriptions.release(&self.node.driver, &channel).await {
				let error = Error::Bus(error);
				self.node.report(&error);
				first_error.get_or_insert(error);
			}
		}

		match first_error {
			Some(error) => Err(error),
			None => Ok(()),
		}
	}

	/// Emits `packet` to the targeted clients on every node.
	///
	/// Local clients are delivered to before anything is published, so a
	/// node observes its own send first. Fire and forget: encode or
	/// publish failures surface on the error stream, never to the
	/// caller.
	pub async fn broadcast(&self, packet: Packet, opts: BroadcastOptions) {
		self.shared.local.broadcast(&packet, &opts);

		let payload = match codec::encode_broadcast(&self.node.uid, &packet, &opts) {
			Ok(payload) => payload,
			Err(error) => {
				self.node.report(&error);
				return;
			}
		};

		if opts.rooms.is_empty() {
			let channel = self.node.channels.namespace(&self.shared.nsp);
			if let Err(error) = self.node.driver.publish(&channel, payload).await {
				self.node.report(&Error::Bus(error));
			}
			return;
		}

		for room in &opts.rooms {
			let channel = self.node.channels.room(&self.shared.nsp, room);
			if let Err(error) = self.node.driver.publish(&channel, payload.clone()).await {
				self.node.report(&Error::Bus(error));
			}
		}
	}

	/// Client ids in any of `rooms` across the whole fleet, every client
	/// of the namespace when `rooms` is empty.
	///
	/// Local ids are collected first, then every peer node is asked over
	/// the bus. The call resolves once all expected peers have answered,
	/// or after `requests_timeout × peers`; a peer that never answers
	/// shortens the list, it does not fail the call. Ids are aggregated
	/// as sent, so a client known to several peers appears once per
	/// peer.
	pub async fn clients(&self, rooms: &[Room]) -> Result<Vec<Sid>, Error> {
		let local = self.shared.local.clients(rooms);

		let request_channel = self.node.channels.request();
		let subscribed = match self.node.driver.subscriber_count(&request_channel).await {
			Ok(subscribed) => subscribed,
			Err(error) => {
				let error = Error::Bus(error);
				self.node.report(&error);
				return Err(error);
			}
		};
		let peers = subscribed.saturating_sub(1);
		if peers == 0 {
			return Ok(local);
		}

		let muid = Uid::generate();
		let response_channel = self.node.channels.response(muid.as_str());
		if let Err(error) = self
			.node
			.subscriptions
			.acquire(&self.node.driver, &response_channel)
			.await
		{
			let error = Error::Bus(error);
			self.node.report(&error);
			return Err(error);
		}

		let payload = match codec::encode_request(&self.shared.nsp, &self.node.uid, &muid, rooms) {
			Ok(payload) => payload,
			Err(error) => {
				let _ = self
					.node
					.subscriptions
					.release(&self.node.driver, &response_channel)
					.await;
				return Err(error);
			}
		};

		let (tx, mut rx) = oneshot::channel();
		self.node.queries.lock().unwrap().insert(
			muid.to_string(),
			PendingQuery {
				remaining: peers,
				sids: local,
				tx,
			},
		);

		if let Err(error) = self.node.driver.publish(&request_channel, payload).await {
			self.node.queries.lock().unwrap().remove(muid.as_str());
			let _ = self
				.node
				.subscriptions
				.release(&self.node.driver, &response_channel)
				.await;
			let error = Error::Bus(error);
			self.node.report(&error);
			return Err(error);
		}

		let window = self.node.requests_timeout * peers as u32;
		let sids = match time::timeout(window, &mut rx).await {
			Ok(Ok(sids)) => sids,
			// Timed out: keep whatever has arrived. The query can still
			// complete between the timeout and the lock, in which case
			// the result sits in the channel.
			_ => match self.node.queries.lock().unwrap().remove(muid.as_str()) {
				Some(query) => query.sids,
				None => rx.try_recv().unwrap_or_default(),
			},
		};

		if let Err(error) = self
			.node
			.subscriptions
			.release(&self.node.driver, &response_channel)
			.await
		{
			self.node.report(&Error::Bus(error));
		}

		Ok(sids)
	}

	/// Unbinds the adapter: the namespace stops receiving remote
	/// broadcasts and every bus channel it holds is released.
	pub async fn close(self) -> Result<(), Error> {
		self.node.namespaces.lock().unwrap().remove(&self.shared.nsp);

		let mut channels = vec![
			self.node.channels.namespace(&self.shared.nsp),
			self.node.channels.request(),
		];
		for room in self.shared.local.rooms() {
			channels.push(self.node.channels.room(&self.shared.nsp, &room));
		}

		let mut first_error = None;
		for channel in channels {
			if let Err(error) = self.node.subscriptions.release(&self.node.driver, &channel).await {
				let error = Error::Bus(error);
				self.node.report(&error);
				first_error.get_or_insert(error);
			}
		}

		match first_error {
			Some(error) => Err(error),
			None => Ok(()),
		}
	}
}
