use crate::{membership::Departure, BroadcastOptions, MembershipIndex, Packet, Room, Sid};
use serde_json::Value;
use std::sync::Mutex;

/// Delivery seam to the socket transport.
///
/// The adapter resolves which locally connected clients a broadcast
/// targets and hands each one to the emitter; putting the packet on the
/// wire (websocket, polling, ...) is entirely the implementor's concern.
pub trait Emitter: Send + Sync + 'static {
	/// Delivers `packet` to the locally connected client `sid`.
	fn emit(&self, sid: &str, packet: &Packet, flags: &Value);
}

/// The in-process half of a namespace: membership plus local delivery.
///
/// An [`Adapter`](crate::Adapter) owns one of these and delegates every
/// local operation to it; remote broadcasts arriving from the bus end up
/// here too.
pub struct LocalAdapter<E> {
	index: Mutex<MembershipIndex>,
	emitter: E,
}

impl<E: Emitter> LocalAdapter<E> {
	pub fn new(emitter: E) -> Self {
		Self {
			index: Mutex::new(MembershipIndex::new()),
			emitter,
		}
	}

	/// Joins `sid` to `room`; `true` when the room gained its first
	/// local member.
	pub fn add(&self, sid: &str, room: &str) -> bool {
		self.index.lock().unwrap().add(sid, room)
	}

	/// Removes `sid` from `room`; `true` when the room lost its last
	/// local member.
	pub fn del(&self, sid: &str, room: &str) -> bool {
		self.index.lock().unwrap().del(sid, room)
	}

	pub fn del_all(&self, sid: &str) -> Departure {
		self.index.lock().unwrap().del_all(sid)
	}

	/// Local client ids for `rooms` (all clients when empty).
	pub fn clients(&self, rooms: &[Room]) -> Vec<Sid> {
		self.index.lock().unwrap().clients(rooms)
	}

	/// Rooms currently holding at least one local client.
	pub fn rooms(&self) -> Vec<Room> {
		self.index.lock().unwrap().rooms()
	}

	/// Delivers `packet` to every targeted local client.
	///
	/// A client in several of the requested rooms is delivered to once
	/// per call. The membership lock is dropped before the emitter runs.
	pub fn broadcast(&self, packet: &Packet, opts: &BroadcastOptions) {
		let recipients = self.index.lock().unwrap().clients(&opts.rooms);

		for sid in recipients {
			if opts.except.contains(&sid) {
				continue;
			}
			self.emitter.emit(&sid, packet, &opts.flags);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::{Emitter, LocalAdapter};
	use crate::{BroadcastOptions, Packet};
	use serde_json::{json, Value};
	use std::sync::Mutex;

	#[derive(Default)]
	struct Recorder {
		delivered: Mutex<Vec<String>>,
	}

	impl Emitter for &'static Recorder {
		fn emit(&self, sid: &str, _packet: &Packet, _flags: &Value) {
			self.delivered.lock().unwrap().push(sid.to_owned());
		}
	}

	fn recorder() -> &'static Recorder {
		Box::leak(Box::default())
	}

	fn delivered(recorder: &Recorder) -> Vec<String> {
		let mut sids = recorder.delivered.lock().unwrap().clone();
		sids.sort();
		sids
	}

	#[test]
	fn broadcast_targets_the_requested_rooms_once() {
		let recorder = recorder();
		let local = LocalAdapter::new(recorder);
		local.add("s1", "a");
		local.add("s1", "b");
		local.add("s2", "b");
		local.add("s3", "c");

		local.broadcast(
			&Packet::new("/", json!("hi")),
			&BroadcastOptions::rooms(["a", "b"]),
		);

		// s1 is in both rooms but is delivered to once.
		assert_eq!(delivered(recorder), ["s1", "s2"]);
	}

	#[test]
	fn broadcast_without_rooms_reaches_the_namespace_minus_except() {
		let recorder = recorder();
		let local = LocalAdapter::new(recorder);
		local.add("s1", "a");
		local.add("s2", "b");
		local.add("s3", "b");

		let opts = BroadcastOptions {
			except: ["s2".to_owned()].into_iter().collect(),
			..Default::default()
		};
		local.broadcast(&Packet::new("/", json!("hi")), &opts);

		assert_eq!(delivered(recorder), ["s1", "s3"]);
	}
}
