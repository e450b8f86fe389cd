use std::collections::{HashMap, HashSet};

/// Rooms touched by a [`del_all`](MembershipIndex::del_all).
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Departure {
	/// Every room the client was a member of.
	pub rooms: Vec<String>,
	/// The subset of `rooms` left with no local members.
	pub emptied: Vec<String>,
}

/// In-process membership maps for one namespace.
///
/// `sids` and `rooms` mirror each other: a client id is in `rooms[room]`
/// exactly when the room is in `sids[sid]`. Rooms with no members are
/// removed entirely, so the empty↔non-empty transitions reported by
/// [`add`](MembershipIndex::add) and [`del`](MembershipIndex::del) can
/// drive the bus subscription lifecycle.
#[derive(Debug, Default)]
pub struct MembershipIndex {
	sids: HashMap<String, HashSet<String>>,
	rooms: HashMap<String, HashSet<String>>,
}

impl MembershipIndex {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds `sid` to `room`. Returns `true` when the room had no local
	/// members before the call. Idempotent.
	pub fn add(&mut self, sid: &str, room: &str) -> bool {
		self.sids
			.entry(sid.to_owned())
			.or_default()
			.insert(room.to_owned());

		let members = self.rooms.entry(room.to_owned()).or_default();
		let created = members.is_empty();
		members.insert(sid.to_owned());
		created
	}

	/// Removes `sid` from `room`. Returns `true` when this left the room
	/// without members. Idempotent.
	pub fn del(&mut self, sid: &str, room: &str) -> bool {
		if let Some(joined) = self.sids.get_mut(sid) {
			joined.remove(room);
			if joined.is_empty() {
				self.sids.remove(sid);
			}
		}

		let Some(members) = self.rooms.get_mut(room) else {
			return false;
		};
		members.remove(sid);
		if members.is_empty() {
			self.rooms.remove(room);
			true
		} else {
			false
		}
	}

	/// Removes `sid` from every room it belongs to.
	pub fn del_all(&mut self, sid: &str) -> Departure {
		let Some(joined) = self.sids.remove(sid) else {
			return Departure::default();
		};

		let mut departure = Departure::default();
		for room in joined {
			if let Some(members) = self.rooms.get_mut(&room) {
				members.remove(sid);
				if members.is_empty() {
					self.rooms.remove(&room);
					departure.emptied.push(room.clone());
				}
			}
			departure.rooms.push(room);
		}
		departure
	}

	/// Client ids belonging to any of `rooms`, without duplicates. An
	/// empty filter selects every client in the namespace. Order is
	/// unspecified.
	pub fn clients(&self, rooms: &[String]) -> Vec<String> {
		if rooms.is_empty() {
			return self.sids.keys().cloned().collect();
		}

		let mut seen = HashSet::new();
		let mut sids = Vec::new();
		for room in rooms {
			let Some(members) = self.rooms.get(room) else {
				continue;
			};
			for sid in members {
				if seen.insert(sid.as_str()) {
					sids.push(sid.clone());
				}
			}
		}
		sids
	}

	/// Rooms with at least one local member.
	pub fn rooms(&self) -> Vec<String> {
		self.rooms.keys().cloned().collect()
	}

	pub fn member_count(&self, room: &str) -> usize {
		self.rooms.get(room).map_or(0, HashSet::len)
	}

	pub fn is_member(&self, sid: &str, room: &str) -> bool {
		self.rooms
			.get(room)
			.map_or(false, |members| members.contains(sid))
	}
}

#[cfg(test)]
mod tests {
	use super::MembershipIndex;

	#[test]
	fn add_reports_the_first_member_only() {
		let mut index = MembershipIndex::new();
		assert!(index.add("s1", "room"));
		assert!(!index.add("s2", "room"));
		assert!(!index.add("s1", "room"));
		assert_eq!(index.member_count("room"), 2);
	}

	#[test]
	fn del_prunes_empty_rooms() {
		let mut index = MembershipIndex::new();
		index.add("s1", "room");
		index.add("s2", "room");

		assert!(!index.del("s1", "room"));
		assert!(index.is_member("s2", "room"));
		assert!(index.del("s2", "room"));
		assert_eq!(index.member_count("room"), 0);
		assert!(index.rooms().is_empty());

		// Idempotent on a room that is already gone.
		assert!(!index.del("s2", "room"));
	}

	#[test]
	fn add_then_del_restores_the_initial_state() {
		let mut index = MembershipIndex::new();
		index.add("s", "r");
		index.del("s", "r");
		assert!(index.clients(&[]).is_empty());
		assert!(index.rooms().is_empty());
	}

	#[test]
	fn del_all_reports_affected_and_emptied_rooms() {
		let mut index = MembershipIndex::new();
		index.add("s1", "a");
		index.add("s1", "b");
		index.add("s2", "b");

		let mut departure = index.del_all("s1");
		departure.rooms.sort();
		assert_eq!(departure.rooms, ["a", "b"]);
		assert_eq!(departure.emptied, ["a"]);

		assert!(index.is_member("s2", "b"));
		assert!(index.del_all("s1").rooms.is_empty());
	}

	#[test]
	fn clients_unions_rooms_without_duplicates() {
		let mut index = MembershipIndex::new();
		index.add("s1", "a");
		index.add("s1", "b");
		index.add("s2", "b");
		index.add("s3", "c");

		let mut sids = index.clients(&["a".into(), "b".into()]);
		sids.sort();
		assert_eq!(sids, ["s1", "s2"]);

		let mut all = index.clients(&[]);
		all.sort();
		assert_eq!(all, ["s1", "s2", "s3"]);

		assert!(index.clients(&["missing".into()]).is_empty());
	}

	#[test]
	fn membership_is_mirrored_both_ways() {
		let mut index = MembershipIndex::new();
		index.add("s1", "a");
		index.add("s1", "b");
		index.add("s2", "a");
		index.del("s1", "a");

		for (sid, room, expected) in [
			("s1", "a", false),
			("s1", "b", true),
			("s2", "a", true),
			("s2", "b", false),
		] {
			assert_eq!(index.is_member(sid, room), expected, "{sid} in {room}");
			assert_eq!(
				index.clients(&[room.to_owned()]).contains(&sid.to_owned()),
				expected
			);
		}
	}
}
