//! Wire frames exchanged over the bus.
//!
//! Every payload is a msgpack array. Broadcasts carry
//! `[uid, packet, opts]`, clients queries `[nsp, uid, muid, rooms]` and
//! their responses `[sids]`. Structs inside a frame are encoded as maps
//! so that optional fields can be left out.

use crate::{BroadcastOptions, Error, Packet, Room, Sid, Uid};

pub(crate) fn encode_broadcast(
	uid: &Uid,
	packet: &Packet,
	opts: &BroadcastOptions,
) -> Result<Vec<u8>, Error> {
	Ok(rmp_serde::to_vec_named(&(uid, packet, opts))?)
}

pub(crate) fn decode_broadcast(payload: &[u8]) -> Result<(Uid, Packet, BroadcastOptions), Error> {
	Ok(rmp_serde::from_slice(payload)?)
}

pub(crate) fn encode_request(
	nsp: &str,
	uid: &Uid,
	muid: &Uid,
	rooms: &[Room],
) -> Result<Vec<u8>, Error> {
	Ok(rmp_serde::to_vec_named(&(nsp, uid, muid, rooms))?)
}

pub(crate) fn decode_request(payload: &[u8]) -> Result<(String, Uid, Uid, Vec<Room>), Error> {
	Ok(rmp_serde::from_slice(payload)?)
}

pub(crate) fn encode_response(sids: &[Sid]) -> Result<Vec<u8>, Error> {
	Ok(rmp_serde::to_vec_named(&(sids,))?)
}

pub(crate) fn decode_response(payload: &[u8]) -> Result<Vec<Sid>, Error> {
	let (sids,): (Vec<Sid>,) = rmp_serde::from_slice(payload)?;
	Ok(sids)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn broadcast_frames_round_trip() {
		let uid = Uid::generate();
		let packet = Packet::new("/nsp", json!({ "event": "message", "body": [1, 2, 3] }));
		let opts = BroadcastOptions {
			rooms: vec!["a".into(), "b".into()],
			except: ["s9".to_owned()].into_iter().collect(),
			flags: json!({ "volatile": true }),
		};

		let payload = encode_broadcast(&uid, &packet, &opts).unwrap();
		let (decoded_uid, decoded_packet, decoded_opts) = decode_broadcast(&payload).unwrap();
		assert_eq!(decoded_uid, uid);
		assert_eq!(decoded_packet, packet);
		assert_eq!(decoded_opts, opts);
	}

	#[test]
	fn packets_without_a_namespace_default_to_root() {
		let uid = Uid::generate();
		let packet = Packet {
			nsp: None,
			data: json!("hi"),
		};

		let payload = encode_broadcast(&uid, &packet, &BroadcastOptions::default()).unwrap();
		let (_, decoded, opts) = decode_broadcast(&payload).unwrap();
		assert_eq!(decoded.nsp, None);
		assert_eq!(decoded.nsp(), "/");
		assert!(opts.rooms.is_empty());
		assert!(opts.except.is_empty());
	}

	#[test]
	fn request_frames_round_trip() {
		let uid = Uid::generate();
		let muid = Uid::generate();
		let rooms = vec!["room".to_owned()];

		let payload = encode_request("/nsp", &uid, &muid, &rooms).unwrap();
		let (nsp, decoded_uid, decoded_muid, decoded_rooms) = decode_request(&payload).unwrap();
		assert_eq!(nsp, "/nsp");
		assert_eq!(decoded_uid, uid);
		assert_eq!(decoded_muid, muid);
		assert_eq!(decoded_rooms, rooms);
	}

	#[test]
	fn response_frames_round_trip() {
		let sids = vec!["A1".to_owned(), "B1".to_owned()];
		let payload = encode_response(&sids).unwrap();
		assert_eq!(decode_response(&payload).unwrap(), sids);

		let empty = encode_response(&[]).unwrap();
		assert!(decode_response(&empty).unwrap().is_empty());
	}

	#[test]
	fn malformed_payloads_are_rejected() {
		assert!(decode_broadcast(b"not msgpack").is_err());
		assert!(decode_request(&[0xc0]).is_err());
		assert!(decode_response(&[]).is_err());
	}
}
