use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// A client id, as assigned by the socket layer. Unique within a
/// process, not necessarily across the fleet.
pub type Sid = String;

/// An application-defined group of clients within a namespace.
pub type Room = String;

/// An application payload addressed to one namespace.
///
/// The payload is opaque to the adapter; only `nsp` is inspected, and a
/// packet without one belongs to the root namespace `/`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Packet {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub nsp: Option<String>,
	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub data: Value,
}

impl Packet {
	pub fn new(nsp: impl Into<String>, data: Value) -> Self {
		Self {
			nsp: Some(nsp.into()),
			data,
		}
	}

	/// The namespace this packet belongs to, `/` when unset.
	pub fn nsp(&self) -> &str {
		self.nsp.as_deref().unwrap_or("/")
	}
}

/// Targeting for one broadcast.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BroadcastOptions {
	/// Rooms to deliver to; empty means the whole namespace.
	#[serde(default)]
	pub rooms: Vec<Room>,

	/// Client ids to skip.
	#[serde(default)]
	pub except: HashSet<Sid>,

	/// Transport hints, forwarded untouched to the emitter.
	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub flags: Value,
}

impl BroadcastOptions {
	/// Options targeting the given rooms.
	pub fn rooms(rooms: impl IntoIterator<Item = impl Into<Room>>) -> Self {
		Self {
			rooms: rooms.into_iter().map(Into::into).collect(),
			..Default::default()
		}
	}
}
