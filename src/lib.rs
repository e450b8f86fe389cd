#![allow(clippy::tabs_in_doc_comments)]
//! # roomcast
//!
//! Distributed room broadcast for realtime socket servers.
//!
//! A fleet of server processes shares one pub/sub bus (redis in
//! production) while each process holds a disjoint set of live client
//! connections. A [`Node`] is one process's presence on the bus; the
//! [`Adapter`] it binds per namespace lets the socket server emit to a
//! room or a whole namespace and reach the right clients on every peer,
//! or collect the client ids of a room across the fleet.
//!
//! ```no_run
//! # tokio_test::block_on(async {
//! use roomcast::{BroadcastOptions, Emitter, Node, Options, Packet, RedisDriver};
//!
//! struct Sockets;
//! impl Emitter for Sockets {
//! 	fn emit(&self, sid: &str, packet: &Packet, _flags: &serde_json::Value) {
//! 		// Write `packet` to the connection registered under `sid`.
//! 	}
//! }
//!
//! let options: Options = "127.0.0.1:6379".parse().unwrap();
//! let (driver, messages) = RedisDriver::connect(&options).await.unwrap();
//! let node = Node::new(driver, messages, options);
//!
//! let adapter = node.adapter("/chat", Sockets).await.unwrap();
//! adapter.add("sid-1", "lobby").await.unwrap();
//! adapter
//! 	.broadcast(
//! 		Packet::new("/chat", serde_json::json!(["message", "hello"])),
//! 		BroadcastOptions::rooms(["lobby"]),
//! 	)
//! 	.await;
//! # })
//! ```

mod adapter;
mod channel;
mod codec;
mod local;
mod membership;
mod node;
mod options;
mod packet;
mod subscriptions;
mod uid;

pub mod driver;

pub use self::{
	adapter::Adapter,
	driver::{BusError, Driver, MemoryBus, MemoryDriver, MessageRx},
	local::{Emitter, LocalAdapter},
	membership::{Departure, MembershipIndex},
	node::Node,
	options::{InvalidAddress, Options},
	packet::{BroadcastOptions, Packet, Room, Sid},
	uid::Uid,
};

#[cfg(feature = "redis")]
pub use self::driver::RedisDriver;

use std::sync::Arc;

/// Connects to redis and creates a [`Node`] in one step.
#[cfg(feature = "redis")]
pub async fn node(options: impl Into<Options>) -> Result<Node<RedisDriver>, Error> {
	let options = options.into();
	let (driver, messages) = RedisDriver::connect(&options).await?;
	Ok(Node::new(driver, messages, options))
}

/// Failures surfaced by the adapter. Cheap to clone so one error can
/// ride the error stream as well as a call's result.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Bus(#[from] BusError),
	#[error("failed to encode payload: {0}")]
	Encode(Arc<rmp_serde::encode::Error>),
	#[error("failed to decode payload: {0}")]
	Decode(Arc<rmp_serde::decode::Error>),
	#[error("namespace must start with '/', got {0:?}")]
	InvalidNamespace(String),
	#[error("an adapter is already bound for namespace {0:?}")]
	NamespaceTaken(String),
	#[error("room name cannot be empty")]
	EmptyRoom,
}

impl From<rmp_serde::encode::Error> for Error {
	fn from(error: rmp_serde::encode::Error) -> Self {
		Self::Encode(Arc::new(error))
	}
}

impl From<rmp_serde::decode::Error> for Error {
	fn from(error: rmp_serde::decode::Error) -> Self {
		Self::Decode(Arc::new(error))
	}
}
