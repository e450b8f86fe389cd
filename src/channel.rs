const DELIMITER: char = '#';
const REQUEST_SUFFIX: &str = "clientrequest";
const RESPONSE_SUFFIX: &str = "clientresponse";

/// Builds and parses the channel names a node uses on the bus.
///
/// Every channel starts with the configured key, segments are
/// `#`-delimited and broadcast channels keep a trailing `#`:
///
/// - `{key}#{nsp}#` — all broadcasts for a namespace
/// - `{key}#{nsp}#{room}#` — broadcasts targeting one room
/// - `{key}#clientrequest` — fleet-wide clients queries
/// - `{key}#{muid}#clientresponse` — responses for one query
#[derive(Clone, Debug)]
pub(crate) struct Channels {
	key: String,
}

/// A recognized channel name. Channels that do not carry the local key
/// parse to `None` and are ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChannelKind<'a> {
	Broadcast { nsp: &'a str, room: Option<&'a str> },
	Request,
	Response { muid: &'a str },
}

impl Channels {
	pub fn new(key: impl Into<String>) -> Self {
		Self { key: key.into() }
	}

	pub fn namespace(&self, nsp: &str) -> String {
		format!("{}#{}#", self.key, nsp)
	}

	pub fn room(&self, nsp: &str, room: &str) -> String {
		format!("{}#{}#{}#", self.key, nsp, room)
	}

	pub fn request(&self) -> String {
		format!("{}#{}", self.key, REQUEST_SUFFIX)
	}

	pub fn response(&self, muid: &str) -> String {
		format!("{}#{}#{}", self.key, muid, RESPONSE_SUFFIX)
	}

	/// Recovers the channel kind from its final segment. Room names may
	/// themselves contain `#`; the namespace is always the first segment,
	/// the room everything up to the trailing delimiter.
	pub fn parse<'a>(&self, channel: &'a str) -> Option<ChannelKind<'a>> {
		let rest = channel
			.strip_prefix(self.key.as_str())?
			.strip_prefix(DELIMITER)?;

		if rest == REQUEST_SUFFIX {
			return Some(ChannelKind::Request);
		}

		if let Some(muid) = rest
			.strip_suffix(RESPONSE_SUFFIX)
			.and_then(|r| r.strip_suffix(DELIMITER))
		{
			return Some(ChannelKind::Response { muid });
		}

		let rest = rest.strip_suffix(DELIMITER)?;
		match rest.split_once(DELIMITER) {
			Some((nsp, room)) => Some(ChannelKind::Broadcast {
				nsp,
				room: Some(room),
			}),
			None => Some(ChannelKind::Broadcast { nsp: rest, room: None }),
		}
	}
}
