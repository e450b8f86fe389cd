use core::fmt;
use rand::Rng;
use serde::{Deserialize, Serialize};

const UID_LEN: usize = 6;

/// Random tag identifying one [`Node`](crate::Node) on the bus.
///
/// Six alphanumeric characters, drawn once per node. Outbound broadcasts
/// carry the tag so a node can discard its own messages when they come
/// back around; clients queries draw a fresh tag per call to route their
/// responses.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
	pub fn generate() -> Self {
		let mut rng = rand::thread_rng();
		Self(
			(0..UID_LEN)
				.map(|_| rng.sample(rand::distributions::Alphanumeric) as char)
				.collect(),
		)
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Uid {
	#[inline]
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[cfg(test)]
mod tests {
	use super::Uid;

	#[test]
	fn six_alphanumeric_chars() {
		for _ in 0..64 {
			let uid = Uid::generate();
			assert_eq!(uid.as_str().len(), 6);
			assert!(uid.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
		}
	}

	#[test]
	fn tags_are_distinct() {
		assert_ne!(Uid::generate(), Uid::generate());
	}
}
