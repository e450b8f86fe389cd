use core::{num::ParseIntError, str::FromStr, time::Duration};

/// Settings shared by every adapter a [`Node`](crate::Node) produces.
#[derive(Clone, Debug)]
pub struct Options {
	/// Host of the bus server.
	pub host: String,

	/// Port of the bus server.
	pub port: u16,

	/// First segment of every channel name, so several deployments can
	/// share one bus.
	pub key: String,

	/// Base wait per expected peer when aggregating a clients query.
	pub requests_timeout: Duration,
}

impl Default for Options {
	fn default() -> Self {
		Self {
			host: String::from("127.0.0.1"),
			port: 6379,
			key: String::from("socket.io"),
			requests_timeout: Duration::from_millis(50),
		}
	}
}

impl<H: AsRef<str>> From<(H, u16)> for Options {
	fn from((host, port): (H, u16)) -> Self {
		Self {
			host: host.as_ref().into(),
			port,
			..Default::default()
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidAddress {
	#[error("address must be of the form `host:port`")]
	MissingPort,
	#[error("invalid port: {0}")]
	InvalidPort(#[from] ParseIntError),
}

impl FromStr for Options {
	type Err = InvalidAddress;

	/// Parses the `"host:port"` shorthand.
	fn from_str(value: &str) -> Result<Self, Self::Err> {
		let (host, port) = value.rsplit_once(':').ok_or(InvalidAddress::MissingPort)?;
		Ok(Self::from((host, port.parse::<u16>()?)))
	}
}

impl Options {
	/// Connection string for the default redis driver.
	pub fn redis_url(&self) -> String {
		format!("redis://{}:{}", self.host, self.port)
	}
}

#[cfg(test)]
mod tests {
	use super::Options;
	use core::time::Duration;

	#[test]
	fn defaults() {
		let options = Options::default();
		assert_eq!(options.host, "127.0.0.1");
		assert_eq!(options.port, 6379);
		assert_eq!(options.key, "socket.io");
		assert_eq!(options.requests_timeout, Duration::from_millis(50));
	}

	#[test]
	fn from_host_and_port() {
		let options = Options::from(("bus.internal", 6380));
		assert_eq!(options.host, "bus.internal");
		assert_eq!(options.port, 6380);
		assert_eq!(options.key, "socket.io");
	}

	#[test]
	fn parses_address_shorthand() {
		let options: Options = "10.0.0.7:6380".parse().unwrap();
		assert_eq!(options.host, "10.0.0.7");
		assert_eq!(options.port, 6380);
		assert_eq!(options.redis_url(), "redis://10.0.0.7:6380");

		assert!("no-port".parse::<Options>().is_err());
		assert!("host:not-a-port".parse::<Options>().is_err());
	}
}
