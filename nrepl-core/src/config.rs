use std::{path::PathBuf, time::Duration};

/// Timeout for establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(8);
/// How long a readiness wait blocks before the poll hook gets a turn.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long the tunnel waits for the socket reader once input is exhausted.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Where to connect and how to behave while waiting.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub poll_interval: Duration,
    /// While this file exists the owning host is considered alive.
    pub keepalive: Option<PathBuf>,
    pub join_timeout: Duration,
}

impl Config {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            keepalive: None,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn keepalive(mut self, path: Option<PathBuf>) -> Self {
        self.keepalive = path;
        self
    }

    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn addr(&self) -> (&str, u16) {
        (&self.host, self.port)
    }
}
