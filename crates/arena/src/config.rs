//! Server configuration.

use std::time::Duration;

/// Configuration for the connection layer and the background jobs the
/// server starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,

    /// Longest a single outbound write (or enqueue) may take. Also bounds
    /// the WebSocket upgrade of a new connection.
    pub write_wait: Duration,

    /// How long to wait for a pong before the connection is considered dead.
    pub pong_wait: Duration,

    /// How often to ping the game client. Must be shorter than `pong_wait`.
    pub ping_period: Duration,

    /// Capacity of the outbound queue shared by all connections.
    pub outbound_capacity: usize,

    /// Delay between a client connecting and the first battle being
    /// initialized for it.
    pub init_delay: Duration,

    /// How often the reward accounting job samples queue lengths.
    pub reward_interval: Duration,

    /// Whether to ping the client at all.
    pub keepalive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            write_wait: Duration::from_secs(10),
            pong_wait: Duration::from_secs(10),
            ping_period: Duration::from_secs(9),
            outbound_capacity: 64,
            init_delay: Duration::from_secs(2),
            reward_interval: Duration::from_secs(30),
            keepalive: true,
        }
    }
}

impl ServerConfig {
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Sets the keepalive timings. `ping_period` is clamped by
    /// [`validated`](Self::validated) if it is not below `pong_wait`.
    pub fn keepalive(mut self, ping_period: Duration, pong_wait: Duration) -> Self {
        self.keepalive = true;
        self.ping_period = ping_period;
        self.pong_wait = pong_wait;
        self
    }

    pub fn without_keepalive(mut self) -> Self {
        self.keepalive = false;
        self
    }

    pub fn init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    /// Clamp values that would break the connection layer.
    pub fn validated(mut self) -> Self {
        if self.outbound_capacity == 0 {
            tracing::warn!("outbound_capacity is 0, using 1");
            self.outbound_capacity = 1;
        }
        if self.pong_wait.is_zero() {
            tracing::warn!("pong_wait is 0, using 1s");
            self.pong_wait = Duration::from_secs(1);
        }
        if self.ping_period.is_zero() || self.ping_period >= self.pong_wait {
            let clamped = self.pong_wait * 9 / 10;
            tracing::warn!(
                ping_period_ms = self.ping_period.as_millis() as u64,
                pong_wait_ms = self.pong_wait.as_millis() as u64,
                "ping_period must be below pong_wait, clamping to 90%"
            );
            self.ping_period = clamped;
        }
        if self.write_wait.is_zero() {
            tracing::warn!("write_wait is 0, using 1s");
            self.write_wait = Duration::from_secs(1);
        }
        if self.reward_interval.is_zero() {
            tracing::warn!("reward_interval is 0, using 1s");
            self.reward_interval = Duration::from_secs(1);
        }
        self
    }
}
