use std::time::Duration;

pub const DEFAULT_IP_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_TCP_PORT: u16 = 6633;

/// Settings for a controller `Server`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on.
    pub ip: String,
    pub port: u16,
    /// Maximum number of messages kept per switch. `None` keeps them all.
    pub message_log_capacity: Option<usize>,
    /// Bound on each blocking read during the handshake. `None` or zero waits forever.
    pub handshake_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            ip: DEFAULT_IP_ADDRESS.to_string(),
            port: DEFAULT_TCP_PORT,
            message_log_capacity: None,
            handshake_timeout: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}
