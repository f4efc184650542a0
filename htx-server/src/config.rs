use std::time::Duration;

/// Mirrors `server_connection`'s compile-time constants as runtime,
/// per-listener configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub read_buffer_size: usize,
    pub connection_timeout: Duration,
    pub max_body_size: usize,
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            read_buffer_size: 8 * 1024,
            connection_timeout: Duration::from_secs(120),
            max_body_size: 8 * 1024 * 1024,
            cors_enabled: false,
        }
    }
}

/// Mirrors `sse_connection`'s queue depth and idle timeout.
#[derive(Clone, Copy, Debug)]
pub struct SseConfig {
    pub max_queue_depth: usize,
    pub idle_timeout: Duration,
}

impl Default for SseConfig {
    fn default() -> Self {
        SseConfig { max_queue_depth: 100, idle_timeout: Duration::from_secs(60) }
    }
}
