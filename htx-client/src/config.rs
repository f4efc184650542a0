use std::time::Duration;

/// Mirrors `http_client_base`'s constructor defaults as a runtime config
/// struct, per §6's configuration table.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Per-call deadline covering connect + send + full response.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_redirects: u32,
    pub follow_redirects: bool,
    pub user_agent: String,
    pub auto_decompress: bool,
    pub verify_ssl: bool,
    pub max_body_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            max_redirects: 5,
            follow_redirects: true,
            user_agent: "htx-client/0.1".to_string(),
            auto_decompress: true,
            verify_ssl: true,
            max_body_size: htx_proto::response::MAX_CONTENT_SIZE,
        }
    }
}

/// Connect-retry policy for [`crate::connection::ClientConnection`],
/// grounded in `client_connection.cpp`'s `MAX_RETRIES`/`CONNECT_TIMEOUT`.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub connect_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy { max_attempts: 3, connect_timeout: Duration::from_secs(10) }
    }
}
