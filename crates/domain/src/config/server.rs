use serde::{Deserialize, Serialize};

/// HTTP/WebSocket server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// Environment variable holding the shared session token. When the env
    /// var is set, WebSocket connects with a mismatched `token` query param
    /// are closed with code 4001. Unset = open access (dev mode).
    #[serde(default = "d_session_token_env")]
    pub session_token_env: String,
    /// Maximum concurrent HTTP requests (backpressure protection).
    #[serde(default = "d_max_concurrent")]
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            session_token_env: d_session_token_env(),
            max_concurrent_requests: d_max_concurrent(),
        }
    }
}

impl ServerConfig {
    /// The URL the client uses for the sandbox preview pane.
    pub fn sandbox_url(&self) -> String {
        format!("http://{}:{}/sandbox", self.host, self.port)
    }
}

fn d_host() -> String {
    "127.0.0.1".into()
}

fn d_port() -> u16 {
    8001
}

fn d_session_token_env() -> String {
    "VOCO_SESSION_TOKEN".into()
}

fn d_max_concurrent() -> usize {
    64
}
