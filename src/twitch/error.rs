use std::fmt;

/// Errors that can occur on the Twitch chat connection.
#[derive(Debug)]
pub enum TwitchError {
    /// WebSocket connection error
    WebSocketError(String),

    /// IRC login was rejected by the server
    AuthError(String),
}

impl fmt::Display for TwitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TwitchError::WebSocketError(msg) => write!(f, "WebSocket error: {}", msg),
            TwitchError::AuthError(msg) => write!(f, "Authentication error: {}", msg),
        }
    }
}

impl std::error::Error for TwitchError {}

impl From<tokio_tungstenite::tungstenite::Error> for TwitchError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TwitchError::WebSocketError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TwitchError>;
