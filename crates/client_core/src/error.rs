use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("server url must start with http:// or https://, got `{0}`")]
    UnsupportedScheme(String),
    #[error("failed to access client list store at {}: {source}", path.display())]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("client list store at {} is not valid JSON: {source}", path.display())]
    StoreFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{0}` has no WebSocket form")]
    NoSocketForm(&'static str),
    #[error("websocket push channel is not connected")]
    SocketNotConnected,
}
