use anyhow::{Context, Result};
use shared::protocol::ControlCommand;
use url::Url;

use crate::error::ClientError;

const SSE_PATH: &str = "sse";
const WEBSOCKET_PATH: &str = "time";

/// Base URL of the timer authority, normalised to end in `/` so that
/// endpoint paths join underneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    base: Url,
}

impl ServerEndpoint {
    pub fn parse(server_url: &str) -> Result<Self, ClientError> {
        let mut base = Url::parse(server_url.trim()).map_err(|source| ClientError::InvalidUrl {
            url: server_url.to_string(),
            source,
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::UnsupportedScheme(server_url.to_string()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.set_query(None);
        base.set_fragment(None);
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn sse_url(&self) -> Result<Url> {
        self.base
            .join(SSE_PATH)
            .with_context(|| format!("failed to build sse url from {}", self.base))
    }

    /// `http` becomes `ws`, `https` becomes `wss`, and the path gains `time`.
    pub fn websocket_url(&self) -> Result<Url> {
        let mut url = self
            .base
            .join(WEBSOCKET_PATH)
            .with_context(|| format!("failed to build websocket url from {}", self.base))?;
        let scheme = if self.base.scheme() == "https" {
            "wss"
        } else {
            "ws"
        };
        url.set_scheme(scheme)
            .map_err(|()| anyhow::anyhow!("cannot switch {} to {scheme}", self.base))?;
        Ok(url)
    }

    /// Query text is percent-encoded with the URL query set, so spaces become
    /// `%20` and the raw list survives the server's prefix match.
    pub fn command_url(&self, command: &ControlCommand) -> Result<Url> {
        let mut url = self
            .base
            .join(command.http_path())
            .with_context(|| format!("failed to build {} url", command.name()))?;
        url.set_query(command.http_query().as_deref());
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_push_urls_from_base() {
        let endpoint = ServerEndpoint::parse("http://10.0.0.5:8811").expect("endpoint");
        assert_eq!(
            endpoint.sse_url().expect("sse").as_str(),
            "http://10.0.0.5:8811/sse"
        );
        assert_eq!(
            endpoint.websocket_url().expect("ws").as_str(),
            "ws://10.0.0.5:8811/time"
        );
    }

    #[test]
    fn keeps_base_path_and_upgrades_tls_scheme() {
        let endpoint = ServerEndpoint::parse("https://clock.example/stage").expect("endpoint");
        assert_eq!(
            endpoint.websocket_url().expect("ws").as_str(),
            "wss://clock.example/stage/time"
        );
        assert_eq!(
            endpoint
                .command_url(&ControlCommand::Start)
                .expect("url")
                .as_str(),
            "https://clock.example/stage/start"
        );
    }

    #[test]
    fn command_urls_carry_raw_query() {
        let endpoint = ServerEndpoint::parse("http://127.0.0.1:8811/").expect("endpoint");
        assert_eq!(
            endpoint
                .command_url(&ControlCommand::SetTime { millis: 61000 })
                .expect("url")
                .as_str(),
            "http://127.0.0.1:8811/config?time=61000"
        );
        assert_eq!(
            endpoint
                .command_url(&ControlCommand::set_clients("a:9000 b:9001"))
                .expect("url")
                .as_str(),
            "http://127.0.0.1:8811/config?clients=a:9000%20b:9001"
        );
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            ServerEndpoint::parse("ftp://host/"),
            Err(ClientError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            ServerEndpoint::parse("not a url"),
            Err(ClientError::InvalidUrl { .. })
        ));
    }
}
