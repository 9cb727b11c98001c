use anyhow::{anyhow, bail};
use url::Url;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TransportKind {
    Quic,
    WebTransport,
}

impl TransportKind {
    pub fn is_overlay(&self) -> bool {
        match self {
            TransportKind::Quic => false,
            TransportKind::WebTransport => true,
        }
    }
}

/// Where to connect to, and how
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Endpoint {
    pub kind: TransportKind,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Endpoint {
    pub const DEFAULT_PORT: u16 = 443;

    /// `moqt://` selects a direct QUIC connection, `https://` WebTransport
    pub fn parse(uri: &str) -> anyhow::Result<Endpoint> {
        let url = Url::parse(uri)?;
        let kind = match url.scheme() {
            "moqt" => TransportKind::Quic,
            "https" => TransportKind::WebTransport,
            other => bail!("unsupported scheme {:?} in {}", other, uri),
        };
        let host = url.host_str()
            .ok_or_else(|| anyhow!("no host in {}", uri))?
            .to_string();

        Ok(Endpoint {
            kind,
            host,
            port: url.port().unwrap_or(Self::DEFAULT_PORT),
            path: url.path().to_string(),
        })
    }

    /// `host:port` as used for the authority setup parameter
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
