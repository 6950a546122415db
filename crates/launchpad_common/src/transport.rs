//! Remote access for manifests and artifacts
//!
//! Everything the launcher reads from its update source goes through a
//! `Transport`. `SchemeTransport` is the default: `http`/`https` through a
//! blocking reqwest client, `file` straight from disk.

use reqwest::Url;
use std::fs::File;
use std::io::{self, Read};
use std::time::Duration;
use tracing::debug;

use crate::settings::NetworkSettings;

/// Errors from a single remote read
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}")]
    Status { status: u16 },

    #[error("unsupported url scheme `{0}`")]
    UnsupportedScheme(String),

    #[error("not a local file url: {0}")]
    NotAFile(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Streaming reader over a remote resource
pub type RemoteStream = Box<dyn Read + Send>;

/// Opens a streaming read of a URL
pub trait Transport: Send + Sync {
    fn open(&self, url: &Url) -> Result<RemoteStream, TransportError>;

    /// Read a small document (a manifest) completely
    fn fetch_string(&self, url: &Url) -> Result<String, TransportError> {
        let mut stream = self.open(url)?;
        let mut text = String::new();
        stream.read_to_string(&mut text)?;
        Ok(text)
    }
}

/// HTTP(S) transport on a blocking reqwest client
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(settings: &NetworkSettings) -> Result<Self, TransportError> {
        let user_agent = settings
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("launchpad/{}", env!("CARGO_PKG_VERSION")));

        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .danger_accept_invalid_certs(settings.insecure_tls)
            .build()?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn open(&self, url: &Url) -> Result<RemoteStream, TransportError> {
        debug!("GET {}", url);
        let response = self.client.get(url.clone()).send()?;

        if !response.status().is_success() {
            return Err(TransportError::Status {
                status: response.status().as_u16(),
            });
        }

        Ok(Box::new(response))
    }
}

/// `file://` transport
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTransport;

impl Transport for FileTransport {
    fn open(&self, url: &Url) -> Result<RemoteStream, TransportError> {
        let path = url
            .to_file_path()
            .map_err(|_| TransportError::NotAFile(url.to_string()))?;
        debug!("open {}", path.display());
        Ok(Box::new(File::open(path)?))
    }
}

/// Dispatches on the URL scheme
pub struct SchemeTransport {
    http: HttpTransport,
    file: FileTransport,
}

impl SchemeTransport {
    pub fn new(settings: &NetworkSettings) -> Result<Self, TransportError> {
        Ok(Self {
            http: HttpTransport::new(settings)?,
            file: FileTransport,
        })
    }
}

impl Transport for SchemeTransport {
    fn open(&self, url: &Url) -> Result<RemoteStream, TransportError> {
        match url.scheme() {
            "http" | "https" => self.http.open(url),
            "file" => self.file.open(url),
            other => Err(TransportError::UnsupportedScheme(other.to_string())),
        }
    }
}
