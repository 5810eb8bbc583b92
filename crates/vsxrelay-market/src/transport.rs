//! Ways of retrieving marketplace resources.
//!
//! A [`Transport`] runs HTTP GETs somewhere: [`HttpTransport`] on this machine,
//! [`CurlTransport`] on the remote host through its session. Non-success HTTP
//! statuses are returned as values so the fetcher can tell an unknown
//! extension from a broken network.

use std::fmt::Debug;

use thiserror::Error;
use vsxrelay_core::ArtifactLocation;

mod curl;
mod http;

pub use curl::CurlTransport;
pub use http::HttpTransport;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Remote(#[from] vsxrelay_core::Error),
}

impl TransportError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Status and body of a text response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Result of saving a response body to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Saved {
    Written(ArtifactLocation),
    /// The server answered with this non-success status; nothing was kept.
    Rejected(u16),
}

pub trait Transport: Debug {
    /// Where the requests are made from, for log lines.
    fn location(&self) -> String;

    /// Where [`Transport::save`] puts `file_name`.
    fn destination(&self, file_name: &str) -> ArtifactLocation;

    fn get_text(&self, url: &str) -> Result<Reply, TransportError>;

    fn save(&self, url: &str, file_name: &str) -> Result<Saved, TransportError>;
}
