//! Marketplace access for vsxrelay: where a `.vsix` lives for each editor
//! channel, and the transports that bring it to the output directory.

pub mod fetcher;
pub mod transport;

pub use fetcher::{ArtifactFetcher, DownloadLocation};
pub use transport::{CurlTransport, HttpTransport, Reply, Saved, Transport, TransportError};
