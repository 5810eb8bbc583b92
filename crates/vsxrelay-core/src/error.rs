use std::path::PathBuf;

use thiserror::Error;

/// Problems found while reading configuration sources or merging them.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config file '{}' (line {line}): {reason}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("failed to parse TOML config '{}': {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("unknown option '{0}'")]
    UnknownKey(String),
    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    #[error("missing operation (expected one of: download, install, update)")]
    MissingOperation,
    #[error("unknown operation '{0}' (expected one of: download, install, update)")]
    UnknownOperation(String),
    #[error("missing required option --extensions")]
    MissingExtensions,
}

/// Every failure the relay can report.
///
/// Fatal variants abort the run before any item is processed. The rest are
/// recorded against a single extension and the run moves on.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no extensions to process: {0}")]
    NoExtensions(String),
    #[error("cannot connect to {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },
    #[error("editor '{binary}' is not available: {reason}")]
    EditorUnavailable { binary: String, reason: String },
    #[error("failed to download {extension}: {reason}")]
    Download { extension: String, reason: String },
    #[error("extension '{extension}' was not found on {marketplace}")]
    UnknownExtension {
        extension: String,
        marketplace: String,
    },
    #[error("failed to transfer '{path}': {reason}")]
    Transfer { path: String, reason: String },
    #[error("remote command `{command}` failed: {reason}")]
    RemoteExecution { command: String, reason: String },
    #[error("failed to install '{artifact}': {output}")]
    Install { artifact: String, output: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns true when the error must stop the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::NoExtensions(_)
                | Self::Connection { .. }
                | Self::EditorUnavailable { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
