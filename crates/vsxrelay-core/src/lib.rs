//! Core logic and abstractions for vsxrelay.
//!
//! This crate defines the operations, editor channels, layered configuration,
//! extension locator, artifacts, the remote-session seam and the installer
//! used across the vsxrelay workspace.

pub mod artifact;
pub mod channel;
pub mod config;
pub mod constants;
pub mod editor;
pub mod error;
pub mod extension;
pub mod operation;
pub mod report;
pub mod session;

pub use artifact::{Artifact, ArtifactLocation};
pub use channel::{EditorChannel, Marketplace};
pub use config::{ConfigLayer, EffectiveConfig, ExtensionsValue, Topology};
pub use editor::Installer;
pub use error::{ConfigError, Error, Result};
pub use extension::{downloads, ExtensionRef, ExtensionSource, InstalledExtensions, Located};
pub use operation::Operation;
pub use report::{ItemReport, RunSummary, Stage};
pub use session::{
    CommandRunner, ExecOutput, LocalRunner, OfflineSession, RemoteEndpoint, RemoteRunner,
    RemoteSession,
};
