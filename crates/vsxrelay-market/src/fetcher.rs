use serde::Deserialize;
use tracing::{debug, info, instrument};
use vsxrelay_core::{Artifact, ArtifactLocation, EditorChannel, Error, ExtensionRef, Marketplace, Result};

use crate::transport::{Saved, Transport, TransportError};

/// The latest release as described by the Open VSX registry.
#[derive(Debug, Deserialize)]
struct Release {
    version: String,
    files: ReleaseFiles,
}

#[derive(Debug, Deserialize)]
struct ReleaseFiles {
    download: String,
}

/// A resolved package URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLocation {
    pub url: String,
    /// The concrete version, when the marketplace told us.
    pub version: Option<String>,
}

/// Retrieves `.vsix` packages for one editor channel through a [`Transport`].
#[derive(Debug, Clone, Copy)]
pub struct ArtifactFetcher<'a> {
    marketplace: Marketplace,
    transport: &'a dyn Transport,
}

impl<'a> ArtifactFetcher<'a> {
    pub fn new(channel: EditorChannel, transport: &'a dyn Transport) -> Self {
        Self {
            marketplace: channel.marketplace(),
            transport,
        }
    }

    pub fn marketplace(&self) -> Marketplace {
        self.marketplace
    }

    /// Where `extension` would be written, without touching anything.
    pub fn destination(&self, extension: &ExtensionRef) -> ArtifactLocation {
        self.transport.destination(&extension.file_name())
    }

    /// The first URL a fetch would request, without touching the network.
    pub fn planned_url(&self, extension: &ExtensionRef) -> String {
        let ExtensionRef {
            publisher, name, ..
        } = extension;
        match (&extension.version, self.marketplace.metadata_url(publisher, name)) {
            (Some(version), _) => self.marketplace.package_url(publisher, name, version),
            (None, Some(metadata)) => metadata,
            (None, None) => self.marketplace.package_url(publisher, name, "latest"),
        }
    }

    /// Resolves the package URL, consulting registry metadata for unpinned
    /// Open VSX extensions.
    ///
    /// # Errors
    /// `UnknownExtension` when the registry does not know the identifier,
    /// `Download` for any other failure.
    #[instrument(skip(self), fields(extension = %extension))]
    pub fn resolve(&self, extension: &ExtensionRef) -> Result<DownloadLocation> {
        let ExtensionRef {
            publisher, name, ..
        } = extension;

        if let Some(version) = &extension.version {
            return Ok(DownloadLocation {
                url: self.marketplace.package_url(publisher, name, version),
                version: Some(version.clone()),
            });
        }
        let Some(metadata_url) = self.marketplace.metadata_url(publisher, name) else {
            return Ok(DownloadLocation {
                url: self.marketplace.package_url(publisher, name, "latest"),
                version: None,
            });
        };

        let reply = self
            .transport
            .get_text(&metadata_url)
            .map_err(|e| self.download_error(extension, e))?;
        if reply.status == 404 {
            return Err(self.unknown(extension));
        }
        if !reply.is_success() {
            return Err(Error::Download {
                extension: extension.id(),
                reason: format!("{} answered HTTP {}", self.marketplace, reply.status),
            });
        }

        let release: Release = serde_json::from_str(&reply.body).map_err(|e| Error::Download {
            extension: extension.id(),
            reason: format!("unreadable metadata from {}: {e}", self.marketplace),
        })?;
        debug!("{} resolves to {}", extension.id(), release.version);
        Ok(DownloadLocation {
            url: release.files.download,
            version: Some(release.version),
        })
    }

    /// Downloads `extension` into the transport's directory.
    ///
    /// The artifact is named after the requested identifier, so an unpinned
    /// package always lands at `<publisher>.<name>.vsix`.
    #[instrument(skip(self), fields(extension = %extension))]
    pub fn fetch(&self, extension: &ExtensionRef) -> Result<Artifact> {
        let location = self.resolve(extension)?;
        info!(
            "downloading {} from {} on {}",
            extension,
            self.marketplace,
            self.transport.location()
        );

        let saved = self
            .transport
            .save(&location.url, &extension.file_name())
            .map_err(|e| self.download_error(extension, e))?;
        match saved {
            Saved::Written(path) => Ok(Artifact::new(extension.clone(), path)),
            Saved::Rejected(404) => Err(self.unknown(extension)),
            Saved::Rejected(status) => Err(Error::Download {
                extension: extension.id(),
                reason: format!("{} answered HTTP {status}", self.marketplace),
            }),
        }
    }

    fn unknown(&self, extension: &ExtensionRef) -> Error {
        Error::UnknownExtension {
            extension: extension.to_string(),
            marketplace: self.marketplace.name().to_string(),
        }
    }

    fn download_error(&self, extension: &ExtensionRef, error: TransportError) -> Error {
        Error::Download {
            extension: extension.id(),
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Reply;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Answers from a fixed url -> status table and remembers every request.
    #[derive(Debug, Default)]
    struct CannedTransport {
        texts: HashMap<String, Reply>,
        statuses: HashMap<String, u16>,
        requests: RefCell<Vec<String>>,
    }

    impl Transport for CannedTransport {
        fn location(&self) -> String {
            "test".into()
        }

        fn destination(&self, file_name: &str) -> ArtifactLocation {
            ArtifactLocation::Local(format!("/out/{file_name}").into())
        }

        fn get_text(&self, url: &str) -> Result<Reply, TransportError> {
            self.requests.borrow_mut().push(url.to_string());
            self.texts.get(url).cloned().ok_or_else(|| TransportError::Request {
                url: url.to_string(),
                reason: "connection refused".into(),
            })
        }

        fn save(&self, url: &str, file_name: &str) -> Result<Saved, TransportError> {
            self.requests.borrow_mut().push(url.to_string());
            match self.statuses.get(url) {
                Some(200) => Ok(Saved::Written(self.destination(file_name))),
                Some(status) => Ok(Saved::Rejected(*status)),
                None => Err(TransportError::Request {
                    url: url.to_string(),
                    reason: "connection refused".into(),
                }),
            }
        }
    }

    fn python() -> ExtensionRef {
        ExtensionRef::new("ms-python", "python")
    }

    #[test]
    fn visual_studio_fetches_latest_asset() {
        let url = Marketplace::VisualStudio.package_url("ms-python", "python", "latest");
        let transport = CannedTransport {
            statuses: HashMap::from([(url.clone(), 200)]),
            ..Default::default()
        };
        let fetcher = ArtifactFetcher::new(EditorChannel::Code, &transport);

        let artifact = fetcher.fetch(&python()).unwrap();
        assert_eq!(
            artifact.location,
            ArtifactLocation::Local("/out/ms-python.python.vsix".into())
        );
        assert!(!artifact.delete_after_use);
        assert_eq!(*transport.requests.borrow(), vec![url]);
    }

    #[test]
    fn pinned_version_names_artifact() {
        let pinned = python().with_version("2024.2.1");
        let url = Marketplace::VisualStudio.package_url("ms-python", "python", "2024.2.1");
        let transport = CannedTransport {
            statuses: HashMap::from([(url, 200)]),
            ..Default::default()
        };
        let fetcher = ArtifactFetcher::new(EditorChannel::Insiders, &transport);

        let artifact = fetcher.fetch(&pinned).unwrap();
        assert_eq!(
            artifact.location,
            ArtifactLocation::Local("/out/ms-python.python-2024.2.1.vsix".into())
        );
    }

    #[test]
    fn open_vsx_resolves_latest_through_metadata() {
        let metadata = "https://open-vsx.org/api/redhat/java".to_string();
        let download = "https://open-vsx.org/api/redhat/java/1.30.0/file/redhat.java-1.30.0.vsix";
        let transport = CannedTransport {
            texts: HashMap::from([(
                metadata.clone(),
                Reply {
                    status: 200,
                    body: format!(
                        r#"{{"namespace":"redhat","name":"java","version":"1.30.0","files":{{"download":"{download}"}}}}"#
                    ),
                },
            )]),
            statuses: HashMap::from([(download.to_string(), 200)]),
            ..Default::default()
        };
        let fetcher = ArtifactFetcher::new(EditorChannel::Codium, &transport);
        let java = ExtensionRef::new("redhat", "java");

        assert_eq!(fetcher.planned_url(&java), metadata);
        let resolved = fetcher.resolve(&java).unwrap();
        assert_eq!(resolved.version.as_deref(), Some("1.30.0"));

        let artifact = fetcher.fetch(&java).unwrap();
        assert_eq!(artifact.extension, java);
        assert_eq!(transport.requests.borrow().last().map(String::as_str), Some(download));
    }

    #[test]
    fn not_found_is_unknown_extension() {
        let url = Marketplace::VisualStudio.package_url("ms-python", "python", "latest");
        let transport = CannedTransport {
            statuses: HashMap::from([(url, 404)]),
            ..Default::default()
        };
        let fetcher = ArtifactFetcher::new(EditorChannel::Code, &transport);

        let err = fetcher.fetch(&python()).expect_err("404");
        assert!(matches!(err, Error::UnknownExtension { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn unknown_on_open_vsx_metadata() {
        let transport = CannedTransport {
            texts: HashMap::from([(
                "https://open-vsx.org/api/nobody/nothing".to_string(),
                Reply {
                    status: 404,
                    body: r#"{"error":"Extension not found: nobody.nothing"}"#.into(),
                },
            )]),
            ..Default::default()
        };
        let fetcher = ArtifactFetcher::new(EditorChannel::Codium, &transport);
        let err = fetcher
            .fetch(&ExtensionRef::new("nobody", "nothing"))
            .expect_err("404");
        assert!(matches!(err, Error::UnknownExtension { .. }));
    }

    #[test]
    fn network_and_server_failures_are_download_errors() {
        let url = Marketplace::VisualStudio.package_url("ms-python", "python", "latest");
        let transport = CannedTransport {
            statuses: HashMap::from([(url, 503)]),
            ..Default::default()
        };
        let fetcher = ArtifactFetcher::new(EditorChannel::Code, &transport);
        let err = fetcher.fetch(&python()).expect_err("503");
        assert!(matches!(err, Error::Download { .. }));
        assert!(err.to_string().contains("503"));

        let offline = CannedTransport::default();
        let fetcher = ArtifactFetcher::new(EditorChannel::Code, &offline);
        let err = fetcher.fetch(&python()).expect_err("offline");
        assert!(err.to_string().contains("connection refused"));
    }
}
