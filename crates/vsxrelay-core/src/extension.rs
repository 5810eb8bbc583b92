//! Extension identifiers and the locator that turns `--extensions` into a work list.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, instrument, warn};

use crate::config::ExtensionsValue;
use crate::constants::{ALL_INSTALLED, VSIX_EXTENSION};
use crate::error::{ConfigError, Error, Result};

/// An extension identifier in `publisher.name` form, optionally pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtensionRef {
    pub publisher: String,
    pub name: String,
    pub version: Option<String>,
}

impl ExtensionRef {
    pub fn new(publisher: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            publisher: publisher.into(),
            name: name.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// `publisher.name`, without the version.
    pub fn id(&self) -> String {
        format!("{}.{}", self.publisher, self.name)
    }

    /// Package file name; namespaced by identifier and version so items never collide.
    pub fn file_name(&self) -> String {
        match &self.version {
            Some(version) => format!("{}-{}.{VSIX_EXTENSION}", self.id(), version),
            None => format!("{}.{VSIX_EXTENSION}", self.id()),
        }
    }

    /// Derives an identifier from a package file name such as
    /// `ms-python.python-2024.2.1.vsix` or `redhat.java.vsix`.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let stem = strip_vsix_suffix(file_name)?;
        let (publisher, rest) = stem.split_once('.')?;
        if publisher.is_empty() || rest.is_empty() {
            return None;
        }

        // Names may contain dashes; the version starts at the last `-` followed by a dotted numeric version.
        let version_at = rest
            .rmatch_indices('-')
            .map(|(idx, _)| idx)
            .find(|&idx| is_version(&rest[idx + 1..]));

        let (name, version) = match version_at {
            Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
            None => (rest, None),
        };
        if !is_valid_segment(publisher) || !is_valid_segment(name) {
            return None;
        }

        Some(Self {
            publisher: publisher.to_string(),
            name: name.to_string(),
            version: version.map(ToOwned::to_owned),
        })
    }

    /// The same identifier with the version removed.
    pub fn unpinned(&self) -> Self {
        Self {
            version: None,
            ..self.clone()
        }
    }
}

impl Display for ExtensionRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.id(), version),
            None => write!(f, "{}", self.id()),
        }
    }
}

impl FromStr for ExtensionRef {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let (id, version) = match value.split_once('@') {
            Some((id, version)) if !version.is_empty() => (id, Some(version)),
            Some(_) => return Err(format!("'{value}' has an empty version")),
            None => (value, None),
        };

        let (publisher, name) = id
            .split_once('.')
            .ok_or_else(|| format!("'{value}' is not in publisher.name form"))?;
        if !is_valid_segment(publisher) || !is_valid_segment(name) {
            return Err(format!("'{value}' is not in publisher.name form"));
        }

        Ok(Self {
            publisher: publisher.to_string(),
            name: name.to_string(),
            version: version.map(ToOwned::to_owned),
        })
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// `1.2.3`, optionally followed by a pre-release tail such as `-beta.1`.
fn is_version(text: &str) -> bool {
    let core = text.split_once('-').map_or(text, |(core, _)| core);
    let mut parts = core.split('.');
    let numeric = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());
    parts.clone().count() >= 2 && parts.all(numeric)
}

fn strip_vsix_suffix(file_name: &str) -> Option<&str> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    ext.eq_ignore_ascii_case(VSIX_EXTENSION).then_some(stem)
}

/// Lists the `.vsix` files directly inside `dir`, in file-name order.
pub fn list_packages(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| Error::io(format!("failed to list '{}'", dir.display()), e))?;

    let mut packages = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(format!("failed to list '{}'", dir.display()), e))?;
        let path = entry.path();
        let is_package = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(strip_vsix_suffix)
            .is_some();
        if is_package && path.is_file() {
            packages.push(path);
        }
    }
    packages.sort();
    Ok(packages)
}

/// Enumerates the extensions currently installed in an editor.
pub trait InstalledExtensions {
    fn installed_extensions(&self) -> Result<Vec<ExtensionRef>>;
}

/// What `--extensions` resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionSource {
    /// Literal identifiers, in input order.
    Identifiers(Vec<String>),
    /// A directory of `.vsix` packages.
    Directory(PathBuf),
    /// A single `.vsix` package.
    Package(PathBuf),
    /// Every extension installed in the destination editor.
    Installed,
}

/// One entry of the work list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub extension: ExtensionRef,
    /// Set when the entry came from a package on disk.
    pub package: Option<PathBuf>,
}

impl Located {
    /// The identifier to download. Versions read off package names are not pins.
    pub fn fetch_ref(&self) -> ExtensionRef {
        match self.package {
            Some(_) => self.extension.unpinned(),
            None => self.extension.clone(),
        }
    }
}

/// Rewrites a work list for downloading: every entry takes its
/// [`Located::fetch_ref`], and entries that then name the same package collapse
/// into the first one.
pub fn downloads(located: Vec<Located>) -> Vec<Located> {
    distinct(
        located
            .into_iter()
            .map(|item| Located {
                extension: item.fetch_ref(),
                package: item.package,
            })
            .collect(),
    )
}

fn distinct(located: Vec<Located>) -> Vec<Located> {
    let mut seen = HashSet::new();
    located
        .into_iter()
        .filter(|item| {
            let fresh = seen.insert(item.extension.clone());
            if !fresh {
                debug!("dropping duplicate extension {}", item.extension);
            }
            fresh
        })
        .collect()
}

impl ExtensionSource {
    pub fn from_value(value: &ExtensionsValue) -> Self {
        match value {
            ExtensionsValue::List(items) => Self::Identifiers(split_identifiers(items)),
            ExtensionsValue::One(text) => {
                let trimmed = text.trim();
                let path = Path::new(trimmed);
                if trimmed == ALL_INSTALLED {
                    Self::Installed
                } else if path.is_dir() {
                    Self::Directory(path.to_path_buf())
                } else if strip_vsix_suffix(trimmed).is_some() && path.is_file() {
                    Self::Package(path.to_path_buf())
                } else {
                    Self::Identifiers(split_identifiers(std::slice::from_ref(text)))
                }
            }
        }
    }

    /// Produces the ordered, de-duplicated work list.
    ///
    /// Only reads from disk (or asks `installed`), so it may be called again
    /// for a later phase of the same run.
    ///
    /// # Errors
    /// `NoExtensions` when the list is empty, `Config` for malformed identifiers.
    #[instrument(skip(installed))]
    pub fn locate(&self, installed: &dyn InstalledExtensions) -> Result<Vec<Located>> {
        let located = match self {
            Self::Identifiers(items) => items
                .iter()
                .map(|item| -> Result<Located> {
                    let extension = item.parse::<ExtensionRef>().map_err(|reason| {
                        ConfigError::InvalidValue {
                            key: "extensions".to_string(),
                            value: item.clone(),
                            reason,
                        }
                    })?;
                    Ok(Located {
                        extension,
                        package: None,
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            Self::Directory(dir) => list_packages(dir)?
                .into_iter()
                .filter_map(|path| located_package(path).ok())
                .collect(),
            Self::Package(path) => vec![located_package(path.clone())?],
            Self::Installed => installed
                .installed_extensions()?
                .into_iter()
                .map(|ext| Located {
                    extension: ext.unpinned(),
                    package: None,
                })
                .collect(),
        };

        let located = distinct(located);
        if located.is_empty() {
            return Err(Error::NoExtensions(self.describe()));
        }
        debug!("located {} extension(s)", located.len());
        Ok(located)
    }

    fn describe(&self) -> String {
        match self {
            Self::Identifiers(_) => "the extension list is empty".to_string(),
            Self::Directory(dir) => format!("no .vsix packages in '{}'", dir.display()),
            Self::Package(path) => format!("'{}' is not a package", path.display()),
            Self::Installed => "the destination editor has no extensions installed".to_string(),
        }
    }
}

fn located_package(path: PathBuf) -> Result<Located> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    match ExtensionRef::from_file_name(&file_name) {
        Some(extension) => Ok(Located {
            extension,
            package: Some(path),
        }),
        None => {
            warn!(
                "cannot derive an extension identifier from '{}'",
                path.display()
            );
            Err(ConfigError::InvalidValue {
                key: "extensions".to_string(),
                value: path.display().to_string(),
                reason: "package name is not publisher.name[-version].vsix".to_string(),
            }
            .into())
        }
    }
}

fn split_identifiers(items: &[String]) -> Vec<String> {
    items
        .iter()
        .flat_map(|item| item.split([',', ';']))
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
