use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use crate::extension::{list_packages, ExtensionRef};

/// Where a package file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    Local(PathBuf),
    Remote(String),
}

impl ArtifactLocation {
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// The path as passed to a command line.
    pub fn path_string(&self) -> String {
        match self {
            Self::Local(path) => path.display().to_string(),
            Self::Remote(path) => path.clone(),
        }
    }
}

impl Display for ArtifactLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(path) => write!(f, "remote:{path}"),
        }
    }
}

/// A downloaded or staged `.vsix` package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub extension: ExtensionRef,
    pub location: ArtifactLocation,
    /// Whether the clean step removes the file once it is installed.
    pub delete_after_use: bool,
}

impl Artifact {
    pub fn new(extension: ExtensionRef, location: ArtifactLocation) -> Self {
        Self {
            extension,
            location,
            delete_after_use: false,
        }
    }
}

/// Finds a previously downloaded package for `extension` in `dir`.
///
/// A pinned version must match exactly. Otherwise the unversioned file wins,
/// then the highest version found.
pub fn find_staged(dir: &Path, extension: &ExtensionRef) -> Option<PathBuf> {
    let exact = dir.join(extension.file_name());
    if exact.is_file() {
        return Some(exact);
    }
    if extension.version.is_some() {
        return None;
    }

    let id = extension.id();
    list_packages(dir)
        .ok()?
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let found = ExtensionRef::from_file_name(name)?;
            (found.id() == id).then(|| (version_key(found.version.as_deref()), path))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, path)| path)
}

fn version_key(version: Option<&str>) -> Vec<u64> {
    version
        .unwrap_or_default()
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse().unwrap_or(u64::MAX))
        .collect()
}
