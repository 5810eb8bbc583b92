use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::Deserialize;

use crate::constants::{OPEN_VSX_API_URL, VS_MARKETPLACE_HOST_SUFFIX};

/// A distinct build of the target editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorChannel {
    Code,
    Insiders,
    Codium,
}

impl Default for EditorChannel {
    fn default() -> Self {
        Self::Code
    }
}

impl EditorChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Insiders => "insiders",
            Self::Codium => "codium",
        }
    }

    /// The command-line entry point of this editor build.
    pub fn binary(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Insiders => "code-insiders",
            Self::Codium => "codium",
        }
    }

    /// Where extensions for this build are published.
    pub fn marketplace(self) -> Marketplace {
        match self {
            Self::Code | Self::Insiders => Marketplace::VisualStudio,
            Self::Codium => Marketplace::OpenVsx,
        }
    }
}

impl Display for EditorChannel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EditorChannel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "code" | "stable" | "vscode" => Ok(Self::Code),
            "insiders" | "code-insiders" | "insider" => Ok(Self::Insiders),
            "codium" | "vscodium" => Ok(Self::Codium),
            other => Err(format!(
                "unknown editor '{other}' (supported: code, insiders, codium)"
            )),
        }
    }
}

/// An extension registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marketplace {
    VisualStudio,
    OpenVsx,
}

impl Marketplace {
    pub fn name(self) -> &'static str {
        match self {
            Self::VisualStudio => "the Visual Studio Marketplace",
            Self::OpenVsx => "Open VSX",
        }
    }

    /// Direct package URL for `publisher.name` at `version` (`latest` allowed
    /// for the Visual Studio Marketplace only).
    pub fn package_url(self, publisher: &str, name: &str, version: &str) -> String {
        match self {
            Self::VisualStudio => format!(
                "https://{publisher}{VS_MARKETPLACE_HOST_SUFFIX}/_apis/public/gallery/publisher/{publisher}/extension/{name}/{version}/assetbyname/Microsoft.VisualStudio.Services.VSIXPackage"
            ),
            Self::OpenVsx => format!(
                "{OPEN_VSX_API_URL}/{publisher}/{name}/{version}/file/{publisher}.{name}-{version}.vsix"
            ),
        }
    }

    /// JSON metadata URL describing the latest release, when the registry
    /// needs one to locate an unpinned package.
    pub fn metadata_url(self, publisher: &str, name: &str) -> Option<String> {
        match self {
            Self::VisualStudio => None,
            Self::OpenVsx => Some(format!("{OPEN_VSX_API_URL}/{publisher}/{name}")),
        }
    }
}

impl Display for Marketplace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
