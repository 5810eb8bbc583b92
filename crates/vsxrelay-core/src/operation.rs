use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::error::ConfigError;

/// The top-level action requested for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Download,
    Install,
    Update,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Install => "install",
            Self::Update => "update",
        }
    }

    /// Whether items are fetched from a marketplace.
    pub fn fetches(self) -> bool {
        matches!(self, Self::Download | Self::Update)
    }

    /// Whether items are handed to the destination editor.
    pub fn installs(self) -> bool {
        matches!(self, Self::Install | Self::Update)
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "download" => Ok(Self::Download),
            "install" => Ok(Self::Install),
            "update" => Ok(Self::Update),
            other => Err(ConfigError::UnknownOperation(other.to_string())),
        }
    }
}
