use tracing::{debug, info, instrument};

use crate::channel::EditorChannel;
use crate::error::{Error, Result};
use crate::extension::{ExtensionRef, InstalledExtensions};
use crate::session::CommandRunner;

/// Drives the destination editor's own extension-install entry point.
#[derive(Debug, Clone, Copy)]
pub struct Installer<'a> {
    channel: EditorChannel,
    runner: &'a dyn CommandRunner,
}

impl<'a> Installer<'a> {
    pub fn new(channel: EditorChannel, runner: &'a dyn CommandRunner) -> Self {
        Self { channel, runner }
    }

    pub fn channel(&self) -> EditorChannel {
        self.channel
    }

    pub fn location(&self) -> String {
        self.runner.location()
    }

    pub fn install_argv(&self, package: &str) -> Vec<String> {
        vec![
            self.channel.binary().to_string(),
            "--install-extension".to_string(),
            package.to_string(),
        ]
    }

    /// Checks that the editor binary answers `--version` and returns its version.
    ///
    /// # Errors
    /// `EditorUnavailable` when the binary is missing or fails.
    #[instrument(skip(self), fields(editor = self.channel.binary()))]
    pub fn ensure_available(&self) -> Result<String> {
        let unavailable = |reason: String| Error::EditorUnavailable {
            binary: self.channel.binary().to_string(),
            reason,
        };

        let argv = vec![self.channel.binary().to_string(), "--version".to_string()];
        let output = self.runner.run(&argv).map_err(|e| unavailable(e.to_string()))?;
        if !output.success() {
            return Err(unavailable(output.diagnostic()));
        }

        let version = output.stdout.lines().next().unwrap_or_default().trim().to_string();
        debug!(
            "{} {} found on {}",
            self.channel.binary(),
            version,
            self.runner.location()
        );
        Ok(version)
    }

    /// Installs the package at `package`, a path on the runner's machine.
    ///
    /// # Errors
    /// `Install` carrying the editor's diagnostic output.
    #[instrument(skip(self), fields(editor = self.channel.binary()))]
    pub fn install(&self, package: &str) -> Result<()> {
        let install_error = |output: String| Error::Install {
            artifact: package.to_string(),
            output,
        };

        info!("installing {} with {}", package, self.channel.binary());
        let output = self
            .runner
            .run(&self.install_argv(package))
            .map_err(|e| install_error(e.to_string()))?;
        if !output.success() {
            return Err(install_error(output.diagnostic()));
        }
        Ok(())
    }
}

impl InstalledExtensions for Installer<'_> {
    fn installed_extensions(&self) -> Result<Vec<ExtensionRef>> {
        let argv = vec![
            self.channel.binary().to_string(),
            "--list-extensions".to_string(),
            "--show-versions".to_string(),
        ];
        let unavailable = |reason: String| Error::EditorUnavailable {
            binary: self.channel.binary().to_string(),
            reason,
        };

        let output = self.runner.run(&argv).map_err(|e| unavailable(e.to_string()))?;
        if !output.success() {
            return Err(unavailable(output.diagnostic()));
        }

        Ok(output
            .stdout
            .lines()
            .filter_map(|line| line.trim().parse::<ExtensionRef>().ok())
            .collect())
    }
}
