use std::fs;
use std::path::Path;

use tracing::{debug, info, instrument, warn};
use vsxrelay_core::artifact::find_staged;
use vsxrelay_core::session::{remote_join, shell_line};
use vsxrelay_core::{
    downloads, Artifact, ArtifactLocation, EffectiveConfig, Error, ExtensionRef, ExtensionSource,
    Installer, ItemReport, Located, Operation, RemoteSession, Result, RunSummary, Stage, Topology,
};
use vsxrelay_market::ArtifactFetcher;

/// Drives every located extension through fetch, transfer, install and clean.
#[derive(Debug)]
pub struct Orchestrator<'a> {
    config: &'a EffectiveConfig,
    fetcher: ArtifactFetcher<'a>,
    installer: Installer<'a>,
    session: Option<&'a dyn RemoteSession>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a EffectiveConfig,
        fetcher: ArtifactFetcher<'a>,
        installer: Installer<'a>,
        session: Option<&'a dyn RemoteSession>,
    ) -> Self {
        Self {
            config,
            fetcher,
            installer,
            session,
        }
    }

    fn operation(&self) -> Operation {
        self.config.operation
    }

    fn topology(&self) -> Topology {
        self.config.topology()
    }

    /// Runs the configured operation.
    ///
    /// # Errors
    /// Only fatal errors are returned; per-item failures are recorded in the
    /// summary.
    #[instrument(skip(self), fields(operation = %self.config.operation, topology = self.topology().as_str()))]
    pub fn run(&self) -> Result<RunSummary> {
        let config = self.config;
        if self.operation().installs() && !config.dry_run {
            let version = self.installer.ensure_available()?;
            info!(target: "vsxr",
                "using {} {} on {}",
                config.dest_editor.binary(),
                version,
                self.installer.location()
            );
        }

        let source = ExtensionSource::from_value(&config.extensions);
        let mut located = source.locate(&self.installer)?;
        if self.operation().fetches() {
            located = downloads(located);
        }
        info!(target: "vsxr",
            "{} {} extension(s) via {}",
            self.operation(),
            located.len(),
            self.topology().as_str()
        );

        if self.operation().fetches() && !config.dry_run {
            fs::create_dir_all(&config.output_dir).map_err(|e| {
                Error::io(
                    format!("failed to create '{}'", config.output_dir.display()),
                    e,
                )
            })?;
        }
        let staging = self.uses_remote_staging();
        if staging {
            self.remote(&["mkdir", "-p", config.remote_dir.as_str()])?;
        }

        let mut summary = RunSummary::new(self.operation(), config.dry_run);
        for item in &located {
            summary.items.push(self.process(item));
        }

        if staging {
            if let Err(e) = self.remote(&["rmdir", config.remote_dir.as_str()]) {
                debug!("left {} in place: {}", config.remote_dir, e);
            }
        }
        Ok(summary)
    }

    /// Whether any item passes through the remote staging directory.
    fn uses_remote_staging(&self) -> bool {
        match self.topology() {
            Topology::Local => false,
            Topology::Pull => self.operation().fetches(),
            Topology::Push => self.operation().installs(),
        }
    }

    fn process(&self, located: &Located) -> ItemReport {
        let mut item = ItemReport::new(located.extension.clone());
        if let Err(e) = self.drive(located, &mut item) {
            warn!(target: "vsxr", "{} failed: {}", located.extension, e);
            item.fail(e);
        }
        item
    }

    fn drive(&self, located: &Located, item: &mut ItemReport) -> Result<()> {
        let artifact = match self.operation() {
            Operation::Install => self.staged(located, item)?,
            Operation::Download | Operation::Update => self.fetch(located, item)?,
        };
        let Artifact {
            extension, location, ..
        } = artifact;
        let mut artifact = match location {
            ArtifactLocation::Remote(remote) => self.pull(&extension, &remote, item)?,
            local @ ArtifactLocation::Local(_) => Artifact::new(extension, local),
        };

        if !self.operation().installs() {
            return Ok(());
        }
        self.install(&artifact, item)?;
        artifact.delete_after_use = !self.config.keep;
        self.clean(&artifact, item)
    }

    /// Finds an existing package for the install operation.
    fn staged(&self, located: &Located, item: &mut ItemReport) -> Result<Artifact> {
        let extension = &located.extension;
        let path = located
            .package
            .clone()
            .or_else(|| find_staged(&self.config.output_dir, extension))
            .ok_or_else(|| {
                Error::io(
                    format!(
                        "no package for {} in '{}'",
                        extension,
                        self.config.output_dir.display()
                    ),
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                )
            })?;

        item.advance(Stage::Fetched, format!("use {}", path.display()));
        Ok(Artifact::new(extension.clone(), ArtifactLocation::Local(path)))
    }

    fn fetch(&self, located: &Located, item: &mut ItemReport) -> Result<Artifact> {
        let extension = located.fetch_ref();

        if self.config.dry_run {
            let destination = self.fetcher.destination(&extension);
            self.plan(
                item,
                Stage::Fetched,
                format!(
                    "download {} from {} to {}",
                    extension,
                    self.fetcher.planned_url(&extension),
                    destination
                ),
            );
            return Ok(Artifact::new(extension, destination));
        }

        let artifact = self.fetcher.fetch(&extension)?;
        item.advance(
            Stage::Fetched,
            format!("downloaded {} to {}", extension, artifact.location),
        );
        Ok(artifact)
    }

    /// Copies a remotely downloaded package into the output directory.
    fn pull(&self, extension: &ExtensionRef, remote: &str, item: &mut ItemReport) -> Result<Artifact> {
        let local = self.config.output_dir.join(extension.file_name());
        let step = format!(
            "copy {} from {} to {}",
            remote,
            self.endpoint(),
            local.display()
        );

        if self.config.dry_run {
            self.plan(item, Stage::Transferred, step);
            self.plan(item, Stage::Transferred, format!("remove {remote} on {}", self.endpoint()));
        } else {
            let copied = self.session()?.download(remote, &local);
            self.discard_remote(remote);
            copied?;
            self.record(item, Stage::Transferred, step);
        }
        Ok(Artifact::new(extension.clone(), ArtifactLocation::Local(local)))
    }

    fn install(&self, artifact: &Artifact, item: &mut ItemReport) -> Result<()> {
        let ArtifactLocation::Local(local) = &artifact.location else {
            return Err(Error::Install {
                artifact: artifact.location.to_string(),
                output: "package is not on this machine".to_string(),
            });
        };

        if self.topology() != Topology::Push {
            return self.install_at(&local.display().to_string(), item);
        }

        let remote = remote_join(&self.config.remote_dir, &file_name(local));
        let step = format!(
            "upload {} to {} on {}",
            local.display(),
            remote,
            self.endpoint()
        );
        if self.config.dry_run {
            self.plan(item, Stage::Transferred, step);
            self.install_at(&remote, item)?;
            self.plan(item, Stage::Installed, format!("remove {remote} on {}", self.endpoint()));
            return Ok(());
        }

        self.session()?.upload(local, &remote)?;
        self.record(item, Stage::Transferred, step);
        let installed = self.install_at(&remote, item);
        self.discard_remote(&remote);
        installed
    }

    fn install_at(&self, package: &str, item: &mut ItemReport) -> Result<()> {
        let step = format!(
            "install {} with {} on {}",
            package,
            self.config.dest_editor.binary(),
            self.installer.location()
        );
        if self.config.dry_run {
            self.plan(item, Stage::Installed, step);
            return Ok(());
        }
        self.installer.install(package)?;
        self.record(item, Stage::Installed, step);
        Ok(())
    }

    /// Removes the local package once it is installed, unless it is kept.
    fn clean(&self, artifact: &Artifact, item: &mut ItemReport) -> Result<()> {
        let ArtifactLocation::Local(local) = &artifact.location else {
            return Ok(());
        };
        if !artifact.delete_after_use {
            item.advance(Stage::Cleaned, format!("keep {}", local.display()));
            return Ok(());
        }

        let step = format!("remove {}", local.display());
        if self.config.dry_run {
            self.plan(item, Stage::Cleaned, step);
            return Ok(());
        }
        match fs::remove_file(local) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} already gone", local.display());
            }
            Err(e) => {
                return Err(Error::io(format!("failed to remove '{}'", local.display()), e));
            }
        }
        self.record(item, Stage::Cleaned, step);
        Ok(())
    }

    fn plan(&self, item: &mut ItemReport, stage: Stage, action: String) {
        info!(target: "vsxr", "dry-run: would {}", action);
        item.advance(stage, format!("would {action}"));
    }

    fn record(&self, item: &mut ItemReport, stage: Stage, action: String) {
        info!(target: "vsxr", "{}", action);
        item.advance(stage, action);
    }

    fn endpoint(&self) -> String {
        self.config.endpoint.to_string()
    }

    fn session(&self) -> Result<&'a dyn RemoteSession> {
        self.session.ok_or_else(|| Error::Connection {
            endpoint: self.endpoint(),
            reason: "no remote session was opened".to_string(),
        })
    }

    /// Runs a housekeeping command on the remote host; dry runs only report it.
    fn remote(&self, argv: &[&str]) -> Result<()> {
        let argv: Vec<String> = argv.iter().map(|s| (*s).to_string()).collect();
        let line = shell_line(&argv)?;
        if self.config.dry_run {
            info!(target: "vsxr", "dry-run: would run `{}` on {}", line, self.endpoint());
            return Ok(());
        }

        let output = self.session()?.execute(&line)?;
        if !output.success() {
            return Err(Error::RemoteExecution {
                command: line,
                reason: output.diagnostic(),
            });
        }
        Ok(())
    }

    fn discard_remote(&self, remote: &str) {
        if let Err(e) = self.remote(&["rm", "-f", remote]) {
            warn!(target: "vsxr", "failed to remove {} on {}: {}", remote, self.endpoint(), e);
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
