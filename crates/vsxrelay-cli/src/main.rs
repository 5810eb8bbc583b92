use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};

use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vsxrelay_core::config::{load_config_file, resolve};
use vsxrelay_core::session::ssh::SshSession;
use vsxrelay_core::{
    CommandRunner, ConfigLayer, EditorChannel, EffectiveConfig, ExtensionsValue, Installer,
    LocalRunner, OfflineSession, RemoteRunner, RemoteSession, RunSummary, Topology,
};
use vsxrelay_market::{ArtifactFetcher, CurlTransport, HttpTransport, Transport};

mod orchestrator;
mod styles;
mod summary;

use orchestrator::Orchestrator;
use styles as s;

/// Exit status when the run could not start or was aborted.
const FATAL: u8 = 1;
/// Exit status when at least one extension failed.
const PARTIAL_FAILURE: u8 = 2;

/// The command-line interface for vsxrelay.
#[derive(Debug, Parser)]
#[command(name = "vsxr")]
#[command(version)]
#[command(disable_help_flag = true)]
#[command(styles = s::get_clap_styles())]
#[command(
    help_template = "{bin} {version}\n\n{about-with-newline}{usage-heading} {usage}\n\n{all-args}{after-help}"
)]
#[command(about = "Download, relay and install VS Code extensions")]
#[command(
    long_about = "vsxrelay fetches .vsix packages from the extension marketplace of an editor
channel, optionally relays them through a remote host over ssh, and installs
them with the editor's own --install-extension command.

Operations:
  download          Fetch packages into the output directory
  install           Install packages already in the output directory (or --extensions path)
  update            Fetch, install, then remove the packages unless --keep

Options are read from the command line, then the config file (-c, ./.vsxrrc,
~/.vsxrrc), then built-in defaults."
)]
#[command(
    after_help = "\x1b[1;32mExamples:\x1b[0m\n  \x1b[36mvsxr update -e ms-python.python,redhat.java\x1b[0m      \x1b[2m# Local fetch and install\x1b[0m\n  \x1b[36mvsxr update -e '*' -h ops@mirror -g bastion\x1b[0m      \x1b[2m# Refresh everything via a jump host\x1b[0m\n  \x1b[36mvsxr download -e rust-lang.rust-analyzer -s codium\x1b[0m \x1b[2m# Fetch from Open VSX\x1b[0m\n  \x1b[36mvsxr install -e ./packages -r -h build-box\x1b[0m        \x1b[2m# Install on a remote editor\x1b[0m"
)]
pub(crate) struct Cli {
    /// Operation: download, install or update
    operation: Option<String>,
    /// Config file (key=value lines, or TOML when named *.toml)
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Local directory for downloaded packages
    #[arg(short = 'o', long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
    /// Extension ids (comma or semicolon separated), a directory or .vsix file, or '*'
    #[arg(short = 'e', long, value_name = "EXTENSIONS")]
    extensions: Option<String>,
    /// Remote host; accepts [USER@]HOST[:PORT]
    #[arg(short = 'h', long, value_name = "HOST")]
    ssh_host: Option<String>,
    /// Remote ssh port
    #[arg(short = 'p', long, value_name = "PORT", value_parser = clap::value_parser!(u16).range(1..))]
    ssh_port: Option<u16>,
    /// Remote ssh user
    #[arg(short = 'u', long, value_name = "USER")]
    ssh_user: Option<String>,
    /// Jump host to reach the remote host through; accepts [USER@]HOST[:PORT]
    #[arg(short = 'g', long, value_name = "GATEWAY")]
    ssh_gateway: Option<String>,
    /// Keep downloaded packages after installing them
    #[arg(short = 'k', long, overrides_with = "no_keep")]
    keep: bool,
    /// Remove packages after installing them, even if the config file keeps them
    #[arg(long, overrides_with = "keep")]
    no_keep: bool,
    /// Report what would be done without doing it
    #[arg(short = 'n', long, overrides_with = "no_dry_run")]
    dry_run: bool,
    /// Do the work even if the config file asks for a dry run
    #[arg(long, overrides_with = "dry_run")]
    no_dry_run: bool,
    /// Channel whose marketplace packages are fetched from
    #[arg(short = 's', long, value_name = "EDITOR")]
    source_editor: Option<EditorChannel>,
    /// Channel whose editor installs the packages
    #[arg(short = 'd', long, value_name = "EDITOR")]
    dest_editor: Option<EditorChannel>,
    /// Print debug diagnostics and every step of each item
    #[arg(short = 'v', long, conflicts_with = "quiet")]
    verbose: bool,
    /// Only log errors
    #[arg(short = 'q', long)]
    quiet: bool,
    /// Install on the remote host instead of this machine
    #[arg(short = 'r', long, overrides_with = "no_remote_install")]
    remote_install: bool,
    /// Install on this machine even if the config file says remote
    #[arg(long, overrides_with = "remote_install")]
    no_remote_install: bool,
    /// Staging directory on the remote host
    #[arg(long, value_name = "DIR")]
    remote_dir: Option<String>,
    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    /// The command line as a config layer. Flags that were not given stay unset.
    fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            output_dir: self.output_dir.clone(),
            extensions: self.extensions.clone().map(ExtensionsValue::One),
            ssh_host: self.ssh_host.clone(),
            ssh_port: self.ssh_port,
            ssh_user: self.ssh_user.clone(),
            ssh_gateway: self.ssh_gateway.clone(),
            keep: switch(self.keep, self.no_keep),
            dry_run: switch(self.dry_run, self.no_dry_run),
            verbose: self.verbose.then_some(true),
            quiet: self.quiet.then_some(true),
            source_editor: self.source_editor,
            dest_editor: self.dest_editor,
            remote_install: switch(self.remote_install, self.no_remote_install),
            remote_dir: self.remote_dir.clone(),
        }
    }
}

/// A flag and its `--no-` form; neither given leaves the option unset.
fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

/// 0 when every extension succeeded, 2 when some failed.
fn exit_status(summary: &RunSummary) -> u8 {
    if summary.is_success() {
        0
    } else {
        PARTIAL_FAILURE
    }
}

/// Status for a command line clap refused; `None` for help and version
/// requests, which clap answers itself.
fn usage_status(error: &clap::Error) -> Option<u8> {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => None,
        _ => Some(FATAL),
    }
}

fn main() -> Result<ExitCode> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match usage_status(&e) {
            None => e.exit(),
            Some(status) => {
                let _ = e.print();
                return Ok(ExitCode::from(status));
            }
        },
    };

    let file = load_config_file(cli.config.as_deref()).context("unable to load config")?;
    let config = resolve(cli.operation.as_deref(), cli.layer(), file)
        .context("invalid configuration")?;

    let level = if config.verbose {
        tracing::Level::DEBUG
    } else if config.quiet {
        tracing::Level::ERROR
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();
    debug!("parsed cli arguments: {:?}", cli);
    debug!("effective configuration: {:?}", config);

    let summary = execute(&config)?;
    summary::print(&summary, config.verbose);
    Ok(ExitCode::from(exit_status(&summary)))
}

/// Wires the collaborators for the configured topology and runs the operation.
fn execute(config: &EffectiveConfig) -> Result<RunSummary> {
    let topology = config.topology();
    let session: Option<Box<dyn RemoteSession>> = match topology {
        Topology::Local => None,
        _ if config.dry_run => Some(Box::new(OfflineSession::new(config.endpoint.clone()))),
        _ => Some(Box::new(
            SshSession::connect(config.endpoint.clone(), config.gateway.clone())
                .with_context(|| format!("{} requires a remote session", config.operation))?,
        )),
    };
    let session: Option<&dyn RemoteSession> = session.as_deref().map(|s| s as &dyn RemoteSession);

    let http = HttpTransport::new(&config.output_dir);
    let curl = session.map(|session| CurlTransport::new(session, config.remote_dir.clone()));
    let remote_runner = session.map(|session| RemoteRunner::new(session));

    let transport: &dyn Transport = match (topology, &curl) {
        (Topology::Pull, Some(curl)) => curl,
        _ => &http,
    };
    let runner: &dyn CommandRunner = match (topology, &remote_runner) {
        (Topology::Push, Some(runner)) => runner,
        _ => &LocalRunner,
    };

    let orchestrator = Orchestrator::new(
        config,
        ArtifactFetcher::new(config.source_editor, transport),
        Installer::new(config.dest_editor, runner),
        session,
    );
    orchestrator
        .run()
        .with_context(|| format!("{} aborted", config.operation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use vsxrelay_core::{Error, ExtensionRef, ItemReport, Operation};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("vsxr").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn absent_flags_leave_layer_unset() {
        let layer = parse(&["update", "-e", "a.b"]).layer();
        assert_eq!(layer.extensions, Some(ExtensionsValue::One("a.b".into())));
        assert_eq!(layer.keep, None);
        assert_eq!(layer.ssh_port, None);
        assert_eq!(layer.dest_editor, None);
    }

    #[test]
    fn short_flags_map_to_layer() {
        let cli = parse(&[
            "update", "-e", "a.b", "-h", "gateway", "-p", "2200", "-u", "ops", "-k", "-n", "-s",
            "codium", "-d", "insiders", "-v", "-r", "--remote-dir", "/srv/stage",
        ]);
        let layer = cli.layer();
        assert_eq!(layer.ssh_host.as_deref(), Some("gateway"));
        assert_eq!(layer.ssh_port, Some(2200));
        assert_eq!(layer.ssh_user.as_deref(), Some("ops"));
        assert_eq!(layer.keep, Some(true));
        assert_eq!(layer.dry_run, Some(true));
        assert_eq!(layer.verbose, Some(true));
        assert_eq!(layer.remote_install, Some(true));
        assert_eq!(layer.source_editor, Some(EditorChannel::Codium));
        assert_eq!(layer.dest_editor, Some(EditorChannel::Insiders));
        assert_eq!(layer.remote_dir.as_deref(), Some("/srv/stage"));
    }

    fn usage_error(args: &[&str]) -> clap::Error {
        Cli::try_parse_from(std::iter::once("vsxr").chain(args.iter().copied()))
            .expect_err("must be refused")
    }

    #[test]
    fn bad_values_are_fatal_not_partial_failures() {
        for args in [
            &["update", "-e", "a.b", "-d", "atom"][..],
            &["update", "-e", "a.b", "-p", "notaport"],
            &["update", "-e", "a.b", "-p", "0"],
            &["update", "-e", "a.b", "-v", "-q"],
        ] {
            assert_eq!(usage_status(&usage_error(args)), Some(FATAL), "{args:?}");
        }
        assert_eq!(usage_status(&usage_error(&["--help"])), None);
        assert_eq!(usage_status(&usage_error(&["-V"])), None);
    }

    #[test]
    fn exit_status_separates_success_from_partial_failure() {
        let mut summary = RunSummary::new(Operation::Update, false);
        summary.items.push(ItemReport::new(ExtensionRef::new("a", "b")));
        assert_eq!(exit_status(&summary), 0);

        let mut failed = ItemReport::new(ExtensionRef::new("c", "d"));
        failed.fail(Error::Download {
            extension: "c.d".into(),
            reason: "HTTP 503".into(),
        });
        summary.items.push(failed);
        assert_eq!(exit_status(&summary), PARTIAL_FAILURE);
        assert_ne!(FATAL, PARTIAL_FAILURE);
    }

    #[test]
    fn negations_override_config_file() {
        let layer = parse(&["update", "-e", "a.b", "--no-keep", "--no-remote-install"]).layer();
        assert_eq!(layer.keep, Some(false));
        assert_eq!(layer.remote_install, Some(false));
        assert_eq!(layer.dry_run, None);

        // The last of a flag and its negation wins.
        let layer = parse(&["update", "-e", "a.b", "--no-keep", "-k"]).layer();
        assert_eq!(layer.keep, Some(true));

        let file = ConfigLayer {
            keep: Some(true),
            ..Default::default()
        };
        let cli = parse(&["update", "-e", "a.b", "--no-keep"]);
        let config = resolve(cli.operation.as_deref(), cli.layer(), Some(file)).unwrap();
        assert!(!config.keep);
    }

    #[test]
    fn gateway_and_quiet_flags() {
        let cli = parse(&["update", "-e", "a.b", "-h", "ops@box:2022", "-g", "bastion", "-q"]);
        let layer = cli.layer();
        assert_eq!(layer.ssh_gateway.as_deref(), Some("bastion"));
        assert_eq!(layer.quiet, Some(true));

        let config = resolve(cli.operation.as_deref(), layer, None).unwrap();
        assert!(config.quiet);
        assert!(!config.verbose);
        let gateway = config.gateway.expect("gateway");
        assert_eq!(gateway.jump_spec(), "ops@bastion:2022");
    }

    #[test]
    fn cli_port_beats_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vsxr.conf");
        std::fs::write(&path, "ssh-port=2222\nextensions=[a.b,c.d]\n").unwrap();

        let cli = parse(&["update", "-c", path.to_str().unwrap(), "-p", "2200"]);
        let file = load_config_file(cli.config.as_deref()).unwrap();
        let config = resolve(cli.operation.as_deref(), cli.layer(), file.clone()).unwrap();
        assert_eq!(config.endpoint.port, 2200);

        let cli = parse(&["update", "-c", path.to_str().unwrap()]);
        let config = resolve(cli.operation.as_deref(), cli.layer(), file).unwrap();
        assert_eq!(config.endpoint.port, 2222);
        assert_eq!(
            config.extensions,
            ExtensionsValue::List(vec!["a.b".into(), "c.d".into()])
        );
    }

    #[test]
    fn local_dry_run_executes_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let cli = parse(&[
            "update",
            "-n",
            "-e",
            "a.b,c.d",
            "-o",
            out.to_str().unwrap(),
        ]);
        let config = resolve(cli.operation.as_deref(), cli.layer(), None).unwrap();

        let summary = execute(&config).unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.items.len(), 2);
        assert!(!out.exists());
    }

    #[test]
    fn remote_dry_run_never_connects() {
        let cli = parse(&["download", "-n", "-e", "a.b", "-h", "ops@unreachable.invalid:2022"]);
        let config = resolve(cli.operation.as_deref(), cli.layer(), None).unwrap();
        assert_eq!(config.topology(), Topology::Pull);

        let summary = execute(&config).unwrap();
        assert_eq!(summary.items[0].stage, vsxrelay_core::Stage::Transferred);
    }
}
