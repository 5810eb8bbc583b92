//! Layered configuration: built-in defaults, an optional config file and the
//! command line are each a [`ConfigLayer`]; the effective value of an option is
//! taken from the highest layer that sets it.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use crate::channel::EditorChannel;
use crate::constants::{
    CONFIG_FILE, DEFAULT_SSH_HOST, DEFAULT_SSH_PORT, DEFAULT_SSH_USER, LOCAL_HOSTS, PROG,
    USER_CONFIG_FILE,
};
use crate::error::ConfigError;
use crate::operation::Operation;
use crate::session::RemoteEndpoint;

/// Raw `--extensions` value: a single string (identifier, delimited list or
/// path) or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExtensionsValue {
    One(String),
    List(Vec<String>),
}

/// One source of option values. `None` means "not set by this source".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigLayer {
    pub output_dir: Option<PathBuf>,
    pub extensions: Option<ExtensionsValue>,
    pub ssh_host: Option<String>,
    pub ssh_port: Option<u16>,
    pub ssh_user: Option<String>,
    /// Jump host, `[user@]host[:port]`; an empty value means none.
    pub ssh_gateway: Option<String>,
    pub keep: Option<bool>,
    pub dry_run: Option<bool>,
    pub verbose: Option<bool>,
    pub quiet: Option<bool>,
    pub source_editor: Option<EditorChannel>,
    pub dest_editor: Option<EditorChannel>,
    pub remote_install: Option<bool>,
    pub remote_dir: Option<String>,
}

impl ConfigLayer {
    /// Built-in defaults. `extensions` has none; `remote-dir` depends on the
    /// resolved user and is filled in by [`resolve`].
    pub fn defaults() -> Self {
        let user = login_name();
        Self {
            output_dir: Some(std::env::temp_dir().join(format!("{PROG}-{user}"))),
            extensions: None,
            ssh_host: Some(DEFAULT_SSH_HOST.to_string()),
            ssh_port: Some(DEFAULT_SSH_PORT),
            ssh_user: Some(user),
            ssh_gateway: None,
            keep: Some(false),
            dry_run: Some(false),
            verbose: Some(false),
            quiet: Some(false),
            source_editor: Some(EditorChannel::default()),
            dest_editor: Some(EditorChannel::default()),
            remote_install: Some(false),
            remote_dir: None,
        }
    }

    /// Fills every option this layer leaves unset from `lower`.
    /// Whole options are replaced, lists are never merged.
    pub fn over(self, lower: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            output_dir: self.output_dir.or(lower.output_dir),
            extensions: self.extensions.or(lower.extensions),
            ssh_host: self.ssh_host.or(lower.ssh_host),
            ssh_port: self.ssh_port.or(lower.ssh_port),
            ssh_user: self.ssh_user.or(lower.ssh_user),
            ssh_gateway: self.ssh_gateway.or(lower.ssh_gateway),
            keep: self.keep.or(lower.keep),
            dry_run: self.dry_run.or(lower.dry_run),
            verbose: self.verbose.or(lower.verbose),
            quiet: self.quiet.or(lower.quiet),
            source_editor: self.source_editor.or(lower.source_editor),
            dest_editor: self.dest_editor.or(lower.dest_editor),
            remote_install: self.remote_install.or(lower.remote_install),
            remote_dir: self.remote_dir.or(lower.remote_dir),
        }
    }

    /// Checks the values of this layer and completes the ones implied by
    /// others: a `[user@]host[:port]` connection string in `ssh-host` fills
    /// `ssh-user`/`ssh-port` when they are unset, and turning on one of
    /// `verbose`/`quiet` turns the other off.
    pub fn normalized(mut self) -> Result<Self, ConfigError> {
        if self.ssh_port == Some(0) {
            return Err(invalid("ssh-port", "0", PORT_EXPECTED));
        }
        match (self.verbose, self.quiet) {
            (Some(true), Some(true)) => {
                return Err(invalid("quiet", "true", "cannot be combined with verbose"))
            }
            (Some(true), None) => self.quiet = Some(false),
            (None, Some(true)) => self.verbose = Some(false),
            _ => {}
        }

        let Some(raw) = self.ssh_host.take() else {
            return Ok(self);
        };
        let (user, host, port) = split_connection("ssh-host", &raw)?;
        if let Some(user) = user {
            self.ssh_user.get_or_insert_with(|| user.to_string());
        }
        if let Some(port) = port {
            self.ssh_port.get_or_insert(port);
        }
        self.ssh_host = Some(host.to_string());
        Ok(self)
    }

    /// Applies one `key=value` entry.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<(), ConfigError> {
        let key = key.trim().to_ascii_lowercase().replace('_', "-");
        let value = unquote(raw.trim());

        match key.as_str() {
            "output-dir" => self.output_dir = Some(PathBuf::from(value)),
            "extensions" => self.extensions = Some(parse_extensions(value)),
            "ssh-host" => self.ssh_host = Some(value.to_string()),
            "ssh-port" => {
                self.ssh_port = Some(parse_port(value).map_err(|r| invalid(&key, value, &r))?)
            }
            "ssh-user" => self.ssh_user = Some(value.to_string()),
            "ssh-gateway" => self.ssh_gateway = Some(value.to_string()),
            "keep" => self.keep = Some(parse_bool(&key, value)?),
            "dry-run" => self.dry_run = Some(parse_bool(&key, value)?),
            "verbose" => self.verbose = Some(parse_bool(&key, value)?),
            "quiet" => self.quiet = Some(parse_bool(&key, value)?),
            "remote-install" => self.remote_install = Some(parse_bool(&key, value)?),
            "source-editor" => self.source_editor = Some(parse_editor(&key, value)?),
            "dest-editor" => self.dest_editor = Some(parse_editor(&key, value)?),
            "remote-dir" => self.remote_dir = Some(value.to_string()),
            _ => return Err(ConfigError::UnknownKey(key)),
        }
        Ok(())
    }

    /// Parses the `key=value` config format.
    pub fn parse_key_values(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut layer = Self::default();

        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') && !line.contains('=') {
                continue;
            }

            let malformed = |reason: String| ConfigError::Malformed {
                path: path.to_path_buf(),
                line: idx + 1,
                reason,
            };
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| malformed("expected key=value".to_string()))?;
            if key.trim().is_empty() {
                return Err(malformed("empty key".to_string()));
            }
            layer
                .set(key, value)
                .map_err(|e| malformed(e.to_string()))?;
        }

        Ok(layer)
    }

    /// Reads a config file; `.toml` files are TOML, anything else is `key=value`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let layer = if is_toml {
            toml::from_str::<Self>(&text).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            Self::parse_key_values(&text, path)?
        };
        debug!("loaded config file {}", path.display());
        Ok(layer)
    }
}

/// Where each step of a run happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    /// Fetch and install on this machine.
    Local,
    /// The remote host fetches; packages are copied back and installed here.
    Pull,
    /// Fetch here; packages are copied to the remote host and installed there.
    Push,
}

impl Topology {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Pull => "pull",
            Self::Push => "push",
        }
    }

    pub fn is_remote(self) -> bool {
        self != Self::Local
    }
}

/// Resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub operation: Operation,
    pub output_dir: PathBuf,
    pub extensions: ExtensionsValue,
    pub endpoint: RemoteEndpoint,
    /// Jump host the ssh connection to `endpoint` goes through.
    pub gateway: Option<RemoteEndpoint>,
    pub keep: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub quiet: bool,
    pub source_editor: EditorChannel,
    pub dest_editor: EditorChannel,
    pub remote_install: bool,
    pub remote_dir: String,
}

impl EffectiveConfig {
    pub fn topology(&self) -> Topology {
        if LOCAL_HOSTS.contains(&self.endpoint.host.as_str()) {
            Topology::Local
        } else if self.remote_install {
            Topology::Push
        } else {
            Topology::Pull
        }
    }
}

/// Merges the command line over the config file over the built-in defaults.
///
/// # Errors
/// `MissingOperation`/`UnknownOperation` for a bad positional operation,
/// `MissingExtensions` when no layer names extensions, and any value error
/// raised while normalizing a layer.
pub fn resolve(
    operation: Option<&str>,
    cli: ConfigLayer,
    file: Option<ConfigLayer>,
) -> Result<EffectiveConfig, ConfigError> {
    let operation = operation
        .ok_or(ConfigError::MissingOperation)?
        .parse::<Operation>()?;

    let file = file.unwrap_or_default().normalized()?;
    let merged = cli
        .normalized()?
        .over(file)
        .over(ConfigLayer::defaults());

    let extensions = merged.extensions.ok_or(ConfigError::MissingExtensions)?;
    let endpoint = RemoteEndpoint {
        host: merged.ssh_host.unwrap_or_else(|| DEFAULT_SSH_HOST.to_string()),
        port: merged.ssh_port.unwrap_or(DEFAULT_SSH_PORT),
        user: merged.ssh_user.unwrap_or_else(login_name),
    };
    let gateway = merged
        .ssh_gateway
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| gateway_endpoint(raw, &endpoint))
        .transpose()?;
    let remote_dir = merged
        .remote_dir
        .unwrap_or_else(|| format!("/tmp/{PROG}-{}", endpoint.user));

    Ok(EffectiveConfig {
        operation,
        output_dir: expand_home(merged.output_dir.unwrap_or_else(std::env::temp_dir)),
        extensions,
        endpoint,
        gateway,
        keep: merged.keep.unwrap_or_default(),
        dry_run: merged.dry_run.unwrap_or_default(),
        verbose: merged.verbose.unwrap_or_default(),
        quiet: merged.quiet.unwrap_or_default(),
        source_editor: merged.source_editor.unwrap_or_default(),
        dest_editor: merged.dest_editor.unwrap_or_default(),
        remote_install: merged.remote_install.unwrap_or_default(),
        remote_dir,
    })
}

/// The gateway takes the user and port of `host` unless it names its own.
fn gateway_endpoint(raw: &str, host: &RemoteEndpoint) -> Result<RemoteEndpoint, ConfigError> {
    let (user, gateway, port) = split_connection("ssh-gateway", raw.trim())?;
    Ok(RemoteEndpoint {
        host: gateway.to_string(),
        port: port.unwrap_or(host.port),
        user: user.map_or_else(|| host.user.clone(), ToOwned::to_owned),
    })
}

/// Splits `[user@]host[:port]`. An empty user counts as absent.
fn split_connection<'a>(
    key: &str,
    raw: &'a str,
) -> Result<(Option<&'a str>, &'a str, Option<u16>), ConfigError> {
    let (user, rest) = match raw.rsplit_once('@') {
        Some((user, rest)) => (Some(user).filter(|u| !u.is_empty()), rest),
        None => (None, raw),
    };
    // More than one colon is a bare IPv6 address, not host:port.
    let (host, port) = match rest.split_once(':') {
        Some((host, port)) if !port.contains(':') => (host, Some(port)),
        _ => (rest, None),
    };

    if host.is_empty() {
        return Err(invalid(key, raw, "host name is empty"));
    }
    let port = port
        .map(parse_port)
        .transpose()
        .map_err(|reason| invalid(key, raw, &reason))?;
    Ok((user, host, port))
}

/// Loads the explicit config file, or the first existing well-known one.
///
/// # Errors
/// Only an explicit path may fail to read; missing discovered files are skipped.
pub fn load_config_file(explicit: Option<&Path>) -> Result<Option<ConfigLayer>, ConfigError> {
    if let Some(path) = explicit {
        return ConfigLayer::load(path).map(Some);
    }
    match discover_config_file() {
        Some(path) => ConfigLayer::load(&path).map(Some),
        None => Ok(None),
    }
}

/// Well-known config file locations, most specific first.
pub fn config_file_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(CONFIG_FILE)];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(CONFIG_FILE));
    }
    if let Some(config) = dirs::config_dir() {
        candidates.push(config.join(PROG).join(USER_CONFIG_FILE));
    }
    candidates
}

fn discover_config_file() -> Option<PathBuf> {
    config_file_candidates().into_iter().find(|p| p.is_file())
}

/// The login name of the current user.
pub fn login_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_SSH_USER.to_string())
}

fn expand_home(path: PathBuf) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path,
    }
}

fn parse_extensions(value: &str) -> ExtensionsValue {
    match value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        Some(inner) => ExtensionsValue::List(
            inner
                .split(',')
                .map(|item| unquote(item.trim()).to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        ),
        None => ExtensionsValue::One(value.to_string()),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(key, value, "expected true or false")),
    }
}

const PORT_EXPECTED: &str = "expected a port number between 1 and 65535";

fn parse_port(value: &str) -> Result<u16, String> {
    match u16::from_str(value.trim()) {
        Ok(0) | Err(_) => Err(PORT_EXPECTED.to_string()),
        Ok(port) => Ok(port),
    }
}

fn parse_editor(key: &str, value: &str) -> Result<EditorChannel, ConfigError> {
    EditorChannel::from_str(value).map_err(|reason| invalid(key, value, &reason))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
