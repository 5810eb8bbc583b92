//! Constants used across the vsxrelay workspace.

/// Program name, used for config files and scratch paths.
pub const PROG: &str = "vsxr";

/// Config file looked up in the working and home directories.
pub const CONFIG_FILE: &str = ".vsxrrc";

/// Config file looked up under the user config directory (`<config>/vsxr/config`).
pub const USER_CONFIG_FILE: &str = "config";

/// Package file extension.
pub const VSIX_EXTENSION: &str = "vsix";

pub const DEFAULT_SSH_HOST: &str = "localhost";
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_SSH_USER: &str = "user";

/// Host names that never need a remote session.
pub const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1"];

pub const VS_MARKETPLACE_HOST_SUFFIX: &str = ".gallery.vsassets.io";
pub const OPEN_VSX_API_URL: &str = "https://open-vsx.org/api";

/// Value of `--extensions` selecting every installed extension.
pub const ALL_INSTALLED: &str = "*";
