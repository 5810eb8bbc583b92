use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, instrument};
use which::which;

use crate::constants::PROG;
use crate::error::{Error, Result};
use crate::session::{ExecOutput, RemoteEndpoint, RemoteSession};

/// ssh exits with this status when the connection itself failed.
const SSH_FAILURE: i32 = 255;

/// A [`RemoteSession`] backed by the platform OpenSSH client.
///
/// Authentication is left entirely to ssh (agent, keys, `~/.ssh/config`,
/// interactive prompts). All commands and copies share one control socket so
/// the user authenticates at most once per run.
#[derive(Debug)]
pub struct SshSession {
    endpoint: RemoteEndpoint,
    gateway: Option<RemoteEndpoint>,
    ssh: PathBuf,
    scp: PathBuf,
    control_path: PathBuf,
}

impl SshSession {
    /// Opens the shared connection, through `gateway` when given, and checks
    /// that the host answers.
    ///
    /// # Errors
    /// `Connection` when no ssh client is installed or the host is unreachable
    /// or refuses authentication.
    #[instrument]
    pub fn connect(endpoint: RemoteEndpoint, gateway: Option<RemoteEndpoint>) -> Result<Self> {
        let connection_error = |reason: String| Error::Connection {
            endpoint: endpoint.to_string(),
            reason,
        };

        let ssh = which("ssh")
            .map_err(|e| connection_error(format!("no ssh client found in PATH: {e}")))?;
        let scp = which("scp")
            .map_err(|e| connection_error(format!("no scp client found in PATH: {e}")))?;

        let session = Self {
            endpoint: endpoint.clone(),
            gateway,
            ssh,
            scp,
            control_path: std::env::temp_dir().join(format!("{PROG}-%C")),
        };

        let answer = session
            .ssh_command()
            .arg("true")
            .output()
            .map_err(|e| connection_error(format!("failed to start ssh: {e}")))?;
        if !answer.status.success() {
            return Err(connection_error(ExecOutput::from_output(answer).diagnostic()));
        }

        info!("connected to {}", session.endpoint);
        Ok(session)
    }

    /// Options shared by ssh and scp: the control socket and the jump host.
    fn connection_options(&self) -> Vec<String> {
        let mut options = vec![
            "-o".to_string(),
            "ControlMaster=auto".to_string(),
            "-o".to_string(),
            format!("ControlPath={}", self.control_path.display()),
            "-o".to_string(),
            "ControlPersist=60".to_string(),
        ];
        if let Some(gateway) = &self.gateway {
            options.push("-o".to_string());
            options.push(format!("ProxyJump={}", gateway.jump_spec()));
        }
        options
    }

    fn ssh_command(&self) -> Command {
        let mut command = Command::new(&self.ssh);
        command
            .arg("-p")
            .arg(self.endpoint.port.to_string())
            .args(self.connection_options())
            .arg(self.endpoint.destination())
            .arg("--");
        command
    }

    /// Asks the control master to exit. The port takes part in the socket
    /// name, so it must match the one the master was opened with.
    fn exit_command(&self) -> Command {
        let mut command = Command::new(&self.ssh);
        command
            .arg("-p")
            .arg(self.endpoint.port.to_string())
            .args(self.connection_options())
            .arg("-O")
            .arg("exit")
            .arg(self.endpoint.destination());
        command
    }

    fn scp_command(&self) -> Command {
        let mut command = Command::new(&self.scp);
        command
            .arg("-q")
            .arg("-P")
            .arg(self.endpoint.port.to_string())
            .args(self.connection_options());
        command
    }

    fn remote_spec(&self, path: &str) -> String {
        format!("{}:{}", self.endpoint.destination(), path)
    }

    fn copy(&self, from: &str, to: &str, path_for_errors: &str) -> Result<()> {
        let transfer_error = |reason: String| Error::Transfer {
            path: path_for_errors.to_string(),
            reason,
        };

        debug!("scp {} -> {}", from, to);
        let output = self
            .scp_command()
            .arg(from)
            .arg(to)
            .output()
            .map_err(|e| transfer_error(format!("failed to start scp: {e}")))?;
        if !output.status.success() {
            return Err(transfer_error(ExecOutput::from_output(output).diagnostic()));
        }
        Ok(())
    }
}

impl RemoteSession for SshSession {
    fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    fn execute(&self, command: &str) -> Result<ExecOutput> {
        debug!("run on {}: {}", self.endpoint, command);
        let output = self
            .ssh_command()
            .arg(command)
            .output()
            .map_err(|e| Error::RemoteExecution {
                command: command.to_string(),
                reason: format!("failed to start ssh: {e}"),
            })?;

        let output = ExecOutput::from_output(output);
        if output.code == Some(SSH_FAILURE) {
            return Err(Error::RemoteExecution {
                command: command.to_string(),
                reason: output.diagnostic(),
            });
        }
        Ok(output)
    }

    fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let from = local.display().to_string();
        self.copy(&from, &self.remote_spec(remote), &from)
    }

    fn download(&self, remote: &str, local: &Path) -> Result<()> {
        self.copy(
            &self.remote_spec(remote),
            &local.display().to_string(),
            remote,
        )
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        let closed = self.exit_command().output();
        if let Err(e) = closed {
            debug!("failed to close ssh control master: {e}");
        }
    }
}
