use std::fmt::{Display, Formatter};
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::{Error, Result};

pub mod ssh;

/// A reachable remote shell/copy target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteEndpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
}

impl RemoteEndpoint {
    /// `user@host`, as understood by ssh and scp.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// `user@host:port` as accepted by `ProxyJump`; IPv6 hosts are bracketed.
    pub fn jump_spec(&self) -> String {
        if self.host.contains(':') {
            format!("{}@[{}]:{}", self.user, self.host, self.port)
        } else {
            format!("{}@{}:{}", self.user, self.host, self.port)
        }
    }
}

impl Display for RemoteEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Best diagnostic text for an error message.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        let text = if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        };
        match self.code {
            Some(code) if text.is_empty() => format!("exit status {code}"),
            Some(code) => format!("exit status {code}: {text}"),
            None if text.is_empty() => "terminated by signal".to_string(),
            None => format!("terminated by signal: {text}"),
        }
    }

    pub(crate) fn from_output(output: std::process::Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Runs a program with arguments somewhere and reports how it went.
pub trait CommandRunner: std::fmt::Debug {
    /// Blocks until `argv` finishes. Errors only when it could not be run at
    /// all; a non-zero exit is reported through [`ExecOutput`].
    fn run(&self, argv: &[String]) -> Result<ExecOutput>;

    /// Human-readable place the commands run, for log lines.
    fn location(&self) -> String;
}

/// The two capabilities needed from a remote host.
pub trait RemoteSession: std::fmt::Debug {
    fn endpoint(&self) -> &RemoteEndpoint;

    /// Runs a shell command line on the remote host.
    ///
    /// # Errors
    /// `RemoteExecution` when the command could not be delivered; a non-zero
    /// remote exit is reported through [`ExecOutput`].
    fn execute(&self, command: &str) -> Result<ExecOutput>;

    /// Copies a local file to `remote`.
    fn upload(&self, local: &Path, remote: &str) -> Result<()>;

    /// Copies `remote` to a local file.
    fn download(&self, remote: &str, local: &Path) -> Result<()>;
}

/// Quotes `argv` into a single POSIX shell command line.
pub fn shell_line(argv: &[String]) -> Result<String> {
    shlex::try_join(argv.iter().map(String::as_str)).map_err(|e| Error::RemoteExecution {
        command: argv.join(" "),
        reason: e.to_string(),
    })
}

/// Joins a remote directory and a file name with `/`.
pub fn remote_join(dir: &str, file_name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), file_name)
}

/// Runs commands as local child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalRunner;

impl CommandRunner for LocalRunner {
    fn run(&self, argv: &[String]) -> Result<ExecOutput> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            Error::io(
                "empty command argv",
                std::io::Error::from(std::io::ErrorKind::InvalidInput),
            )
        })?;

        debug!("run locally: {}", argv.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| Error::io(format!("failed to start '{program}'"), e))?;
        Ok(ExecOutput::from_output(output))
    }

    fn location(&self) -> String {
        "localhost".to_string()
    }
}

/// Runs commands on the remote host through a [`RemoteSession`].
#[derive(Debug, Clone, Copy)]
pub struct RemoteRunner<'a> {
    session: &'a dyn RemoteSession,
}

impl<'a> RemoteRunner<'a> {
    pub fn new(session: &'a dyn RemoteSession) -> Self {
        Self { session }
    }
}

impl CommandRunner for RemoteRunner<'_> {
    fn run(&self, argv: &[String]) -> Result<ExecOutput> {
        let line = shell_line(argv)?;
        self.session.execute(&line)
    }

    fn location(&self) -> String {
        self.session.endpoint().to_string()
    }
}

/// A session that never connects. Stands in for the real one during dry
/// runs, where every remote step is only reported.
#[derive(Debug, Clone)]
pub struct OfflineSession {
    endpoint: RemoteEndpoint,
}

impl OfflineSession {
    pub fn new(endpoint: RemoteEndpoint) -> Self {
        Self { endpoint }
    }

    fn refuse(&self) -> Error {
        Error::Connection {
            endpoint: self.endpoint.to_string(),
            reason: "not connected during a dry run".to_string(),
        }
    }
}

impl RemoteSession for OfflineSession {
    fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    fn execute(&self, _command: &str) -> Result<ExecOutput> {
        Err(self.refuse())
    }

    fn upload(&self, _local: &Path, _remote: &str) -> Result<()> {
        Err(self.refuse())
    }

    fn download(&self, _remote: &str, _local: &Path) -> Result<()> {
        Err(self.refuse())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug)]
    struct RecordingSession {
        endpoint: RemoteEndpoint,
        commands: RefCell<Vec<String>>,
    }

    impl RemoteSession for RecordingSession {
        fn endpoint(&self) -> &RemoteEndpoint {
            &self.endpoint
        }

        fn execute(&self, command: &str) -> Result<ExecOutput> {
            self.commands.borrow_mut().push(command.to_string());
            Ok(ExecOutput {
                code: Some(0),
                ..Default::default()
            })
        }

        fn upload(&self, _local: &Path, _remote: &str) -> Result<()> {
            Ok(())
        }

        fn download(&self, _remote: &str, _local: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn remote_runner_quotes_arguments() {
        let session = RecordingSession {
            endpoint: RemoteEndpoint {
                host: "gateway".into(),
                port: 22,
                user: "ops".into(),
            },
            commands: RefCell::new(Vec::new()),
        };
        let runner = RemoteRunner::new(&session);
        let argv = vec![
            "code".to_string(),
            "--install-extension".to_string(),
            "/tmp/my dir/a.b.vsix".to_string(),
        ];
        assert!(runner.run(&argv).unwrap().success());
        let commands = session.commands.borrow();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].starts_with("code --install-extension "));
        assert_eq!(shlex::split(&commands[0]), Some(argv));
        assert_eq!(runner.location(), "ops@gateway:22");
    }

    #[test]
    fn diagnostic_prefers_stderr() {
        let out = ExecOutput {
            code: Some(1),
            stdout: "noise".into(),
            stderr: "bad vsix\n".into(),
        };
        assert_eq!(out.diagnostic(), "exit status 1: bad vsix");
        assert_eq!(
            ExecOutput {
                code: Some(3),
                ..Default::default()
            }
            .diagnostic(),
            "exit status 3"
        );
    }

    #[test]
    fn offline_session_refuses_everything() {
        let session = OfflineSession::new(RemoteEndpoint {
            host: "gateway".into(),
            port: 22,
            user: "ops".into(),
        });
        let err = session.execute("true").expect_err("offline");
        assert!(err.is_fatal());
        assert!(session.upload(Path::new("a.vsix"), "/tmp/a.vsix").is_err());
    }

    #[test]
    fn jump_spec_brackets_ipv6_hosts() {
        let mut endpoint = RemoteEndpoint {
            host: "bastion".into(),
            port: 22,
            user: "ops".into(),
        };
        assert_eq!(endpoint.jump_spec(), "ops@bastion:22");
        endpoint.host = "fd00::2".into();
        assert_eq!(endpoint.jump_spec(), "ops@[fd00::2]:22");
    }

    #[test]
    fn joins_remote_paths() {
        assert_eq!(remote_join("/tmp/vsxr/", "a.b.vsix"), "/tmp/vsxr/a.b.vsix");
    }

    #[cfg(unix)]
    #[test]
    fn local_runner_reports_exit_codes() {
        let runner = LocalRunner;
        let ok = runner
            .run(&["sh".to_string(), "-c".to_string(), "echo hi".to_string()])
            .unwrap();
        assert!(ok.success());
        assert_eq!(ok.stdout.trim(), "hi");

        let failed = runner
            .run(&["sh".to_string(), "-c".to_string(), "exit 4".to_string()])
            .unwrap();
        assert_eq!(failed.code, Some(4));

        assert!(runner.run(&["vsxr-no-such-binary".to_string()]).is_err());
    }
}
