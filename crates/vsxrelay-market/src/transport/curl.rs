use tracing::{debug, warn};
use vsxrelay_core::session::{remote_join, shell_line};
use vsxrelay_core::{ArtifactLocation, ExecOutput, RemoteSession};

use super::{Reply, Saved, Transport, TransportError};

/// Downloads with `curl` on the remote host into a remote staging directory.
#[derive(Debug, Clone)]
pub struct CurlTransport<'a> {
    session: &'a dyn RemoteSession,
    dir: String,
}

impl<'a> CurlTransport<'a> {
    pub fn new(session: &'a dyn RemoteSession, dir: impl Into<String>) -> Self {
        Self {
            session,
            dir: dir.into(),
        }
    }

    fn curl(&self, args: &[&str]) -> Result<ExecOutput, TransportError> {
        let argv: Vec<String> = ["curl", "-sSL", "--compressed"]
            .iter()
            .chain(args)
            .map(|arg| arg.to_string())
            .collect();
        let line = shell_line(&argv)?;
        Ok(self.session.execute(&line)?)
    }

    fn discard(&self, path: &str) {
        let removed = shell_line(&["rm".to_string(), "-f".to_string(), path.to_string()])
            .and_then(|line| self.session.execute(&line));
        if let Err(e) = removed {
            warn!("failed to remove {} on {}: {}", path, self.location(), e);
        }
    }
}

impl Transport for CurlTransport<'_> {
    fn location(&self) -> String {
        self.session.endpoint().to_string()
    }

    fn destination(&self, file_name: &str) -> ArtifactLocation {
        ArtifactLocation::Remote(remote_join(&self.dir, file_name))
    }

    fn get_text(&self, url: &str) -> Result<Reply, TransportError> {
        let output = self.curl(&["-w", "\\n%{http_code}", url])?;
        if !output.success() {
            return Err(TransportError::Request {
                url: url.to_string(),
                reason: output.diagnostic(),
            });
        }

        let (body, status) = output
            .stdout
            .trim_end()
            .rsplit_once('\n')
            .unwrap_or(("", output.stdout.trim()));
        Ok(Reply {
            status: parse_status(url, status)?,
            body: body.to_string(),
        })
    }

    fn save(&self, url: &str, file_name: &str) -> Result<Saved, TransportError> {
        let target = remote_join(&self.dir, file_name);
        debug!("curl {} -> {} on {}", url, target, self.location());

        let output = self.curl(&["-o", &target, "-w", "%{http_code}", url])?;
        if !output.success() {
            self.discard(&target);
            return Err(TransportError::Request {
                url: url.to_string(),
                reason: output.diagnostic(),
            });
        }

        let status = parse_status(url, output.stdout.trim())?;
        if !(200..300).contains(&status) {
            self.discard(&target);
            return Ok(Saved::Rejected(status));
        }
        Ok(Saved::Written(ArtifactLocation::Remote(target)))
    }
}

fn parse_status(url: &str, raw: &str) -> Result<u16, TransportError> {
    raw.trim().parse().map_err(|_| TransportError::Request {
        url: url.to_string(),
        reason: format!("curl reported an unreadable HTTP status '{raw}'"),
    })
}
