use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;
use vsxrelay_core::ArtifactLocation;

use super::{Reply, Saved, Transport, TransportError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Downloads over HTTPS from this machine into a local directory.
#[derive(Debug)]
pub struct HttpTransport {
    agent: ureq::Agent,
    dir: PathBuf,
}

impl HttpTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .user_agent(concat!("vsxr/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Sends a GET. `Ok(Err(status))` is a non-success HTTP answer.
    fn get(&self, url: &str) -> Result<Result<ureq::Response, (u16, ureq::Response)>, TransportError> {
        debug!("GET {}", url);
        match self.agent.get(url).call() {
            Ok(response) => Ok(Ok(response)),
            Err(ureq::Error::Status(status, response)) => Ok(Err((status, response))),
            Err(ureq::Error::Transport(transport)) => Err(TransportError::Request {
                url: url.to_string(),
                reason: transport.to_string(),
            }),
        }
    }
}

impl Transport for HttpTransport {
    fn location(&self) -> String {
        "localhost".to_string()
    }

    fn destination(&self, file_name: &str) -> ArtifactLocation {
        ArtifactLocation::Local(self.dir.join(file_name))
    }

    fn get_text(&self, url: &str) -> Result<Reply, TransportError> {
        let (status, response) = match self.get(url)? {
            Ok(response) => (response.status(), response),
            Err(rejected) => rejected,
        };
        let body = response
            .into_string()
            .map_err(|e| TransportError::io(format!("failed to read response from {url}"), e))?;
        Ok(Reply { status, body })
    }

    fn save(&self, url: &str, file_name: &str) -> Result<Saved, TransportError> {
        let response = match self.get(url)? {
            Ok(response) => response,
            Err((status, _)) => return Ok(Saved::Rejected(status)),
        };

        fs::create_dir_all(&self.dir).map_err(|e| {
            TransportError::io(format!("failed to create '{}'", self.dir.display()), e)
        })?;
        let target = self.dir.join(file_name);
        let partial = self.dir.join(format!("{file_name}.part"));

        let written = write_body(response, &partial).and_then(|()| fs::rename(&partial, &target));
        if let Err(e) = written {
            let _ = fs::remove_file(&partial);
            return Err(TransportError::io(
                format!("failed to write '{}'", target.display()),
                e,
            ));
        }

        debug!("saved {} -> {}", url, target.display());
        Ok(Saved::Written(ArtifactLocation::Local(target)))
    }
}

fn write_body(response: ureq::Response, path: &Path) -> io::Result<()> {
    let mut file = File::create(path)?;
    io::copy(&mut response.into_reader(), &mut file)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;
    use tempfile::tempdir;

    /// Serves one canned HTTP response on a loopback port and returns its URL.
    fn serve_once(status_line: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 {
                if line == "\r\n" {
                    break;
                }
                line.clear();
            }
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .unwrap();
            stream.write_all(body).unwrap();
        });
        format!("http://{addr}/package.vsix")
    }

    #[test]
    fn saves_body_without_leaving_partial_file() {
        let dir = tempdir().unwrap();
        let url = serve_once("200 OK", b"PK\x03\x04vsix");
        let transport = HttpTransport::new(dir.path());

        let saved = transport.save(&url, "a.b.vsix").unwrap();
        let target = dir.path().join("a.b.vsix");
        assert_eq!(saved, Saved::Written(ArtifactLocation::Local(target.clone())));
        assert_eq!(fs::read(&target).unwrap(), b"PK\x03\x04vsix");
        assert!(!dir.path().join("a.b.vsix.part").exists());
    }

    #[test]
    fn not_found_is_rejected_and_writes_nothing() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let url = serve_once("404 Not Found", b"");
        let transport = HttpTransport::new(&out);

        assert_eq!(transport.save(&url, "a.b.vsix").unwrap(), Saved::Rejected(404));
        assert!(!out.exists());
    }

    #[test]
    fn text_reply_keeps_error_status() {
        let url = serve_once("404 Not Found", br#"{"error":"Extension not found: a.b"}"#);
        let transport = HttpTransport::new(std::env::temp_dir());
        let reply = transport.get_text(&url).unwrap();
        assert_eq!(reply.status, 404);
        assert!(!reply.is_success());
        assert!(reply.body.contains("not found"));
    }

    #[test]
    fn unreachable_host_is_request_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(std::env::temp_dir());
        let err = transport
            .get_text(&format!("http://{addr}/"))
            .expect_err("nothing listens there");
        assert!(matches!(err, TransportError::Request { .. }));
    }
}
