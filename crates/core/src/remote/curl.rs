//! Blocking FTP client that drives the `curl` executable.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::{debug, info, instrument, warn};

use super::listing::parse_size_listing;
use super::{FetchContext, RemoteConnector, RemoteSession};
use crate::config::RemoteConfig;
use crate::errors::{RemoteError, TransferError};
use crate::inventory::SizeMap;

/// Everything outside the RFC 3986 unreserved set is escaped.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Interval between progress polls of a running download.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A transfer slower than this many bytes per second for the whole timeout
/// window is treated as stalled.
const STALL_BYTES_PER_SEC: &str = "1";

/// Opens [`CurlSession`]s on the configured server.
#[derive(Debug, Clone)]
pub struct CurlConnector {
    binary: String,
    host: String,
    user: String,
    password: String,
    timeout_secs: u64,
}

impl CurlConnector {
    pub fn new(config: &RemoteConfig) -> Self {
        let connector = Self {
            binary: config.curl_binary.clone(),
            host: config.host.clone(),
            user: config.user.clone(),
            password: config.password.clone().unwrap_or_default(),
            timeout_secs: config.timeout_secs,
        };
        debug!(host = %connector.host, user = %connector.user, "created CurlConnector");
        connector
    }
}

impl RemoteConnector for CurlConnector {
    #[instrument(skip(self), fields(host = %self.host))]
    fn connect(&self, remote_dir: &str) -> Result<Box<dyn RemoteSession>, RemoteError> {
        let mut session = CurlSession {
            binary: self.binary.clone(),
            credentials: credentials_config(&self.user, &self.password),
            timeout_secs: self.timeout_secs,
            base_url: directory_url(&self.host, remote_dir),
        };

        // Nothing stays open between curl calls, so a listing is the only
        // way to learn whether the server and the directory are reachable.
        let names = session.list_filenames()?;
        info!(url = %session.base_url, entries = names.len(), "connected to remote directory");
        Ok(Box::new(session))
    }
}

/// One remote directory accessed through `curl`.
#[derive(Debug, Clone)]
pub struct CurlSession {
    binary: String,
    /// curl config text carrying `user`, fed on stdin so the password never
    /// shows up in the process list.
    credentials: String,
    timeout_secs: u64,
    base_url: String,
}

impl CurlSession {
    fn command(&self) -> Command {
        let timeout = self.timeout_secs.to_string();
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--silent")
            .arg("--show-error")
            .arg("--connect-timeout")
            .arg(&timeout)
            .arg("--speed-limit")
            .arg(STALL_BYTES_PER_SEC)
            .arg("--speed-time")
            .arg(&timeout)
            .arg("--config")
            .arg("-")
            .stdin(Stdio::piped());
        cmd
    }

    /// Start `cmd` and hand it the credentials.
    fn spawn(&self, cmd: &mut Command) -> Result<Child, RemoteError> {
        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(self.credentials.as_bytes()) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RemoteError::IoError(e));
            }
        }
        Ok(child)
    }

    fn run_curl(&self, args: &[&str]) -> Result<String, RemoteError> {
        let mut cmd = self.command();
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());

        debug!(cmd = ?format!("{} {}", self.binary, args.join(" ")), "running curl command");
        let output = self
            .spawn(&mut cmd)?
            .wait_with_output()
            .map_err(RemoteError::IoError)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(exit_code, %stderr, "curl command failed");
            return Err(RemoteError::CommandFailed { exit_code, stderr });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn spawn_error(&self, e: std::io::Error) -> RemoteError {
        if e.kind() == std::io::ErrorKind::NotFound {
            RemoteError::BinaryNotFound(self.binary.clone())
        } else {
            RemoteError::IoError(e)
        }
    }

    /// Wait for a download to finish, reporting the destination size while
    /// it runs. Kills the child when the transfer is cancelled.
    fn supervise(
        &self,
        child: &mut Child,
        destination: &Path,
        ctx: &mut FetchContext<'_>,
    ) -> Result<ExitStatus, TransferError> {
        loop {
            if ctx.is_cancelled() {
                if let Err(e) = child.kill() {
                    debug!(error = %e, "curl already exited");
                }
                let _ = child.wait();
                return Err(TransferError::Cancelled);
            }

            if let Some(status) = child.try_wait()? {
                ctx.record(written_bytes(destination));
                return Ok(status);
            }

            ctx.record(written_bytes(destination));
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl RemoteSession for CurlSession {
    #[instrument(skip(self), fields(url = %self.base_url))]
    fn list_filenames(&mut self) -> Result<Vec<String>, RemoteError> {
        let output = self.run_curl(&["--list-only", &self.base_url])?;
        let names: Vec<String> = output
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        debug!(count = names.len(), "listed remote filenames");
        Ok(names)
    }

    #[instrument(skip(self, ctx), fields(url = %self.base_url))]
    fn fetch(
        &mut self,
        filename: &str,
        destination: &Path,
        ctx: &mut FetchContext<'_>,
    ) -> Result<(), TransferError> {
        let url = file_url(&self.base_url, filename);
        let mut cmd = self.command();
        cmd.arg("-o")
            .arg(destination)
            .arg(&url)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        debug!(%url, dest = %destination.display(), "starting download");
        let mut child = self.spawn(&mut cmd)?;
        let status = self.supervise(&mut child, destination, ctx)?;

        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            let exit_code = status.code().unwrap_or(-1);
            return Err(RemoteError::CommandFailed {
                exit_code,
                stderr: stderr.trim().to_string(),
            }
            .into());
        }

        debug!(bytes = ctx.progress().bytes_written, "download finished");
        Ok(())
    }

    #[instrument(skip(self), fields(url = %self.base_url))]
    fn list_remote_sizes(&mut self) -> Result<SizeMap, RemoteError> {
        let output = self.run_curl(&[&self.base_url])?;
        let sizes = parse_size_listing(&output);
        debug!(count = sizes.len(), "listed remote sizes");
        Ok(sizes)
    }

    fn close(&mut self) -> Result<(), RemoteError> {
        debug!(url = %self.base_url, "closing curl session");
        Ok(())
    }
}

/// `user = "name:password"` in curl config syntax.
fn credentials_config(user: &str, password: &str) -> String {
    let mut quoted = String::new();
    for c in format!("{}:{}", user, password).chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    format!("user = \"{}\"\n", quoted)
}

fn written_bytes(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// `ftp://host/dir/`, with a trailing slash so curl treats it as a listing.
pub fn directory_url(host: &str, remote_dir: &str) -> String {
    let host = host
        .trim()
        .trim_start_matches("ftp://")
        .trim_end_matches('/');
    let dir = remote_dir.trim().trim_matches('/');
    if dir.is_empty() {
        format!("ftp://{}/", host)
    } else {
        format!("ftp://{}/{}/", host, encode_path(dir))
    }
}

/// URL of `filename` inside the directory at `base_url`.
pub fn file_url(base_url: &str, filename: &str) -> String {
    format!("{}{}", base_url, encode_segment(filename))
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}
