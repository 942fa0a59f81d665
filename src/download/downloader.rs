//! Authenticated, atomic resource fetching with format fallback.
//!
//! A candidate is streamed into a hidden temporary file next to its
//! destination, synced, then renamed into place. The destination is
//! therefore either absent, its previous content, or the complete new file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use rand::Rng;
use reqwest::cookie::CookieStore;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_PROGRESS_INTERVAL, PARTIAL_SUFFIX};
use super::descriptor::{ResourceCandidate, ResourceDescriptor, ResourceKind};
use super::error::{CandidateFailure, DownloadError};
use super::progress::{DownloadProgress, ProgressSink, ProgressThrottle};
use crate::auth::{Clock, Session, SystemClock};
use crate::transport::{HttpRequest, Transport};

/// Downloader settings.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Write buffer size.
    pub chunk_size: usize,
    /// Minimum interval between progress emissions.
    pub progress_interval: Duration,
    /// Also send the session token as the named session cookie. The explicit
    /// `Cookie` header replaces the jar's, so the jar's other cookies for the
    /// URL are appended to it.
    pub send_token_cookie: bool,
    /// Cookie name used when `send_token_cookie` is set.
    pub session_cookie_name: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            send_token_cookie: true,
            session_cookie_name: "orm-jwt".to_string(),
        }
    }
}

/// A committed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Where the file now lives.
    pub path: PathBuf,
    /// Which format was obtained.
    pub kind: ResourceKind,
    /// URL it came from.
    pub url: String,
    /// Size of the committed file.
    pub bytes_written: u64,
}

/// Fetches resources through a shared [`Transport`].
#[derive(Debug, Clone)]
pub struct Downloader {
    transport: Arc<Transport>,
    config: DownloadConfig,
    clock: Arc<dyn Clock>,
}

impl Downloader {
    /// Creates a downloader using the wall clock for session expiry.
    #[must_use]
    pub fn new(transport: Arc<Transport>, config: DownloadConfig) -> Self {
        Self {
            transport,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Judges session expiry with `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Fetches the first available candidate of `descriptor`.
    ///
    /// A candidate answering 404 advances to the next one; any other failure
    /// is terminal. Progress is reported to `progress` when the size is
    /// known.
    ///
    /// # Errors
    ///
    /// Returns the single failure when only one candidate was tried, or
    /// [`DownloadError::AllCandidatesFailed`] naming each candidate's failure.
    #[instrument(skip_all, fields(candidates = descriptor.candidates().len()))]
    pub async fn fetch(
        &self,
        cancel: &CancellationToken,
        session: &Session,
        descriptor: &ResourceDescriptor,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<FetchOutcome, DownloadError> {
        if descriptor.is_empty() {
            return Err(DownloadError::EmptyDescriptor);
        }
        if !session.is_valid_with(self.clock.as_ref()) {
            return Err(DownloadError::InvalidSession);
        }

        let mut failures: Vec<CandidateFailure> = Vec::new();
        let mut remaining = descriptor.candidates().len();
        for candidate in descriptor.candidates() {
            remaining -= 1;
            match self.fetch_candidate(cancel, session, candidate, progress).await {
                Ok(outcome) => {
                    if !failures.is_empty() {
                        info!(kind = %outcome.kind, "fallback candidate succeeded");
                    }
                    return Ok(outcome);
                }
                Err(error) => {
                    let advance = error.is_not_found() && remaining > 0;
                    if advance {
                        info!(url = %candidate.url, "candidate not found, trying next format");
                    }
                    failures.push(CandidateFailure {
                        url: candidate.url.clone(),
                        error,
                    });
                    if !advance {
                        break;
                    }
                }
            }
        }

        if failures.len() == 1 {
            if let Some(failure) = failures.pop() {
                return Err(failure.error);
            }
        }
        Err(DownloadError::AllCandidatesFailed { failures })
    }

    #[instrument(skip(self, cancel, session, candidate, progress), fields(url = %candidate.url, kind = %candidate.kind))]
    async fn fetch_candidate(
        &self,
        cancel: &CancellationToken,
        session: &Session,
        candidate: &ResourceCandidate,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<FetchOutcome, DownloadError> {
        let url = candidate.url.as_str();
        let response = self
            .transport
            .execute(cancel, &self.authenticated_request(session, candidate))
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::from_status(url, status.as_u16()));
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .trim()
            .to_string();
        if !has_prefix_ignore_case(&declared, &candidate.expected_content_type) {
            return Err(DownloadError::ContentTypeMismatch {
                url: url.to_string(),
                expected: candidate.expected_content_type.clone(),
                actual: declared,
            });
        }

        let total = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());

        let destination = candidate.destination.as_path();
        let parent = destination_dir(destination);
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e))?;

        let guard = PartialFile::new(temp_path_for(destination));
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(guard.path())
            .await
            .map_err(|e| DownloadError::io(guard.path(), e))?;
        debug!(temp = %guard.path().display(), "streaming to temporary file");

        let bytes_written = self
            .stream_to_file(cancel, file, response, url, guard.path(), total, progress)
            .await?;

        tokio::fs::rename(guard.path(), destination)
            .await
            .map_err(|e| DownloadError::io(destination, e))?;
        guard.disarm();

        if let (Some(sink), Some(total)) = (progress, total.filter(|t| *t > 0)) {
            sink.on_progress(DownloadProgress::complete(total));
        }
        info!(
            path = %destination.display(),
            bytes = bytes_written,
            "download complete"
        );

        Ok(FetchOutcome {
            path: destination.to_path_buf(),
            kind: candidate.kind,
            url: candidate.url.clone(),
            bytes_written,
        })
    }

    fn authenticated_request(&self, session: &Session, candidate: &ResourceCandidate) -> HttpRequest {
        let request = HttpRequest::get(candidate.url.as_str())
            .bearer(session.token())
            .header("accept", candidate.kind.accept());
        if self.config.send_token_cookie {
            let cookie = self.cookie_header(&candidate.url, session.token());
            request.header("cookie", &cookie)
        } else {
            request
        }
    }

    /// The session cookie followed by every other jar cookie for `url`.
    fn cookie_header(&self, url: &str, token: &str) -> String {
        let name = self.config.session_cookie_name.as_str();
        let mut header = format!("{name}={token}");
        let jar = Url::parse(url)
            .ok()
            .and_then(|url| self.transport.cookie_jar().cookies(&url));
        let Some(jar) = jar else {
            return header;
        };
        let Ok(jar) = jar.to_str() else {
            return header;
        };
        for pair in jar.split(';').map(str::trim).filter(|pair| !pair.is_empty()) {
            let pair_name = pair.split_once('=').map_or(pair, |(n, _)| n);
            if pair_name != name {
                header.push_str("; ");
                header.push_str(pair);
            }
        }
        header
    }

    /// Streams the body, then flushes and syncs. Returns bytes written.
    #[allow(clippy::too_many_arguments)]
    async fn stream_to_file(
        &self,
        cancel: &CancellationToken,
        file: File,
        response: reqwest::Response,
        url: &str,
        temp_path: &Path,
        total: Option<u64>,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<u64, DownloadError> {
        let mut writer = BufWriter::with_capacity(self.config.chunk_size.max(1), file);
        let mut stream = response.bytes_stream();
        let mut throttle = ProgressThrottle::new(self.config.progress_interval);
        let mut bytes_written: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(DownloadError::cancelled(url)),
                next = stream.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|source| {
                DownloadError::Transport(crate::transport::TransportError::from_reqwest(
                    url, 1, source,
                ))
            })?;

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(temp_path, e))?;
            bytes_written += chunk.len() as u64;

            if let (Some(sink), Some(total)) = (progress, total.filter(|t| *t > 0)) {
                if bytes_written < total && throttle.ready(Instant::now()) {
                    sink.on_progress(DownloadProgress::new(bytes_written, total));
                }
            }
        }

        if let Some(expected) = total {
            if expected != bytes_written {
                warn!(expected, actual = bytes_written, "body length mismatch");
                return Err(DownloadError::Integrity {
                    path: temp_path.to_path_buf(),
                    expected_bytes: expected,
                    actual_bytes: bytes_written,
                });
            }
        }

        writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(temp_path, e))?;
        let file = writer.into_inner();
        file.sync_all()
            .await
            .map_err(|e| DownloadError::io(temp_path, e))?;
        Ok(bytes_written)
    }
}

/// Removes the temporary file on drop unless the download was committed.
#[derive(Debug)]
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            debug!(path = %self.path.display(), "removing partial file");
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn destination_dir(destination: &Path) -> &Path {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// `dir/.name.<random>.part`; unique per call so concurrent writers to the
/// same destination never share a temporary file.
fn temp_path_for(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map_or_else(|| "download".into(), |n| n.to_string_lossy().into_owned());
    let suffix: u64 = rand::thread_rng().r#gen();
    destination_dir(destination).join(format!(".{name}.{suffix:016x}.{PARTIAL_SUFFIX}"))
}

fn has_prefix_ignore_case(value: &str, prefix: &str) -> bool {
    value.len() >= prefix.len()
        && value.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}
