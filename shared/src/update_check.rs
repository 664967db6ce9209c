//! Background check for a newer release.
//!
//! The check runs once on its own thread and never blocks the caller. The result is
//! delivered over a channel that the caller drains from its own loop, so any reaction
//! to it happens on the caller's thread.

use std::io::Read;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use thiserror::Error;

/// Hard limit on the whole HTTP exchange
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// The version line sits near the top of the file; nothing past this is read.
pub const MAX_FETCH_BYTES: u64 = 4096;

const USER_AGENT: &str = concat!("subexposure-update-check/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum UpdateCheckError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),
    #[error("Failed to read response: {0}")]
    Io(#[from] std::io::Error),
    #[error("No version line found in remote file")]
    NoVersion,
}

/// Outcome delivered to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate { current: String },
    Available { current: String, remote: String },
    /// The check could not complete. Carries the reason for logging only.
    Unavailable(String),
}

impl UpdateStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, UpdateStatus::Available { .. })
    }
}

/// Somewhere the latest version text can be fetched from
pub trait VersionSource: Send + 'static {
    fn fetch(&self) -> Result<String, UpdateCheckError>;
}

/// Fetches a raw file over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpVersionSource {
    url: String,
    timeout: Duration,
}

impl HttpVersionSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: FETCH_TIMEOUT,
        }
    }

    /// Shorten the request timeout. Values above [`FETCH_TIMEOUT`] are capped to it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(FETCH_TIMEOUT);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl VersionSource for HttpVersionSource {
    fn fetch(&self) -> Result<String, UpdateCheckError> {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .build()
            .into();

        let response = agent
            .get(&self.url)
            .header("User-Agent", USER_AGENT)
            .call()?;

        let mut bytes = Vec::new();
        response
            .into_body()
            .into_reader()
            .take(MAX_FETCH_BYTES)
            .read_to_end(&mut bytes)?;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Find the first `version = "..."` or `__version__ = "..."` assignment.
pub fn parse_remote_version(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        match key.trim() {
            "version" | "__version__" => {
                let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                (!value.is_empty()).then(|| value.to_string())
            }
            _ => None,
        }
    })
}

/// Dotted version to comparable components. Anything unparseable compares as `[0]`.
pub fn parse_version(version: &str) -> Vec<u32> {
    version
        .trim()
        .trim_start_matches('v')
        .split('.')
        .map(str::parse::<u32>)
        .collect::<Result<Vec<_>, _>>()
        .unwrap_or_else(|_| vec![0])
}

/// Compare what the source reports with the running version.
pub fn check_once(source: &dyn VersionSource, current: &str) -> UpdateStatus {
    let result = source
        .fetch()
        .and_then(|text| parse_remote_version(&text).ok_or(UpdateCheckError::NoVersion));

    match result {
        Ok(remote) if parse_version(&remote) > parse_version(current) => {
            log::info!("Update available: {current} -> {remote}");
            UpdateStatus::Available {
                current: current.to_string(),
                remote,
            }
        }
        Ok(remote) => {
            log::debug!("Up to date ({current}, remote {remote})");
            UpdateStatus::UpToDate {
                current: current.to_string(),
            }
        }
        Err(e) => {
            log::warn!("Update check failed: {e}");
            UpdateStatus::Unavailable(e.to_string())
        }
    }
}

/// Fire-and-forget version check
pub struct UpdateChecker;

impl UpdateChecker {
    /// Start the check on a background thread and return immediately.
    pub fn spawn<S: VersionSource>(source: S, current_version: &str) -> UpdateHandle {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let fallback_tx = tx.clone();
        let current = current_version.to_string();

        let spawned = thread::Builder::new()
            .name("update-check".to_string())
            .spawn(move || {
                let status = check_once(&source, &current);
                // Receiver may already be gone; nobody is waiting then.
                let _ = tx.send(status);
            });

        if let Err(e) = spawned {
            log::warn!("Could not start update check thread: {e}");
            let _ = fallback_tx.send(UpdateStatus::Unavailable(e.to_string()));
        }

        UpdateHandle { rx }
    }
}

/// Receiving end of a running check
pub struct UpdateHandle {
    rx: Receiver<UpdateStatus>,
}

impl UpdateHandle {
    /// Non-blocking poll; `None` while the check is still running.
    pub fn try_status(&self) -> Option<UpdateStatus> {
        match self.rx.try_recv() {
            Ok(status) => Some(status),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Block up to `timeout` for the result.
    pub fn wait_status(&self, timeout: Duration) -> Option<UpdateStatus> {
        match self.rx.recv_timeout(timeout) {
            Ok(status) => Some(status),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}
