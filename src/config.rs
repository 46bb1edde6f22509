//! Runtime configuration resolved before the language server is spawned.

use std::{path::PathBuf, time::Duration};

pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Everything one proxy session needs to know.
#[derive(Debug, Clone)]
pub struct Config {
    /// Language server command line, program first.
    pub server: Vec<String>,
    /// Listen socket for ad-hoc injected requests.
    pub inject_socket: PathBuf,
    /// Observer socket dialed on every probe tick while disconnected.
    pub observer_socket: PathBuf,
    /// Period of the session tick.
    pub probe_interval: Duration,
}

impl Config {
    pub fn new(server: Vec<String>) -> Self {
        Self {
            server,
            inject_socket: default_inject_socket(),
            observer_socket: default_observer_socket(),
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }
}

/// Default directory for sockets and the log file.
pub fn base_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lsp-tap")
}

pub fn default_inject_socket() -> PathBuf {
    base_dir().join("inject.sock")
}

pub fn default_observer_socket() -> PathBuf {
    base_dir().join("observer.sock")
}

pub fn default_log_file() -> PathBuf {
    base_dir().join("lsp-tap.log")
}
