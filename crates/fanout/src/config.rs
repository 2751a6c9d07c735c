use std::{fs::OpenOptions, io::Read, net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{cmd::Args, fetch::DEFAULT_CONCURRENCY};

/// Service settings. Layered as defaults, then the optional JSON file, then CLI flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub addr: SocketAddr,
    /// Concurrently handled inbound requests.
    pub limit: usize,
    /// URLs accepted per request.
    pub max_urls: usize,
    /// Concurrent upstream fetches per request.
    pub concurrency: usize,
    /// Overall deadline per inbound request, 0 for none.
    pub request_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            limit: 100,
            max_urls: 20,
            concurrency: DEFAULT_CONCURRENCY,
            request_timeout_ms: 0,
        }
    }
}

impl Config {
    pub fn load(file: impl Into<PathBuf>) -> Result<Config> {
        let file = file.into();
        let mut s = String::new();
        OpenOptions::new()
            .read(true)
            .open(&file)
            .and_then(|mut f| f.read_to_string(&mut s))
            .with_context(|| format!("read config {}", file.display()))?;
        let c: Config = serde_json::from_str(&s)
            .with_context(|| format!("parse config {}", file.display()))?;
        Ok(c)
    }

    pub fn resolve(args: &Args) -> Result<Config> {
        let mut config = match &args.config {
            Some(file) => Config::load(file)?,
            None => Config::default(),
        };
        if let Some(addr) = args.addr {
            config.addr = addr;
        }
        if let Some(limit) = args.limit {
            config.limit = limit;
        }
        if let Some(max_urls) = args.max_urls {
            config.max_urls = max_urls;
        }
        if let Some(concurrency) = args.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(ms) = args.request_timeout_ms {
            config.request_timeout_ms = ms;
        }
        Ok(config)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}
