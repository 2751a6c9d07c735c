use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use log::LevelFilter;

/// Fetches a JSON list of URLs concurrently and answers with their bodies.
#[derive(Debug, Parser)]
#[command(version, author)]
pub struct Args {
    /// address:port to listen [default: 0.0.0.0:8080]
    #[arg(short = 'a', long, env = "FANOUT_ADDR")]
    pub addr: Option<SocketAddr>,

    /// limit concurrently handled incoming requests [default: 100]
    #[arg(short = 'l', long, env = "FANOUT_LIMIT")]
    pub limit: Option<usize>,

    /// max URLs accepted in one request [default: 20]
    #[arg(long, env = "FANOUT_MAX_URLS")]
    pub max_urls: Option<usize>,

    /// concurrent upstream fetches per request, 0 means 4 [default: 4]
    #[arg(short = 'c', long, env = "FANOUT_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// overall deadline of one request in ms, 0 disables it [default: 0]
    #[arg(long, env = "FANOUT_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: Option<u64>,

    /// JSON config file; flags given on the command line win over it
    #[arg(long, env = "FANOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// log level: off|error|warn|info|debug|trace, or v - info, vv - debug, vvv - trace
    #[arg(
        short = 'v',
        long,
        env = "FANOUT_LOG_LEVEL",
        default_value = "info",
        value_parser = parse_log_level
    )]
    pub log_level: LevelFilter,

    /// log with color?
    #[arg(long)]
    pub colored: bool,

    /// also append logs to this file
    #[arg(long, env = "FANOUT_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

pub fn parse_log_level(v: &str) -> Result<LevelFilter, String> {
    const VERBOSE_PAT: char = 'v';

    let level = match v.trim().to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "err" | "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        s if s.chars().all(|c| c == VERBOSE_PAT) => match s.len() {
            0 => LevelFilter::Off,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        },
        s => return Err(format!("unknown log level: {s}")),
    };
    Ok(level)
}
