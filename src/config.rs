use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

/// Journal file name inside the data directory.
pub const JOURNAL_FILE: &str = "placebook.wal";

#[derive(Debug, Clone, Parser)]
#[command(name = "placebook", about = "Space reservation service")]
pub struct Config {
    #[arg(long, env = "PLACEBOOK_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    #[arg(long, env = "PLACEBOOK_PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "PLACEBOOK_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Serve Prometheus metrics on this port. Disabled when unset.
    #[arg(long, env = "PLACEBOOK_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Journal appends that trigger a compaction.
    #[arg(long, env = "PLACEBOOK_COMPACT_THRESHOLD", default_value_t = 1000)]
    pub compact_threshold: u64,

    /// Seconds between compaction checks.
    #[arg(long = "compact-interval", env = "PLACEBOOK_COMPACT_INTERVAL", default_value_t = 30)]
    pub compact_interval_secs: u64,

    /// Require `Authorization: Bearer <token>` from the fronting gateway.
    #[arg(long, env = "PLACEBOOK_GATEWAY_TOKEN")]
    pub gateway_token: Option<String>,

    /// Reject bookings outside a place's days, hours, or date window.
    #[arg(
        long,
        env = "PLACEBOOK_ENFORCE_AVAILABILITY",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub enforce_availability: bool,
}

impl Config {
    pub fn listen_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind, self.port).parse()
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join(JOURNAL_FILE)
    }

    pub fn compact_interval(&self) -> Duration {
        Duration::from_secs(self.compact_interval_secs.max(1))
    }
}
