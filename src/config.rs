use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use anyhow::{Context, Result};
use url::Url;

pub const DEFAULT_CALENDAR_URL: &str = "https://www.pepal.eu/ical_student/";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8888";
pub const DEFAULT_ASSETS_DIR: &str = "assets";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: Url,
    pub calendar_url: Url,
    pub bind_addr: SocketAddr,
    pub assets_dir: PathBuf,
    pub http_timeout: Duration,
}

impl Config {
    // Reads the configuration from the process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("PEPAL_BASE_URL").context("PEPAL_BASE_URL environment variable not found")?;
        let base_url = parse_base_url(&base_url).context("PEPAL_BASE_URL is not a valid URL")?;

        let calendar_url = lookup("PEPAL_CALENDAR_URL").unwrap_or_else(|| DEFAULT_CALENDAR_URL.to_string());
        let calendar_url = parse_base_url(&calendar_url).context("PEPAL_CALENDAR_URL is not a valid URL")?;

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("BIND_ADDR is not a valid socket address")?;

        let assets_dir = lookup("ASSETS_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR));

        let timeout_secs = match lookup("HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.parse().context("HTTP_TIMEOUT_SECS must be a number of seconds")?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Config {
            base_url,
            calendar_url,
            bind_addr,
            assets_dir,
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

// Relative joins drop the last path segment unless the base ends with a slash.
fn parse_base_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.ends_with('/') {
        Ok(Url::parse(raw)?)
    } else {
        Ok(Url::parse(&format!("{}/", raw))?)
    }
}
