use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use crate::users::services::{DirectorySettings, SearchStrategy};
use crate::view::composer::ViewSettings;

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen: SocketAddr,
    pub upstream: UpstreamConfig,
    pub directory: DirectorySettings,
    pub view: ViewSettings,
    pub view_idle: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let listen: SocketAddr = format!(
            "{}:{}",
            lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            lookup("APP_PORT").unwrap_or_else(|| "8080".into())
        )
        .parse()
        .context("invalid APP_HOST/APP_PORT")?;

        let upstream = UpstreamConfig {
            base_url: lookup("UPSTREAM_BASE_URL").unwrap_or_else(|| "https://dummyjson.com".into()),
            timeout: parse_opt::<u64>(&lookup, "UPSTREAM_TIMEOUT_SECS")?.map(Duration::from_secs),
        };

        let directory = DirectorySettings {
            chunk_size: parse_or(&lookup, "FETCH_CHUNK_SIZE", 100)?,
            search_strategy: parse_or(&lookup, "SEARCH_STRATEGY", SearchStrategy::Scan)?,
            search_scan_limit: parse_opt(&lookup, "SEARCH_SCAN_LIMIT")?,
        };

        let view = ViewSettings {
            page_size: parse_or(&lookup, "PAGE_SIZE", 10)?,
            debounce: Duration::from_millis(parse_or(&lookup, "SEARCH_DEBOUNCE_MS", 400)?),
            stale_time: Duration::from_secs(parse_or(&lookup, "CACHE_STALE_SECS", 5 * 60)?),
            max_entries: parse_or(&lookup, "CACHE_MAX_ENTRIES", 64)?,
        };
        if view.page_size == 0 {
            anyhow::bail!("PAGE_SIZE must be positive");
        }

        Ok(Self {
            listen,
            upstream,
            directory,
            view,
            view_idle: Duration::from_secs(parse_or(&lookup, "VIEW_IDLE_SECS", 30 * 60)?),
        })
    }
}

fn parse_opt<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid {}={:?}", key, raw)),
        None => Ok(None),
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}
