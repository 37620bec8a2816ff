use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::request::{
    DownloadRequest, DownloadRequestBuilder, DEFAULT_CHUNKS, DEFAULT_EXTENSION, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_OUTPUT_DIR,
};
use crate::transport::HttpOptions;

/// Environment variables read by [`RangefetchConfig::apply_env`].
pub const ENV_URL: &str = "URL";
pub const ENV_CHUNKS: &str = "NUM_OF_CHUNKS";
pub const ENV_MAX_RETRIES: &str = "MAX_RETRIES";
pub const ENV_EXTENSION: &str = "FILE_EXTENSION";

/// Retry policy parameters (`[retry]` in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per chunk (including the first).
    pub max_attempts: u32,
    /// Backoff unit in seconds: attempt k waits k * base_delay_secs.
    pub base_delay_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_secs: 1.0,
        }
    }
}

/// HTTP timeouts (`[http]` in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    /// Hard cap per chunk attempt; unset leaves it to the low-speed limit and the deadline.
    pub attempt_timeout_secs: Option<u64>,
    /// Bytes per second below which a transfer counts as stalled.
    pub low_speed_limit: u32,
    pub low_speed_time_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let d = HttpOptions::default();
        Self {
            connect_timeout_secs: d.connect_timeout.as_secs(),
            attempt_timeout_secs: None,
            low_speed_limit: d.low_speed_limit,
            low_speed_time_secs: d.low_speed_time.as_secs(),
        }
    }
}

/// Global configuration loaded from `~/.config/rangefetch/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangefetchConfig {
    /// Source address used when none is given on the command line.
    pub url: Option<String>,
    /// Number of byte-range chunks per download.
    pub chunks: usize,
    /// Directory that receives artifacts (and chunk storage while downloading).
    pub output_dir: PathBuf,
    pub output_extension: String,
    /// Cap on concurrent chunk workers (None = one per chunk).
    pub max_workers: Option<usize>,
    /// Keep chunk storage after a failed download instead of deleting it.
    pub keep_chunks_on_failure: bool,
    /// Overall time budget per download in seconds (None = unbounded).
    pub deadline_secs: Option<u64>,
    pub retry: RetryConfig,
    pub http: HttpConfig,
}

impl Default for RangefetchConfig {
    fn default() -> Self {
        Self {
            url: None,
            chunks: DEFAULT_CHUNKS,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            output_extension: DEFAULT_EXTENSION.to_string(),
            max_workers: None,
            keep_chunks_on_failure: false,
            deadline_secs: Some(20 * 60),
            retry: RetryConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl RangefetchConfig {
    /// Overlay the process environment (`URL`, `NUM_OF_CHUNKS`, `MAX_RETRIES`,
    /// `FILE_EXTENSION`).
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`; empty values are ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(ENV_URL) {
            self.url = Some(url);
        }
        if let Some(v) = get(ENV_CHUNKS) {
            self.chunks = v
                .trim()
                .parse()
                .with_context(|| format!("{}={:?} is not a chunk count", ENV_CHUNKS, v))?;
        }
        if let Some(v) = get(ENV_MAX_RETRIES) {
            self.retry.max_attempts = v
                .trim()
                .parse()
                .with_context(|| format!("{}={:?} is not a number", ENV_MAX_RETRIES, v))?;
        }
        if let Some(v) = get(ENV_EXTENSION) {
            self.output_extension = v;
        }
        Ok(())
    }

    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            connect_timeout: Duration::from_secs(self.http.connect_timeout_secs),
            attempt_timeout: self.http.attempt_timeout_secs.map(Duration::from_secs),
            low_speed_limit: self.http.low_speed_limit,
            low_speed_time: Duration::from_secs(self.http.low_speed_time_secs),
            ..HttpOptions::default()
        }
    }

    pub fn base_delay(&self) -> Result<Duration> {
        let secs = self.retry.base_delay_secs;
        Duration::try_from_secs_f64(secs)
            .with_context(|| format!("retry.base_delay_secs = {} is not a usable delay", secs))
    }

    /// Request builder seeded with every configured value for `url`.
    pub fn request_builder(&self, url: impl Into<String>) -> Result<DownloadRequestBuilder> {
        Ok(DownloadRequest::builder(url)
            .chunk_count(self.chunks)
            .max_attempts(self.retry.max_attempts)
            .base_delay(self.base_delay()?)
            .output_extension(self.output_extension.clone())
            .output_dir(self.output_dir.clone())
            .deadline(self.deadline_secs.map(Duration::from_secs))
            .max_workers(self.max_workers)
            .http_options(self.http_options())
            .keep_chunks_on_failure(self.keep_chunks_on_failure))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rangefetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RangefetchConfig> {
    let path = config_path()?;
    load_or_init_at(&path)
}

/// Like [`load_or_init`], for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<RangefetchConfig> {
    if !path.exists() {
        let default_cfg = RangefetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml).with_context(|| format!("write {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RangefetchConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_values() {
        let cfg = RangefetchConfig::default();
        assert_eq!(cfg.chunks, 4);
        assert_eq!(cfg.output_dir, PathBuf::from("output"));
        assert_eq!(cfg.output_extension, "bin");
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.deadline_secs, Some(1200));
        assert!(!cfg.keep_chunks_on_failure);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = RangefetchConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: RangefetchConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_toml_partial_uses_defaults() {
        let toml = r#"
            chunks = 8
            output_extension = "csv"

            [retry]
            max_attempts = 5
        "#;
        let cfg: RangefetchConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.chunks, 8);
        assert_eq!(cfg.output_extension, "csv");
        assert_eq!(cfg.retry.max_attempts, 5);
        assert!((cfg.retry.base_delay_secs - 1.0).abs() < 1e-9);
        assert_eq!(cfg.http, HttpConfig::default());
        assert!(cfg.url.is_none());
    }

    #[test]
    fn config_toml_http_and_workers() {
        let toml = r#"
            max_workers = 2
            keep_chunks_on_failure = true
            deadline_secs = 90

            [http]
            connect_timeout_secs = 5
            attempt_timeout_secs = 120
            low_speed_limit = 512
            low_speed_time_secs = 10
        "#;
        let cfg: RangefetchConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.max_workers, Some(2));
        let http = cfg.http_options();
        assert_eq!(http.connect_timeout, Duration::from_secs(5));
        assert_eq!(http.attempt_timeout, Some(Duration::from_secs(120)));
        assert_eq!(http.low_speed_limit, 512);
        let req = cfg.request_builder("http://h/x").unwrap().build().unwrap();
        assert_eq!(req.deadline(), Some(Duration::from_secs(90)));
        assert!(req.keep_chunks_on_failure());
        assert_eq!(req.worker_count(), 2);
    }

    #[test]
    fn unusable_base_delay_is_an_error() {
        let mut cfg = RangefetchConfig::default();
        cfg.retry.base_delay_secs = 0.25;
        assert_eq!(cfg.base_delay().unwrap(), Duration::from_millis(250));

        for bad in [f64::INFINITY, 1e20, -1.0, f64::NAN] {
            cfg.retry.base_delay_secs = bad;
            let err = cfg.base_delay().unwrap_err();
            assert!(err.to_string().contains("base_delay_secs"), "{}", err);
            assert!(cfg.request_builder("http://h/x").is_err());
        }

        let parsed: RangefetchConfig = toml::from_str("[retry]\nbase_delay_secs = inf\n").unwrap();
        assert!(parsed.base_delay().is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("URL", "http://env.example/file.csv"),
            ("NUM_OF_CHUNKS", "6"),
            ("MAX_RETRIES", "7"),
            ("FILE_EXTENSION", "csv"),
        ]
        .into_iter()
        .collect();
        let mut cfg = RangefetchConfig::default();
        cfg.apply_env_with(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.url.as_deref(), Some("http://env.example/file.csv"));
        assert_eq!(cfg.chunks, 6);
        assert_eq!(cfg.retry.max_attempts, 7);
        assert_eq!(cfg.output_extension, "csv");
    }

    #[test]
    fn env_empty_values_ignored_and_garbage_rejected() {
        let mut cfg = RangefetchConfig::default();
        cfg.apply_env_with(|k| (k == "NUM_OF_CHUNKS").then(|| " ".to_string()))
            .unwrap();
        assert_eq!(cfg.chunks, 4);
        let err = cfg
            .apply_env_with(|k| (k == "MAX_RETRIES").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("MAX_RETRIES"));
    }

    #[test]
    fn load_or_init_creates_then_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rangefetch").join("config.toml");
        let first = load_or_init_at(&path).unwrap();
        assert!(path.exists());
        fs::write(&path, "chunks = 12\n").unwrap();
        let second = load_or_init_at(&path).unwrap();
        assert_eq!(first.chunks, 4);
        assert_eq!(second.chunks, 12);
    }
}
