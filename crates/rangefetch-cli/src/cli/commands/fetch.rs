//! `rangefetch fetch [URL]` – download one resource.

use anyhow::{Context, Result};
use rangefetch_core::config::{self, RangefetchConfig};
use rangefetch_core::{
    download, CancelReason, CancelToken, DownloadRequest, IntegrityVerdict, TracingSink,
};
use std::time::Duration;

use crate::cli::FetchArgs;

impl FetchArgs {
    /// Apply flags on top of `cfg` (which already carries env overrides).
    pub fn into_request(self, cfg: &RangefetchConfig) -> Result<DownloadRequest> {
        let url = self
            .url
            .or_else(|| cfg.url.clone())
            .context("no URL given (pass one, set URL, or set `url` in config.toml)")?;
        let mut builder = cfg.request_builder(url)?;
        if let Some(n) = self.chunks {
            builder = builder.chunk_count(n);
        }
        if let Some(n) = self.max_retries {
            builder = builder.max_attempts(n);
        }
        if let Some(ext) = self.ext {
            builder = builder.output_extension(ext);
        }
        if let Some(dir) = self.output_dir {
            builder = builder.output_dir(dir);
        }
        if let Some(secs) = self.deadline {
            builder = builder.deadline((secs > 0).then(|| Duration::from_secs(secs)));
        }
        if self.max_workers.is_some() {
            builder = builder.max_workers(self.max_workers);
        }
        if self.keep_chunks {
            builder = builder.keep_chunks_on_failure(true);
        }
        Ok(builder.build()?)
    }
}

pub async fn run_fetch(args: FetchArgs) -> Result<()> {
    let mut cfg = config::load_or_init()?;
    cfg.apply_env()?;
    tracing::debug!("effective config: {:?}", cfg);
    let request = args.into_request(&cfg)?;

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted, cancelling chunks...");
            on_interrupt.cancel(CancelReason::Requested);
        }
    });

    let outcome = tokio::task::spawn_blocking(move || download(&request, &TracingSink, cancel))
        .await
        .context("download task failed")?;
    watcher.abort();
    let outcome = outcome?;

    println!("{}", outcome.artifact.display());
    match &outcome.verdict {
        IntegrityVerdict::Match { token } => println!("integrity: ok ({})", token),
        IntegrityVerdict::Mismatch { expected, actual } => {
            eprintln!("warning: integrity mismatch: got {}, server token {}", actual, expected)
        }
        IntegrityVerdict::Unverifiable => {
            eprintln!("warning: server sent no integrity token; not verified")
        }
    }
    tracing::info!(
        bytes = outcome.bytes,
        chunks = outcome.chunks.len(),
        "download complete"
    );
    Ok(())
}
