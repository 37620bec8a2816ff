//! Top-level error of one download.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::control::CancelReason;
use crate::downloader::AggregatedDownloadError;
use crate::merge::MergeError;
use crate::probe::ProbeError;
use crate::request::RequestError;
use crate::segmenter::PlanError;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),
    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),
    #[error("cannot plan chunks: {0}")]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Aggregated(#[from] AggregatedDownloadError),
    /// Cancelled with no chunk failure recorded (external request or a
    /// deadline that interrupted chunks without failing one).
    #[error("download cancelled: {reason}")]
    Cancelled { reason: CancelReason },
    #[error("chunk storage in {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),
}
