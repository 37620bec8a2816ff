pub mod config;
pub mod logging;

pub mod checksum;
pub mod control;
pub mod downloader;
pub mod engine;
pub mod error;
pub mod events;
pub mod merge;
pub mod probe;
pub mod request;
pub mod retry;
pub mod segmenter;
pub mod storage;
pub mod transport;

pub use control::{CancelReason, CancelToken};
pub use downloader::{AggregatedDownloadError, ChunkReport, ChunkStatus};
pub use engine::{download, download_with, AggregateOutcome, Phase};
pub use error::DownloadError;
pub use events::{Event, EventSink, Level, MemorySink, TracingSink};
pub use merge::IntegrityVerdict;
pub use request::{DownloadRequest, DownloadRequestBuilder, RequestError};
pub use transport::{HttpOptions, HttpTransport, Transport};
