//! Range math and chunk planning.
//!
//! Splits a resource of known size into N contiguous inclusive byte ranges
//! and renders them for HTTP `Range` headers.

mod range;

pub use range::{plan_chunks, ChunkPlan, ChunkRange, PlanError};
