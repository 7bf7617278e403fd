// src/pipeline/mod.rs

pub mod metrics;
pub mod prefetch;
pub mod session;

pub use metrics::{MetricsSummary, PipelineMetrics};
pub use prefetch::PrefetchSource;
pub use session::{
    FrameOutcome, FrameSink, FrameSource, Session, SessionConfig, SessionParts, SessionReport,
    Tracker,
};
