//! Error types for lane counting.
//!
//! Configuration problems are recoverable (the geometry store falls back to
//! defaults); geometry and state-invariant problems abort a session before
//! its first frame.

use crate::types::{FrameSize, LaneId};
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CountingError>;

/// Persisted lane configuration could not be used or written.
#[derive(Error, Debug)]
pub enum LaneConfigError {
    #[error("lane configuration not found at {0}")]
    Missing(PathBuf),

    #[error("failed to read lane configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed lane configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write lane configuration {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize lane configuration: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Coordinates cannot be mapped safely.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("reference frame size {0} has a zero dimension")]
    DegenerateReferenceSize(FrameSize),

    #[error("native frame size {0} has a zero dimension")]
    DegenerateNativeSize(FrameSize),

    #[error("frame rate must be finite and positive, got {0}")]
    InvalidFrameRate(f64),
}

/// Lane table and counter table disagree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateInvariantViolation {
    #[error("lane {lane} is outside the configured set of {configured} lanes")]
    LaneOutOfRange { lane: LaneId, configured: usize },

    #[error("lane at position {position} carries id {found}, expected {expected}")]
    LaneIdMismatch {
        position: usize,
        expected: LaneId,
        found: LaneId,
    },
}

/// Fatal errors raised while building a counting session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CountingError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    StateInvariant(#[from] StateInvariantViolation),
}
