//! Screen capture domain: public API.
//!
//! This module owns sampling a live display stream into frames.
//! External code should only use the items re-exported here.

mod driver;
pub mod raster;
mod screenshot;
mod session;
mod source;

pub use driver::{start_capture, CaptureCompletion, CaptureHandle, CaptureOptions};
pub use screenshot::{MonitorProvider, MonitorSource};
pub use session::{
    CaptureMode, CaptureOutcome, CaptureSession, CaptureStatus, ModeKind, Recording,
    SessionState,
};
pub use source::{SourceGuard, SourceProvider, StreamConstraints, VideoSource};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Display stream unavailable: {0}")]
    SourceAcquisition(String),

    #[error("Display stream ended before capture started")]
    SourceUnavailable,

    #[error("Unsupported stream constraint: {0}")]
    UnsupportedConstraint(&'static str),

    #[error("Capture session is no longer active")]
    NotActive,

    #[error("Recording can only be toggled in timer mode")]
    NotTimerMode,

    #[error("Nothing captured yet; take at least one frame before finishing")]
    NoFrames,

    #[error("Timer period must be greater than zero")]
    InvalidTimerPeriod,

    #[error("Capture driver exited without reporting an outcome")]
    DriverGone,
}
