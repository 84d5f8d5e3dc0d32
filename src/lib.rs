//! SnapStream: capture frames from a live display stream and stitch
//! them into one tall image.
//!
//! This crate is the core behind an interactive front end. It wires together:
//! - Frame model and ordered collection (frame.rs)
//! - Capture state machine and its async driver (capture/)
//! - Sequential stitching engine and editor (stitch/)
//! - Analysis gateway contract and HTTP client (analysis/)
//! - Export helpers and configuration (export.rs, config.rs)

pub mod analysis;
pub mod capture;
pub mod config;
pub mod export;
pub mod frame;
pub mod stitch;

pub use analysis::{AnalysisError, AnalysisGateway, AnalysisResult, HttpGateway};
pub use capture::{
    start_capture, CaptureError, CaptureHandle, CaptureMode, CaptureOptions, CaptureOutcome,
    ModeKind, MonitorProvider,
};
pub use config::SnapConfig;
pub use frame::{Direction, Frame, FrameCollection, FrameId};
pub use stitch::{CompositeImage, FrameEditor, RenderOutcome, StitchEngine, StitchError};

/// Install `env_logger` for hosts that don't bring their own logger.
///
/// Filtering follows `RUST_LOG`, defaulting to `info`. Safe to call more
/// than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
