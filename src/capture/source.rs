//! Video source seam.
//!
//! The capture state machine never talks to the OS directly. It samples a
//! `VideoSource` handed to it by a `SourceProvider`, and holds that source
//! inside a `SourceGuard` so it is released on every exit path.

use super::CaptureError;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::watch;

/// Options passed when acquiring a display stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConstraints {
    /// Render the pointer into captured frames.
    pub show_cursor: bool,
    /// Capture audio alongside video. Always rejected by the bundled providers.
    pub audio: bool,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            show_cursor: true,
            audio: false,
        }
    }
}

/// A live stream of display frames.
pub trait VideoSource: Send {
    /// The frame currently on screen, at native resolution.
    ///
    /// `None` once the stream has ended or when no frame is available.
    fn current_frame(&mut self) -> Option<RgbaImage>;

    /// Flips to `true` when the stream ends outside the session's control.
    ///
    /// A dropped sender is treated the same as `true`.
    fn termination(&self) -> watch::Receiver<bool>;

    /// Stop the stream and free the underlying handle. Must be idempotent.
    fn release(&mut self);

    /// Short label for logs.
    fn label(&self) -> String {
        "video source".to_string()
    }
}

/// Grants access to a display stream.
pub trait SourceProvider {
    /// Suspends until the stream is granted or denied.
    fn acquire(
        &self,
        constraints: StreamConstraints,
    ) -> impl Future<Output = Result<Box<dyn VideoSource>, CaptureError>> + Send;
}

/// Exclusive owner of a `VideoSource`. Releases it on drop.
pub struct SourceGuard {
    source: Option<Box<dyn VideoSource>>,
    label: String,
}

impl SourceGuard {
    pub fn new(source: Box<dyn VideoSource>) -> Self {
        let label = source.label();
        Self {
            source: Some(source),
            label,
        }
    }

    /// Sample the current frame. `None` after release.
    pub fn grab(&mut self) -> Option<RgbaImage> {
        self.source.as_mut()?.current_frame()
    }

    /// Termination signal of the held source.
    ///
    /// After release this returns a receiver that already reads `true`.
    pub fn termination(&self) -> watch::Receiver<bool> {
        match &self.source {
            Some(source) => source.termination(),
            None => watch::channel(true).1,
        }
    }

    /// Release the source. Safe to call more than once.
    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
            log::info!("[SOURCE] Released {}", self.label);
        }
    }

    pub fn is_released(&self) -> bool {
        self.source.is_none()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.release();
    }
}
