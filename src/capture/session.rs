//! Capture state machine.
//!
//! Synchronous and clock-free: the driver decides *when* things happen
//! (commands, timer ticks, stream termination) and this module decides
//! *what* they do. Every way out of `Active` releases the source before
//! the transition is observable.

use super::source::{SourceGuard, VideoSource};
use super::CaptureError;
use crate::frame::{Frame, FrameCollection, FrameId};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Capture policy as chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModeKind {
    Single,
    ManualLong,
    TimerLong,
}

/// Whether timer sampling is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Recording {
    Off,
    On,
}

/// Active capture policy plus the state only that policy has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CaptureMode {
    Single,
    ManualLong,
    TimerLong { recording: Recording },
}

impl CaptureMode {
    pub fn kind(&self) -> ModeKind {
        match self {
            CaptureMode::Single => ModeKind::Single,
            CaptureMode::ManualLong => ModeKind::ManualLong,
            CaptureMode::TimerLong { .. } => ModeKind::TimerLong,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(
            self,
            CaptureMode::TimerLong {
                recording: Recording::On
            }
        )
    }
}

impl From<ModeKind> for CaptureMode {
    /// Entering timer mode always starts paused.
    fn from(kind: ModeKind) -> Self {
        match kind {
            ModeKind::Single => CaptureMode::Single,
            ModeKind::ManualLong => CaptureMode::ManualLong,
            ModeKind::TimerLong => CaptureMode::TimerLong {
                recording: Recording::Off,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Waiting on stream acquisition. Only the caller of `start_capture`
    /// sees this phase; a handle exists once the session is `Active`.
    Initializing,
    Active,
    Finished,
    /// The stream ended on its own; captured frames were kept.
    Stopped,
    Cancelled,
}

/// How a capture session ended.
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// The user finished, or a single-shot capture completed.
    Finished(FrameCollection),
    /// The stream ended externally after at least one frame was captured.
    Stopped(FrameCollection),
    /// Cancelled by the user, or the stream ended with nothing captured.
    Cancelled,
}

impl CaptureOutcome {
    /// Frames handed back to the caller, if any.
    pub fn frames(&self) -> Option<&FrameCollection> {
        match self {
            CaptureOutcome::Finished(frames) | CaptureOutcome::Stopped(frames) => Some(frames),
            CaptureOutcome::Cancelled => None,
        }
    }

    pub fn into_frames(self) -> Option<FrameCollection> {
        match self {
            CaptureOutcome::Finished(frames) | CaptureOutcome::Stopped(frames) => Some(frames),
            CaptureOutcome::Cancelled => None,
        }
    }
}

/// Observable snapshot of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStatus {
    pub state: SessionState,
    pub mode: CaptureMode,
    pub frame_count: usize,
}

/// One capture session over an acquired video source.
pub struct CaptureSession {
    source: SourceGuard,
    mode: CaptureMode,
    state: SessionState,
    frames: FrameCollection,
    outcome: Option<CaptureOutcome>,
}

impl CaptureSession {
    /// Start an active session over a freshly acquired source.
    pub fn new(source: Box<dyn VideoSource>, kind: ModeKind) -> Self {
        let source = SourceGuard::new(source);
        log::info!("[CAPTURE] Session active on {} in {:?} mode", source.label(), kind);
        Self {
            source,
            mode: kind.into(),
            state: SessionState::Active,
            frames: FrameCollection::new(),
            outcome: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn is_recording(&self) -> bool {
        self.is_active() && self.mode.is_recording()
    }

    pub fn frames(&self) -> &FrameCollection {
        &self.frames
    }

    pub fn source_released(&self) -> bool {
        self.source.is_released()
    }

    pub fn termination(&self) -> watch::Receiver<bool> {
        self.source.termination()
    }

    pub fn status(&self) -> CaptureStatus {
        CaptureStatus {
            state: self.state,
            mode: self.mode,
            frame_count: self.frames.len(),
        }
    }

    /// Switch capture policy. Already-captured frames are kept.
    pub fn set_mode(&mut self, kind: ModeKind) -> Result<(), CaptureError> {
        self.ensure_active()?;
        if self.mode.kind() == kind {
            return Ok(());
        }
        log::info!("[CAPTURE] Mode {:?} -> {:?}", self.mode.kind(), kind);
        self.mode = kind.into();
        Ok(())
    }

    /// Start or pause timer sampling.
    pub fn set_recording(&mut self, on: bool) -> Result<(), CaptureError> {
        self.ensure_active()?;
        let CaptureMode::TimerLong { recording } = &mut self.mode else {
            return Err(CaptureError::NotTimerMode);
        };
        *recording = if on { Recording::On } else { Recording::Off };
        log::info!(
            "[CAPTURE] Recording {} ({} frames so far)",
            if on { "started" } else { "paused" },
            self.frames.len()
        );
        Ok(())
    }

    /// Flip the recording flag. Returns the new value.
    pub fn toggle_recording(&mut self) -> Result<bool, CaptureError> {
        let next = !self.mode.is_recording();
        self.set_recording(next)?;
        Ok(next)
    }

    /// Manual capture.
    ///
    /// Returns the new frame's ID, or `None` if the source had nothing to
    /// give. In single mode the session finishes straight after.
    pub fn trigger(&mut self) -> Result<Option<FrameId>, CaptureError> {
        self.ensure_active()?;
        let captured = self.capture();
        if self.mode == CaptureMode::Single && captured.is_some() {
            self.complete(CaptureOutcome::Finished(self.frames.clone()), SessionState::Finished);
        }
        Ok(captured)
    }

    /// Timer tick. Ignored unless active and recording.
    pub fn tick(&mut self) -> Option<FrameId> {
        if !self.is_recording() {
            return None;
        }
        self.capture()
    }

    /// End the session and hand over the frames.
    ///
    /// Refused while the collection is empty; the session stays active.
    pub fn finish(&mut self) -> Result<(), CaptureError> {
        self.ensure_active()?;
        if self.frames.is_empty() {
            return Err(CaptureError::NoFrames);
        }
        self.complete(CaptureOutcome::Finished(self.frames.clone()), SessionState::Finished);
        Ok(())
    }

    /// Abandon the session. Frames are discarded. No-op once ended.
    pub fn cancel(&mut self) {
        if !self.is_active() {
            return;
        }
        self.complete(CaptureOutcome::Cancelled, SessionState::Cancelled);
    }

    /// The stream ended outside our control.
    pub fn source_ended(&mut self) {
        if !self.is_active() {
            return;
        }
        log::info!("[CAPTURE] Stream ended externally");
        if self.frames.is_empty() {
            self.complete(CaptureOutcome::Cancelled, SessionState::Cancelled);
        } else {
            self.complete(CaptureOutcome::Stopped(self.frames.clone()), SessionState::Stopped);
        }
    }

    /// Take the outcome once the session has left `Active`.
    pub fn take_outcome(&mut self) -> Option<CaptureOutcome> {
        self.outcome.take()
    }

    fn ensure_active(&self) -> Result<(), CaptureError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(CaptureError::NotActive)
        }
    }

    fn capture(&mut self) -> Option<FrameId> {
        let raster = self.source.grab()?;
        let frame = match Frame::from_raster(&raster) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("[CAPTURE] Dropping sample: {}", e);
                return None;
            }
        };
        let id = frame.id();
        log::debug!(
            "[CAPTURE] Frame {} ({}x{}, {} bytes)",
            id,
            frame.width(),
            frame.height(),
            frame.image().len()
        );
        self.frames = std::mem::take(&mut self.frames).append(frame);
        Some(id)
    }

    fn complete(&mut self, outcome: CaptureOutcome, state: SessionState) {
        self.source.release();
        // Leaving timer mode's recording state disarms the driver's timer.
        if let CaptureMode::TimerLong { recording } = &mut self.mode {
            *recording = Recording::Off;
        }
        if matches!(outcome, CaptureOutcome::Cancelled) {
            self.frames = FrameCollection::new();
        }
        log::info!("[CAPTURE] Session {:?} with {} frames", state, self.frames.len());
        self.state = state;
        self.outcome = Some(outcome);
    }
}
