//! Post-capture editing surface.
//!
//! Holds the frame collection once capture has handed it over and keeps
//! the engine's composite in step with it. `&mut self` on every mutation
//! makes the editor the collection's single writer.

use super::engine::{FrameDecoder, PngDecoder, RenderOutcome, StitchEngine};
use super::{CompositeImage, StitchError};
use crate::frame::{Direction, Frame, FrameCollection, FrameId};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub type RenderTask = JoinHandle<Result<RenderOutcome, StitchError>>;

pub struct FrameEditor<D: FrameDecoder = PngDecoder> {
    frames: FrameCollection,
    engine: Arc<StitchEngine<D>>,
}

impl FrameEditor<PngDecoder> {
    /// Start editing `frames` with a fresh engine.
    pub fn new(frames: FrameCollection) -> Self {
        Self::with_engine(frames, Arc::new(StitchEngine::new()))
    }
}

impl<D: FrameDecoder> FrameEditor<D> {
    pub fn with_engine(frames: FrameCollection, engine: Arc<StitchEngine<D>>) -> Self {
        Self { frames, engine }
    }

    /// Current snapshot of the collection.
    pub fn frames(&self) -> &FrameCollection {
        &self.frames
    }

    pub fn engine(&self) -> &Arc<StitchEngine<D>> {
        &self.engine
    }

    /// Current published composite.
    pub fn composite(&self) -> Option<Arc<CompositeImage>> {
        self.engine.current()
    }

    /// Render the collection as it stands.
    pub fn refresh(&self) -> RenderTask {
        self.engine.schedule(self.frames.clone())
    }

    pub fn append(&mut self, frame: Frame) -> RenderTask {
        self.frames = std::mem::take(&mut self.frames).append(frame);
        self.refresh()
    }

    pub fn delete(&mut self, id: FrameId) -> RenderTask {
        self.frames = self.frames.delete(id);
        self.refresh()
    }

    /// Move frame `id` one slot up or down.
    pub fn move_frame(&mut self, id: FrameId, direction: Direction) -> RenderTask {
        self.frames = self.frames.swap(id, direction);
        self.refresh()
    }

    /// Give the collection back, e.g. to start a new capture on top of it.
    pub fn into_frames(self) -> FrameCollection {
        self.frames
    }
}
