//! Sequential compositor and composite publishing.
//!
//! Frames are decoded one at a time, in collection order. Each decode is
//! awaited and its pixels placed before the next decode starts. This is
//! what keeps bands in order; do not turn it into a fan-out.
//!
//! Every render takes a generation number when it starts. Only the render
//! holding the newest generation may publish, so a slow render over an old
//! collection can never overwrite the composite of a newer one.

use super::layout::{self, Layout};
use super::{CompositeImage, StitchError};
use crate::capture::raster;
use crate::frame::{Frame, FrameCollection};
use image::{imageops, Rgba, RgbaImage};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Canvas fill behind narrower frames. Frame pixels are copied over it
/// verbatim.
const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Turns a frame's payload back into pixels.
pub trait FrameDecoder: Send + Sync + 'static {
    fn decode(&self, frame: &Frame) -> impl Future<Output = Result<RgbaImage, StitchError>> + Send;
}

/// Decodes payloads with `image`, off the async executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngDecoder;

impl FrameDecoder for PngDecoder {
    async fn decode(&self, frame: &Frame) -> Result<RgbaImage, StitchError> {
        let id = frame.id();
        let payload = frame.payload();
        tokio::task::spawn_blocking(move || raster::decode(&payload))
            .await
            .map_err(|e| StitchError::DecodeTaskFailed(e.to_string()))?
            .map_err(|e| StitchError::Decode {
                id,
                reason: e.to_string(),
            })
    }
}

/// What happened to a render request.
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    /// The composite is now current.
    Published(Arc<CompositeImage>),
    /// The collection was empty; the current composite is now absent.
    Cleared,
    /// A newer render started first; this result was discarded.
    Superseded,
}

/// Stitch a collection once, without publishing anything.
///
/// Returns `Ok(None)` for an empty collection.
pub async fn stitch(frames: &FrameCollection) -> Result<Option<CompositeImage>, StitchError> {
    compose(&PngDecoder, frames, 0).await
}

/// Build the composite for `frames`.
pub async fn compose<D: FrameDecoder>(
    decoder: &D,
    frames: &FrameCollection,
    generation: u64,
) -> Result<Option<CompositeImage>, StitchError> {
    let Some(Layout {
        width,
        height,
        placements,
    }) = layout::plan(frames)
    else {
        return Ok(None);
    };

    let start = std::time::Instant::now();
    let mut canvas = RgbaImage::from_pixel(width, height, BACKGROUND);

    for (frame, placement) in frames.iter().zip(&placements) {
        let pixels = decoder.decode(frame).await?;
        if pixels.dimensions() != (frame.width(), frame.height()) {
            return Err(StitchError::DimensionMismatch {
                id: frame.id(),
                expected: (frame.width(), frame.height()),
                actual: pixels.dimensions(),
            });
        }
        imageops::replace(
            &mut canvas,
            &pixels,
            i64::from(placement.x),
            i64::from(placement.y),
        );
    }

    let png = raster::encode_png(&canvas).map_err(|e| StitchError::Encode(e.to_string()))?;

    log::info!(
        "[STITCH] Composed {} frames into {}x{} ({} bytes) in {}ms",
        frames.len(),
        width,
        height,
        png.len(),
        start.elapsed().as_millis()
    );

    Ok(Some(CompositeImage::new(
        png,
        width,
        height,
        frames.len(),
        generation,
    )))
}

/// Owns the current composite and re-renders on request.
pub struct StitchEngine<D: FrameDecoder = PngDecoder> {
    decoder: D,
    generation: AtomicU64,
    /// Generation of whatever is currently published. Only touched while
    /// holding the watch channel's lock.
    published_generation: AtomicU64,
    current: watch::Sender<Option<Arc<CompositeImage>>>,
}

impl StitchEngine<PngDecoder> {
    pub fn new() -> Self {
        Self::with_decoder(PngDecoder)
    }
}

impl Default for StitchEngine<PngDecoder> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: FrameDecoder> StitchEngine<D> {
    pub fn with_decoder(decoder: D) -> Self {
        Self {
            decoder,
            generation: AtomicU64::new(0),
            published_generation: AtomicU64::new(0),
            current: watch::channel(None).0,
        }
    }

    /// Current composite, if any.
    pub fn current(&self) -> Option<Arc<CompositeImage>> {
        self.current.borrow().clone()
    }

    /// Watch composite replacements.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<CompositeImage>>> {
        self.current.subscribe()
    }

    /// Generation handed to the most recently started render.
    pub fn latest_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Render `frames` and publish the result if nothing newer started.
    ///
    /// On failure the previous composite stays current.
    pub async fn render(&self, frames: FrameCollection) -> Result<RenderOutcome, StitchError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("[STITCH] Render #{} over {} frames", generation, frames.len());

        let composite = match compose(&self.decoder, &frames, generation).await {
            Ok(composite) => composite.map(Arc::new),
            Err(e) => {
                log::error!("[STITCH] Render #{} failed: {}", generation, e);
                return Err(e);
            }
        };

        if !self.publish(generation, composite.clone()) {
            log::debug!("[STITCH] Render #{} superseded", generation);
            return Ok(RenderOutcome::Superseded);
        }

        Ok(match composite {
            Some(composite) => RenderOutcome::Published(composite),
            None => RenderOutcome::Cleared,
        })
    }

    /// Render in the background.
    pub fn schedule(
        self: &Arc<Self>,
        frames: FrameCollection,
    ) -> JoinHandle<Result<RenderOutcome, StitchError>> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.render(frames).await })
    }

    fn publish(&self, generation: u64, composite: Option<Arc<CompositeImage>>) -> bool {
        self.current.send_if_modified(|slot| {
            let newest = self.generation.load(Ordering::SeqCst);
            if generation != newest
                || generation <= self.published_generation.load(Ordering::SeqCst)
            {
                return false;
            }
            self.published_generation.store(generation, Ordering::SeqCst);
            *slot = composite;
            true
        })
    }
}
