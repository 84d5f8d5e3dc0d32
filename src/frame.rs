//! Captured frames and the ordered collection they live in.
//!
//! A `FrameCollection` is the hand-off point between capture and stitching.
//! Every mutation returns a new collection; frames are reference counted,
//! so a render that holds an older snapshot keeps seeing exactly the
//! frames it started with.

use crate::capture::raster::{self, RasterError};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Unique identifier for a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(Uuid);

impl FrameId {
    /// Generate a fresh random frame ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an ID previously handed out by [`FrameId`]'s `Display` impl.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for FrameId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One raster sample taken from a video source.
///
/// The payload is PNG-encoded at capture time. Frames are immutable;
/// cloning one only bumps a reference count.
#[derive(Clone)]
pub struct Frame {
    id: FrameId,
    image: Arc<Vec<u8>>,
    width: u32,
    height: u32,
    captured_at: SystemTime,
}

impl Frame {
    /// Rasterize a sampled video frame into a new `Frame`.
    ///
    /// Assigns a fresh ID and stamps the current wall-clock time.
    pub fn from_raster(raster: &RgbaImage) -> Result<Self, RasterError> {
        let png = raster::encode_png(raster)?;
        Ok(Self {
            id: FrameId::new(),
            image: Arc::new(png),
            width: raster.width(),
            height: raster.height(),
            captured_at: SystemTime::now(),
        })
    }

    /// Build a frame from an already-encoded payload.
    ///
    /// The caller vouches that `width`/`height` match the payload. The
    /// stitcher re-checks this when it decodes.
    pub fn from_encoded(image: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            id: FrameId::new(),
            image: Arc::new(image),
            width,
            height,
            captured_at: SystemTime::now(),
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Encoded image bytes.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Shared handle to the encoded bytes, for moving into blocking tasks.
    pub fn payload(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.image)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    /// Metadata view without the pixel payload.
    pub fn summary(&self) -> FrameSummary {
        let captured_at_ms = self
            .captured_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        FrameSummary {
            id: self.id,
            width: self.width,
            height: self.height,
            captured_at_ms,
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("size", &self.image.len())
            .finish()
    }
}

/// Frame metadata handed to the front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSummary {
    pub id: FrameId,
    pub width: u32,
    pub height: u32,
    pub captured_at_ms: u64,
}

/// Which neighbour to exchange a frame with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// Ordered list of frames. Index 0 is the top of the composite.
#[derive(Debug, Clone, Default)]
pub struct FrameCollection {
    frames: Vec<Frame>,
    /// Same IDs as `frames`, for constant-time duplicate checks.
    index: HashSet<FrameId>,
}

impl FrameCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collection with `frame` added at the end.
    ///
    /// Takes `self` so the push is amortized O(1); clone first to keep the
    /// original. A frame whose ID is already present is ignored.
    #[must_use]
    pub fn append(mut self, frame: Frame) -> Self {
        if !self.index.insert(frame.id()) {
            log::warn!("[FRAMES] Ignoring duplicate frame {}", frame.id());
            return self;
        }
        self.frames.push(frame);
        self
    }

    /// Returns a collection without the frame `id`. No-op if absent.
    #[must_use]
    pub fn delete(&self, id: FrameId) -> Self {
        let mut next = self.clone();
        if next.index.remove(&id) {
            next.frames.retain(|f| f.id() != id);
        }
        next
    }

    /// Returns a collection where frame `id` has traded places with its
    /// neighbour in `direction`.
    ///
    /// No-op if `id` is absent or already at that end of the list.
    #[must_use]
    pub fn swap(&self, id: FrameId, direction: Direction) -> Self {
        let mut next = self.clone();
        let Some(pos) = self.position(id) else {
            return next;
        };
        let neighbour = match direction {
            Direction::Up if pos > 0 => pos - 1,
            Direction::Down if pos + 1 < next.frames.len() => pos + 1,
            _ => return next,
        };
        next.frames.swap(pos, neighbour);
        next
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.frames.iter()
    }

    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.frames.iter().find(|f| f.id() == id)
    }

    pub fn position(&self, id: FrameId) -> Option<usize> {
        self.frames.iter().position(|f| f.id() == id)
    }

    pub fn contains(&self, id: FrameId) -> bool {
        self.index.contains(&id)
    }

    pub fn ids(&self) -> Vec<FrameId> {
        self.frames.iter().map(Frame::id).collect()
    }

    /// Widest frame, or 0 for an empty collection.
    pub fn max_width(&self) -> u32 {
        self.frames.iter().map(Frame::width).max().unwrap_or(0)
    }

    /// Sum of all frame heights.
    pub fn total_height(&self) -> u32 {
        self.frames.iter().map(Frame::height).sum()
    }

    pub fn summaries(&self) -> Vec<FrameSummary> {
        self.frames.iter().map(Frame::summary).collect()
    }
}

impl<'a> IntoIterator for &'a FrameCollection {
    type Item = &'a Frame;
    type IntoIter = std::slice::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

impl FromIterator<Frame> for FrameCollection {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        iter.into_iter().fold(FrameCollection::new(), FrameCollection::append)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> Frame {
        Frame::from_encoded(Vec::new(), width, height)
    }

    fn three() -> (FrameCollection, [FrameId; 3]) {
        let (a, b, c) = (frame(10, 1), frame(20, 2), frame(30, 3));
        let ids = [a.id(), b.id(), c.id()];
        let frames = FrameCollection::new().append(a).append(b).append(c);
        (frames, ids)
    }

    #[test]
    fn append_preserves_order() {
        let (frames, ids) = three();
        assert_eq!(frames.ids(), ids.to_vec());
    }

    #[test]
    fn append_leaves_original_untouched() {
        let (frames, _) = three();
        let longer = frames.clone().append(frame(5, 5));
        assert_eq!(frames.len(), 3);
        assert_eq!(longer.len(), 4);
    }

    #[test]
    fn append_grows_in_place() {
        let mut frames = FrameCollection::new();
        for _ in 0..5 {
            frames = frames.append(frame(1, 1));
        }
        assert!(frames.frames.capacity() > frames.len());
        let before = frames.frames.as_ptr();
        let frames = frames.append(frame(1, 1));
        assert_eq!(frames.frames.as_ptr(), before);
        assert_eq!(frames.index.len(), 6);
    }

    #[test]
    fn snapshot_survives_later_appends() {
        let (frames, ids) = three();
        let snapshot = frames.clone();
        let frames = frames.append(frame(9, 9));
        assert_eq!(snapshot.ids(), ids.to_vec());
        assert_eq!(frames.len(), 4);
        assert!(!snapshot.contains(frames.ids()[3]));
    }

    #[test]
    fn collected_frames_keep_order_and_index() {
        let source: Vec<Frame> = (1..=5).map(|h| frame(2, h)).collect();
        let ids: Vec<FrameId> = source.iter().map(Frame::id).collect();
        let frames: FrameCollection = source.into_iter().collect();
        assert_eq!(frames.ids(), ids);
        assert!(ids.iter().all(|id| frames.contains(*id)));
        let frames = frames.delete(ids[2]);
        assert!(!frames.contains(ids[2]));
        assert_eq!(frames.append(frame(1, 1)).len(), 5);
    }

    #[test]
    fn append_ignores_duplicate_id() {
        let a = frame(10, 10);
        let frames = FrameCollection::new().append(a.clone()).append(a);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn delete_removes_only_target() {
        let (frames, [a, b, c]) = three();
        let frames = frames.delete(b);
        assert_eq!(frames.ids(), vec![a, c]);
        assert_eq!(frames.total_height(), 4);
    }

    #[test]
    fn delete_missing_is_noop() {
        let (frames, ids) = three();
        let frames = frames.delete(FrameId::new());
        assert_eq!(frames.ids(), ids.to_vec());
    }

    #[test]
    fn swap_up_and_down() {
        let (frames, [a, b, c]) = three();
        assert_eq!(frames.swap(b, Direction::Up).ids(), vec![b, a, c]);
        assert_eq!(frames.swap(b, Direction::Down).ids(), vec![a, c, b]);
    }

    #[test]
    fn swap_at_boundary_is_noop() {
        let (frames, [a, b, c]) = three();
        assert_eq!(frames.swap(a, Direction::Up).ids(), vec![a, b, c]);
        assert_eq!(frames.swap(c, Direction::Down).ids(), vec![a, b, c]);
        assert_eq!(frames.swap(FrameId::new(), Direction::Up).ids(), vec![a, b, c]);
    }

    #[test]
    fn dimensions_aggregate() {
        let (frames, _) = three();
        assert_eq!(frames.max_width(), 30);
        assert_eq!(frames.total_height(), 6);
        assert_eq!(FrameCollection::new().max_width(), 0);
    }

    #[test]
    fn from_raster_records_native_size() {
        let raster = RgbaImage::new(7, 3);
        let frame = Frame::from_raster(&raster).unwrap();
        assert_eq!((frame.width(), frame.height()), (7, 3));
        assert_eq!(&frame.image()[..4], &[0x89, 0x50, 0x4E, 0x47]);
    }

    #[test]
    fn frame_ids_are_unique() {
        let ids: std::collections::HashSet<_> = (0..100).map(|_| FrameId::new()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn summary_serializes_camel_case() {
        let summary = frame(4, 2).summary();
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["width"], 4);
        assert!(json.get("capturedAtMs").is_some());
        assert_eq!(
            FrameId::parse(json["id"].as_str().unwrap()).unwrap(),
            summary.id
        );
    }
}
