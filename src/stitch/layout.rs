//! Where each frame lands on the composite canvas.

use crate::frame::{FrameCollection, FrameId};

/// Position of one frame on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub id: FrameId,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Canvas size plus one placement per frame, in collection order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub placements: Vec<Placement>,
}

/// Stack frames top to bottom, each centred horizontally.
///
/// Canvas width is the widest frame, height the sum of all heights.
/// Narrower frames sit at `(canvas_width - width) / 2`, rounded down.
/// Returns `None` for an empty collection.
pub fn plan(frames: &FrameCollection) -> Option<Layout> {
    if frames.is_empty() {
        return None;
    }

    let width = frames.max_width();
    let mut y = 0u32;
    let placements = frames
        .iter()
        .map(|frame| {
            let placement = Placement {
                id: frame.id(),
                x: (width - frame.width()) / 2,
                y,
                width: frame.width(),
                height: frame.height(),
            };
            y += frame.height();
            placement
        })
        .collect();

    Some(Layout {
        width,
        height: y,
        placements,
    })
}
