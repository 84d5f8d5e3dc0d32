//! Hand-off formats for the finished composite.
//!
//! Writing the file is the caller's job; these helpers only shape the
//! payload and name.

use crate::stitch::CompositeImage;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::time::{SystemTime, UNIX_EPOCH};

/// Self-contained `data:` URL for the composite.
pub fn to_data_url(composite: &CompositeImage) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(composite.png()))
}

/// Bare base64 of the composite's PNG bytes.
pub fn to_base64(composite: &CompositeImage) -> String {
    STANDARD.encode(composite.png())
}

/// `snapstream-stitched-<unix millis>.png`
pub fn suggested_filename(at: SystemTime) -> String {
    let millis = at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("snapstream-stitched-{}.png", millis)
}
