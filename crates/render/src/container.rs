//! Page container boundary
//!
//! The viewing surface a session renders into. Implementations wrap
//! whatever the host UI uses for page elements. All calls are synchronous
//! and the session only makes them while its ticket is live.

use crate::decoder::RenderedBitmap;
use crate::surface::SurfaceDescriptor;

/// Target a viewer renders pages into.
pub trait PageContainer: Send + Sync {
    /// Width available for a page, in CSS pixels.
    fn available_width(&self) -> f32;

    /// Device pixels per CSS pixel.
    fn device_pixel_ratio(&self) -> f32 {
        1.0
    }

    /// Remove every page element and message.
    fn clear(&self);

    /// Append an empty element for `page` (1-based). Called in ascending
    /// page order before any page is painted.
    fn insert_slot(&self, page: u32);

    /// Paint a finished render into the slot for `surface.page`.
    fn paint(&self, surface: &SurfaceDescriptor, bitmap: RenderedBitmap);

    /// Show a user-visible failure message in place of the document.
    fn show_error(&self, message: &str);
}
