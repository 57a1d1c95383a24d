//! Page viewport and drawing-surface sizing
//!
//! A page is rendered at a scale that fits the container width, and its
//! backing surface is multiplied by the device pixel ratio so output stays
//! crisp on high-density displays.

/// Lower bound for the fit scale, relative to the page's natural size.
pub const DEFAULT_MIN_SCALE: f32 = 0.6;

/// Upper bound for the fit scale, relative to the page's natural size.
pub const DEFAULT_MAX_SCALE: f32 = 1.6;

/// Containers narrower than this are treated as this wide.
pub const DEFAULT_MIN_AVAILABLE_WIDTH: f32 = 200.0;

/// Page dimensions at a given scale, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageViewport {
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

impl PageViewport {
    /// Create a viewport of `width` by `height` at `scale`.
    pub fn new(width: f32, height: f32, scale: f32) -> Self {
        Self { width, height, scale }
    }

    /// The same page at another scale, assuming `self` is linear in scale.
    pub fn rescaled(&self, scale: f32) -> Self {
        if self.scale <= 0.0 {
            return Self { scale, ..*self };
        }
        let factor = scale / self.scale;
        Self { width: self.width * factor, height: self.height * factor, scale }
    }
}

/// Clamp range for the fit-to-width scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleBounds {
    pub min_scale: f32,
    pub max_scale: f32,
    pub min_available_width: f32,
}

impl Default for ScaleBounds {
    fn default() -> Self {
        Self {
            min_scale: DEFAULT_MIN_SCALE,
            max_scale: DEFAULT_MAX_SCALE,
            min_available_width: DEFAULT_MIN_AVAILABLE_WIDTH,
        }
    }
}

/// Scale at which a page of natural (scale 1) width fits `available_width`.
///
/// # Example
///
/// ```
/// use pdf_compare_render::{fit_scale, PageViewport, ScaleBounds};
///
/// let natural = PageViewport::new(600.0, 800.0, 1.0);
/// let bounds = ScaleBounds::default();
///
/// assert_eq!(fit_scale(&natural, 720.0, &bounds), 1.2);
/// // Very wide containers are capped at 1.6x.
/// assert_eq!(fit_scale(&natural, 4000.0, &bounds), 1.6);
/// // Narrow containers are floored at 200px, then at 0.6x.
/// assert_eq!(fit_scale(&natural, 50.0, &bounds), 0.6);
/// ```
pub fn fit_scale(natural: &PageViewport, available_width: f32, bounds: &ScaleBounds) -> f32 {
    let available = if available_width.is_finite() {
        available_width.max(bounds.min_available_width)
    } else {
        bounds.min_available_width
    };

    if natural.width <= 0.0 || !natural.width.is_finite() {
        return 1.0_f32.clamp(bounds.min_scale, bounds.max_scale);
    }

    (available / natural.width).clamp(bounds.min_scale, bounds.max_scale)
}

/// Drawing target for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceDescriptor {
    /// 1-based page number.
    pub page: u32,
    /// Displayed size in CSS pixels.
    pub css_width: f32,
    pub css_height: f32,
    /// Backing store size in device pixels.
    pub pixel_width: u32,
    pub pixel_height: u32,
    /// Page scale the viewport was computed at.
    pub scale: f32,
    pub device_pixel_ratio: f32,
}

impl SurfaceDescriptor {
    /// Size a surface for `viewport` on a display with `device_pixel_ratio`.
    ///
    /// Non-positive or non-finite ratios are treated as 1.
    pub fn for_viewport(page: u32, viewport: &PageViewport, device_pixel_ratio: f32) -> Self {
        let dpr = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        };

        Self {
            page,
            css_width: viewport.width,
            css_height: viewport.height,
            pixel_width: (viewport.width * dpr).floor().max(0.0) as u32,
            pixel_height: (viewport.height * dpr).floor().max(0.0) as u32,
            scale: viewport.scale,
            device_pixel_ratio: dpr,
        }
    }

    /// Transform the decoder should apply, or `None` at a 1:1 pixel ratio.
    pub fn transform(&self) -> Option<[f32; 6]> {
        if (self.device_pixel_ratio - 1.0).abs() < f32::EPSILON {
            None
        } else {
            let r = self.device_pixel_ratio;
            Some([r, 0.0, 0.0, r, 0.0, 0.0])
        }
    }

    /// Bytes needed for an RGBA backing store.
    pub fn rgba_len(&self) -> usize {
        self.pixel_width as usize * self.pixel_height as usize * 4
    }
}
