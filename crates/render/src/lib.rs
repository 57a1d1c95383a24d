//! PDF Compare Render Library
//!
//! The boundary between render orchestration and the external document
//! decoder: decoder traits, cancellable render tasks, surface sizing and the
//! page container the output lands in.

pub mod container;
pub mod decoder;
pub mod surface;

pub use container::PageContainer;
pub use decoder::{
    DecodedDocument, DecodedPage, DocumentDecoder, DocumentSource, RenderError, RenderTask,
    RenderedBitmap,
};
pub use surface::{
    fit_scale, PageViewport, ScaleBounds, SurfaceDescriptor, DEFAULT_MAX_SCALE,
    DEFAULT_MIN_AVAILABLE_WIDTH, DEFAULT_MIN_SCALE,
};
