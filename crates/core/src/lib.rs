//! Docket Preview Core Library
//!
//! File model, classification and the per-renderer state machines of the
//! preview engine. Nothing here performs IO; resolution and rendering live in
//! the `docket-preview` crate.

pub mod classify;
pub mod error;
pub mod file;
pub mod search;
pub mod transform;
pub mod transport;
pub mod viewport;

pub use classify::{category_for_extension, classify, Classification, ClassifyRequest, ClassifyStage};
pub use error::PreviewError;
pub use file::{FileReference, RenderCategory};
pub use search::{PageTextSource, PaginatedSearchIndex, SearchError, SearchHit, SearchState};
pub use transform::{
    fit_scale, PanOffset, Rotation, Size, TransformController, TransformState, WheelOutcome, Zoom,
    ZOOM_STEPS,
};
pub use transport::{
    ControlsAutoHide, MediaKind, PlaybackPhase, PlaybackState, TransportController, TransportError,
    PLAYBACK_RATES,
};
pub use viewport::{
    compute_window, Axis, PageLayout, Rect, VirtualWindow, Virtualizer, VirtualizerConfig, ViewportState,
};
