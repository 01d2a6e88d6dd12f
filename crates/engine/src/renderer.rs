//! Renderer sessions
//!
//! One session per mounted file. Each session owns the state machines its
//! category needs, keyed to the generation the dispatcher mounted it under:
//!
//! - documents and plain text: a [`PagedView`] (transform, virtualizer and
//!   search over a vertical page strip)
//! - images: a transform over a single pannable surface
//! - audio and video: a transport plus controls auto-hide

use crate::config::PreviewConfig;
use crate::resolver::ResolvedResource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docket_preview_cache::LocalHandleRegistry;
use docket_preview_core::{
    Axis, ControlsAutoHide, FileReference, MediaKind, PageLayout, PageTextSource, PaginatedSearchIndex, PreviewError,
    Rect, RenderCategory, SearchError, SearchState, Size, TransformController, TransportController, TransportError,
    VirtualWindow, Virtualizer, VirtualizerConfig, WheelOutcome, Zoom,
};
use docket_preview_scheduler::Generation;
use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Gap between pages in the strip
pub const PAGE_SPACING_PX: f32 = 16.0;

/// Nominal page size for plain text (US Letter at 96 DPI)
pub const TEXT_PAGE_SIZE: (f32, f32) = (816.0, 1056.0);

/// Page separator in paged plain text
pub const FORM_FEED: char = '\u{000C}';

/// Formats whose headers are verified before an image is mounted
const VERIFIED_IMAGE_FORMATS: [ImageFormat; 7] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::WebP,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
    ImageFormat::Ico,
];

/// Plain text split into form-feed separated pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPages {
    pages: Vec<String>,
}

impl TextPages {
    /// Decode UTF-8 bytes; anything else is a decode failure
    pub fn decode(bytes: &[u8]) -> Result<Self, PreviewError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|error| PreviewError::DecodeFailure(format!("text is not valid UTF-8: {error}")))?;
        Ok(Self::from_text(text))
    }

    pub fn from_text(text: &str) -> Self {
        let text = text.strip_suffix(FORM_FEED).unwrap_or(text);
        Self {
            pages: text.split(FORM_FEED).map(str::to_string).collect(),
        }
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[async_trait]
impl PageTextSource for TextPages {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    async fn extract_text(&self, item: usize) -> Result<String, SearchError> {
        self.pages.get(item).cloned().ok_or(SearchError::Extraction {
            item,
            reason: "page out of range".to_string(),
        })
    }
}

/// Vertical page strip with zoom, virtualization and search
#[derive(Debug)]
pub struct PagedView {
    generation: Generation,
    transform: TransformController,
    /// Unrotated page sizes at scale 1
    page_sizes: Vec<(f32, f32)>,
    layout: PageLayout,
    virtualizer: Virtualizer,
    search: PaginatedSearchIndex,
    viewport: Size,
    scroll_offset: f32,
}

impl PagedView {
    pub fn new(generation: Generation, config: VirtualizerConfig) -> Self {
        Self {
            transform: TransformController::new(),
            page_sizes: Vec::new(),
            layout: PageLayout::new(&[], PAGE_SPACING_PX, Axis::Vertical),
            virtualizer: Virtualizer::new(config, generation.clone()),
            search: PaginatedSearchIndex::new(generation.clone()),
            viewport: Size::new(0.0, 0.0),
            scroll_offset: 0.0,
            generation,
        }
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    pub fn transform(&self) -> &TransformController {
        &self.transform
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    pub fn window(&self) -> &VirtualWindow {
        self.virtualizer.window()
    }

    pub fn search_state(&self) -> &SearchState {
        self.search.state()
    }

    pub fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    pub fn current_item(&self) -> usize {
        self.virtualizer.current_item()
    }

    pub fn is_materialized(&self, item: usize) -> bool {
        self.virtualizer.is_materialized(item)
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll_offset
    }

    /// Page sizes reported once the document is parsed
    pub fn set_pages(&mut self, sizes: &[(f32, f32)]) {
        self.page_sizes = sizes.to_vec();
        self.virtualizer.set_total_items(sizes.len());
        self.relayout();
    }

    pub fn set_viewport(&mut self, viewport: Size) {
        self.viewport = viewport;
        self.relayout();
    }

    fn content_size(&self) -> Size {
        self.page_sizes
            .iter()
            .fold(Size::new(0.0, 0.0), |acc, &(width, height)| {
                Size::new(acc.width.max(width), acc.height.max(height))
            })
    }

    /// Render scale for the current zoom and viewport
    pub fn scale(&self) -> f32 {
        self.transform.effective_scale(self.viewport, self.content_size())
    }

    /// Rebuild the strip after a size, zoom or rotation change, keeping the
    /// current page centered
    fn relayout(&mut self) {
        let current = self.virtualizer.current_item();
        let rotated: Vec<(f32, f32)> = if self.transform.rotation().swaps_axes() {
            self.page_sizes.iter().map(|&(width, height)| (height, width)).collect()
        } else {
            self.page_sizes.clone()
        };

        self.layout = PageLayout::new(&rotated, PAGE_SPACING_PX, Axis::Vertical);
        self.layout.set_scale(self.scale());
        self.virtualizer.invalidate_sizes();
        if !self.jump_to(current) {
            self.scroll_offset = 0.0;
            self.refresh();
        }
    }

    fn refresh(&mut self) -> bool {
        let container = Rect::new(0.0, 0.0, self.viewport.width, self.viewport.height);
        let scroll = self.scroll_offset;
        let layout = &self.layout;
        self.virtualizer
            .recompute(&self.generation, container, |item| layout.rect_of(item, scroll))
            .is_some()
    }

    fn clamp_offset(&self, offset: f32) -> f32 {
        let max = (self.layout.total_extent() - self.viewport.height).max(0.0);
        if offset.is_nan() {
            0.0
        } else {
            offset.clamp(0.0, max)
        }
    }

    /// Scroll to an absolute offset; returns whether the window was recomputed
    pub fn scroll_to(&mut self, offset: f32, now: Instant) -> bool {
        self.scroll_offset = self.clamp_offset(offset);
        self.virtualizer.should_recompute(now) && self.refresh()
    }

    pub fn scroll_by(&mut self, delta: f32, now: Instant) -> bool {
        self.scroll_to(self.scroll_offset + delta, now)
    }

    /// Run a scroll recomputation deferred by the frame throttle
    pub fn poll(&mut self, now: Instant) -> bool {
        self.virtualizer.poll_deferred(now) && self.refresh()
    }

    /// Center `item` in the viewport and materialize it
    pub fn jump_to(&mut self, item: usize) -> bool {
        let Some(offset) = self.layout.centered_offset(item, self.viewport.height) else {
            return false;
        };
        self.scroll_offset = offset;
        self.refresh()
    }

    pub fn zoom_in(&mut self) -> Zoom {
        let zoom = self.transform.zoom_in();
        self.relayout();
        zoom
    }

    pub fn zoom_out(&mut self) -> Zoom {
        let zoom = self.transform.zoom_out();
        self.relayout();
        zoom
    }

    pub fn set_zoom(&mut self, level: f32) -> bool {
        let changed = self.transform.set_zoom(level);
        if changed {
            self.relayout();
        }
        changed
    }

    pub fn fit_to_view(&mut self) {
        self.transform.fit_to_view();
        self.relayout();
    }

    pub fn rotate_clockwise(&mut self) {
        self.transform.rotate_clockwise();
        self.relayout();
    }

    pub fn pan_by(&mut self, dx: f32, dy: f32) -> bool {
        self.transform.pan_by(dx, dy)
    }

    pub fn reset_pan(&mut self) {
        self.transform.reset_pan();
    }

    /// Zoom on a zoom-intent gesture, otherwise scroll the strip
    pub fn wheel(&mut self, delta: f32, zoom_intent: bool, now: Instant) -> WheelOutcome {
        let outcome = self.transform.wheel(delta, zoom_intent);
        match outcome {
            WheelOutcome::Zoomed => self.relayout(),
            WheelOutcome::Scroll => {
                self.scroll_by(delta, now);
            }
        }
        outcome
    }

    /// Search `source` and jump to the first match; returns the match count
    pub async fn search<S>(&mut self, source: &S, query: &str) -> Result<usize, SearchError>
    where
        S: PageTextSource + ?Sized,
    {
        let count = self.search.search(source, query).await?.len();
        if let Some(item) = self.search.state().current_hit().map(|hit| hit.item) {
            self.jump_to(item);
        }
        Ok(count)
    }

    pub fn next_match(&mut self) -> Option<usize> {
        let item = self.search.next_match()?;
        self.jump_to(item);
        Some(item)
    }

    pub fn previous_match(&mut self) -> Option<usize> {
        let item = self.search.previous_match()?;
        self.jump_to(item);
        Some(item)
    }

    pub fn clear_search(&mut self) {
        self.search.clear();
    }
}

/// Paginated document embedded by the external document engine
#[derive(Debug)]
pub struct DocumentSession {
    source: String,
    expires_at: Option<DateTime<Utc>>,
    engine_url: Option<String>,
    pub view: PagedView,
}

impl DocumentSession {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn engine_url(&self) -> Option<&str> {
        self.engine_url.as_deref()
    }

    /// The engine parsed the document and reported its page sizes
    pub fn on_pages_loaded(&mut self, sizes: &[(f32, f32)]) {
        tracing::debug!(pages = sizes.len(), "document pages loaded");
        self.view.set_pages(sizes);
    }

    /// Whether the signed source must be re-resolved before reloading
    pub fn is_source_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// Single pannable image
#[derive(Debug)]
pub struct ImageSession {
    generation: Generation,
    source: String,
    natural_size: Option<Size>,
    viewport: Size,
    pub transform: TransformController,
}

impl ImageSession {
    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Pixel size read from the image header, when verifiable
    pub fn natural_size(&self) -> Option<Size> {
        self.natural_size
    }

    pub fn set_viewport(&mut self, viewport: Size) {
        self.viewport = viewport;
    }

    /// Render scale; an unknown natural size is treated as viewport-sized
    pub fn scale(&self) -> f32 {
        let content = self.natural_size.unwrap_or(self.viewport);
        self.transform.effective_scale(self.viewport, content)
    }
}

/// Audio or video player
#[derive(Debug)]
pub struct MediaSession {
    generation: Generation,
    source: String,
    pub transport: TransportController,
    controls: ControlsAutoHide,
}

impl MediaSession {
    fn new(generation: Generation, source: String, kind: MediaKind, hide_after: Duration) -> Self {
        let mut transport = TransportController::new(kind);
        if let Err(error) = transport.begin_loading() {
            tracing::warn!(%error, "transport refused to load");
        }

        Self {
            generation,
            source,
            transport,
            controls: ControlsAutoHide::new(hide_after),
        }
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn controls_visible(&self) -> bool {
        self.controls.is_visible()
    }

    fn is_playing(&self) -> bool {
        self.transport.state().playing
    }

    /// Pointer moved over the player
    pub fn pointer_activity(&mut self, now: Instant) {
        let playing = self.is_playing();
        self.controls.on_activity(now, playing);
    }

    pub fn toggle_play(&mut self, now: Instant) -> Result<(), TransportError> {
        self.transport.toggle_play()?;
        let playing = self.is_playing();
        self.controls.on_playing_changed(now, playing);
        Ok(())
    }

    /// Advance timers; returns whether controls are visible
    pub fn tick(&mut self, now: Instant) -> bool {
        let playing = self.is_playing();
        self.controls.tick(now, playing)
    }

    fn teardown(&mut self) {
        self.controls.clear();
    }
}

/// Plain text shown as a page strip
#[derive(Debug)]
pub struct TextSession {
    pages: TextPages,
    pub view: PagedView,
}

impl TextSession {
    pub fn pages(&self) -> &TextPages {
        &self.pages
    }

    pub async fn search(&mut self, query: &str) -> Result<usize, SearchError> {
        self.view.search(&self.pages, query).await
    }
}

/// The renderer mounted for one file
#[derive(Debug)]
pub enum RendererSession {
    Document(DocumentSession),
    Image(ImageSession),
    Media(MediaSession),
    Text(TextSession),
}

impl RendererSession {
    /// Build the renderer for `category` over a resolved resource
    ///
    /// Image headers and text encoding are checked here; bytes that do not
    /// fit the category are a decode failure.
    pub fn open(
        category: RenderCategory,
        file: &FileReference,
        resource: &ResolvedResource,
        registry: &LocalHandleRegistry,
        config: &PreviewConfig,
        generation: Generation,
    ) -> Result<Self, PreviewError> {
        let source = resource.source();
        let bytes = resource.local_handle().and_then(|handle| registry.bytes(handle));

        let session = match category {
            RenderCategory::Document => RendererSession::Document(DocumentSession {
                source,
                expires_at: match resource {
                    ResolvedResource::SignedUrl(signed) => Some(signed.expires_at),
                    ResolvedResource::Local(_) => None,
                },
                engine_url: config.document_engine_url.clone(),
                view: PagedView::new(generation, config.virtualizer()),
            }),
            RenderCategory::Image => {
                let natural_size = match &bytes {
                    Some(bytes) => image_dimensions(&file.name, bytes)?,
                    None => None,
                };
                RendererSession::Image(ImageSession {
                    generation,
                    source,
                    natural_size,
                    viewport: Size::new(0.0, 0.0),
                    transform: TransformController::new(),
                })
            }
            RenderCategory::Audio => RendererSession::Media(MediaSession::new(
                generation,
                source,
                MediaKind::Audio,
                config.controls_hide_after(),
            )),
            RenderCategory::Video => RendererSession::Media(MediaSession::new(
                generation,
                source,
                MediaKind::Video,
                config.controls_hide_after(),
            )),
            RenderCategory::PlainText => {
                let bytes: Arc<[u8]> = bytes.ok_or_else(|| {
                    PreviewError::DecodeFailure("text preview needs the file bytes".to_string())
                })?;
                let pages = TextPages::decode(&bytes)?;
                let mut view = PagedView::new(generation, config.virtualizer());
                view.set_pages(&vec![TEXT_PAGE_SIZE; pages.len()]);
                RendererSession::Text(TextSession { pages, view })
            }
            RenderCategory::Unsupported => {
                return Err(PreviewError::Unsupported {
                    name: file.name.clone(),
                })
            }
        };

        Ok(session)
    }

    pub fn category(&self) -> RenderCategory {
        match self {
            RendererSession::Document(_) => RenderCategory::Document,
            RendererSession::Image(_) => RenderCategory::Image,
            RendererSession::Media(media) => match media.transport.kind() {
                MediaKind::Audio => RenderCategory::Audio,
                MediaKind::Video => RenderCategory::Video,
            },
            RendererSession::Text(_) => RenderCategory::PlainText,
        }
    }

    pub fn generation(&self) -> &Generation {
        match self {
            RendererSession::Document(document) => document.view.generation(),
            RendererSession::Image(image) => image.generation(),
            RendererSession::Media(media) => media.generation(),
            RendererSession::Text(text) => text.view.generation(),
        }
    }

    /// Number of pages, for paginated sessions
    pub fn page_count(&self) -> Option<usize> {
        match self {
            RendererSession::Document(document) => Some(document.view.page_count()),
            RendererSession::Text(text) => Some(text.view.page_count()),
            _ => None,
        }
    }

    /// Clear timers before the session is dropped
    pub fn teardown(&mut self) {
        if let RendererSession::Media(media) = self {
            media.teardown();
        }
    }
}

/// Verify an image header and read its pixel size
///
/// Formats that cannot be verified (SVG, HEIC, AVIF) pass with no size.
fn image_dimensions(name: &str, bytes: &[u8]) -> Result<Option<Size>, PreviewError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|error| PreviewError::DecodeFailure(error.to_string()))?;

    let format = reader.format().or_else(|| {
        Path::new(name)
            .extension()
            .and_then(ImageFormat::from_extension)
    });
    let Some(format) = format.filter(|format| VERIFIED_IMAGE_FORMATS.contains(format)) else {
        return Ok(None);
    };

    reader.set_format(format);
    let (width, height) = reader
        .into_dimensions()
        .map_err(|error| PreviewError::DecodeFailure(format!("{name}: {error}")))?;
    Ok(Some(Size::new(width as f32, height as f32)))
}
