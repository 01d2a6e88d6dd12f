//! Viewport-driven virtualization
//!
//! Only items near the viewport are materialized as real content; the rest
//! are placeholders of approximately the right size so scroll extents stay
//! stable. The window computation is a pure function of the container rect
//! and a per-item rect lookup, so it runs without a rendering surface.
//!
//! [`Virtualizer`] owns the resulting [`ViewportState`] and is the only place
//! the materialized set changes. Every recomputation carries a generation
//! tag; results computed for a superseded file are dropped.

use docket_preview_scheduler::{FrameThrottle, Generation};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::time::Instant;

/// Axis-aligned rectangle in container coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Overlap test; touching edges do not count
    pub fn intersects(&self, other: &Rect) -> bool {
        self.right() > other.x && self.x < other.right() && self.bottom() > other.y && self.y < other.bottom()
    }

    /// Grow on every side by `margin`
    pub fn expand(&self, margin: f32) -> Rect {
        Rect::new(
            self.x - margin,
            self.y - margin,
            self.width + margin * 2.0,
            self.height + margin * 2.0,
        )
    }

    fn center_on(&self, axis: Axis) -> f32 {
        match axis {
            Axis::Vertical => self.y + self.height / 2.0,
            Axis::Horizontal => self.x + self.width / 2.0,
        }
    }
}

/// Scroll axis; paginated documents scroll vertically, media strips horizontally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Axis {
    #[default]
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VirtualizerConfig {
    /// Pixels added around the container for near-visible detection
    pub margin_px: f32,
    /// Extra items materialized on each side of the near-visible range
    pub buffer: usize,
    pub axis: Axis,
}

impl Default for VirtualizerConfig {
    fn default() -> Self {
        Self {
            margin_px: 200.0,
            buffer: 2,
            axis: Axis::Vertical,
        }
    }
}

impl VirtualizerConfig {
    pub fn with_margin(mut self, margin_px: f32) -> Self {
        self.margin_px = margin_px.max(0.0);
        self
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn with_axis(mut self, axis: Axis) -> Self {
        self.axis = axis;
        self
    }
}

/// Result of one window computation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VirtualWindow {
    /// Items intersecting the margin-expanded container
    pub visible: Option<RangeInclusive<usize>>,
    /// Visible range grown by the buffer, clamped to the item count
    pub buffered: Option<RangeInclusive<usize>>,
    /// Near-visible item whose center is closest to the container center
    pub current: Option<usize>,
}

/// Compute the near-visible, buffered and current items
///
/// `item_rect` returns the bounding box of item `i` if it is laid out, in
/// the same coordinate space as `container`. Items without a rect are skipped.
pub fn compute_window<F>(total: usize, container: Rect, config: &VirtualizerConfig, mut item_rect: F) -> VirtualWindow
where
    F: FnMut(usize) -> Option<Rect>,
{
    let near = container.expand(config.margin_px);
    let center = container.center_on(config.axis);

    let mut bounds: Option<(usize, usize)> = None;
    let mut current: Option<(usize, f32)> = None;

    for index in 0..total {
        let Some(rect) = item_rect(index) else {
            continue;
        };
        if !rect.intersects(&near) {
            continue;
        }

        bounds = Some(match bounds {
            Some((min, max)) => (min.min(index), max.max(index)),
            None => (index, index),
        });

        let distance = (rect.center_on(config.axis) - center).abs();
        // Strict comparison keeps the lower index on ties
        if current.map_or(true, |(_, best)| distance < best) {
            current = Some((index, distance));
        }
    }

    let Some((min, max)) = bounds else {
        return VirtualWindow::default();
    };

    VirtualWindow {
        visible: Some(min..=max),
        buffered: Some(buffer_range(min, max, config.buffer, total)),
        current: current.map(|(index, _)| index),
    }
}

fn buffer_range(min: usize, max: usize, buffer: usize, total: usize) -> RangeInclusive<usize> {
    let last = total.saturating_sub(1);
    min.saturating_sub(buffer)..=max.saturating_add(buffer).min(last)
}

/// Item extents along the scroll axis
///
/// Produces the rect table the window computation consumes, including
/// placeholder rects for items that are not materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    /// Unscaled main-axis extent per item
    extents: Vec<f32>,
    /// Unscaled cross-axis extent per item
    cross_extents: Vec<f32>,
    spacing: f32,
    scale: f32,
    axis: Axis,
    /// Scaled start offset per item
    offsets: Vec<f32>,
}

impl PageLayout {
    /// Layout from per-item `(width, height)` pairs at scale 1
    pub fn new(sizes: &[(f32, f32)], spacing: f32, axis: Axis) -> Self {
        let (extents, cross_extents) = sizes
            .iter()
            .map(|&(width, height)| match axis {
                Axis::Vertical => (height.max(0.0), width.max(0.0)),
                Axis::Horizontal => (width.max(0.0), height.max(0.0)),
            })
            .unzip();

        let mut layout = Self {
            extents,
            cross_extents,
            spacing: spacing.max(0.0),
            scale: 1.0,
            axis,
            offsets: Vec::new(),
        };
        layout.rebuild_offsets();
        layout
    }

    /// Layout of `count` identically sized items
    pub fn uniform(count: usize, width: f32, height: f32, spacing: f32, axis: Axis) -> Self {
        Self::new(&vec![(width, height); count], spacing, axis)
    }

    fn rebuild_offsets(&mut self) {
        let mut cursor = 0.0;
        self.offsets.clear();
        for extent in &self.extents {
            self.offsets.push(cursor);
            cursor += extent * self.scale + self.spacing;
        }
    }

    pub fn len(&self) -> usize {
        self.extents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Change the render scale; item extents grow but spacing does not
    pub fn set_scale(&mut self, scale: f32) {
        if scale.is_finite() && scale > 0.0 && scale != self.scale {
            self.scale = scale;
            self.rebuild_offsets();
        }
    }

    /// Start offset of an item along the scroll axis
    pub fn offset_of(&self, index: usize) -> Option<f32> {
        self.offsets.get(index).copied()
    }

    /// Scaled extent of an item along the scroll axis
    pub fn extent_of(&self, index: usize) -> Option<f32> {
        self.extents.get(index).map(|extent| extent * self.scale)
    }

    /// Scaled length of the whole strip
    pub fn total_extent(&self) -> f32 {
        match (self.offsets.last(), self.extents.last()) {
            (Some(offset), Some(extent)) => offset + extent * self.scale,
            _ => 0.0,
        }
    }

    /// Item covering `offset`; offsets in spacing resolve to the next item
    pub fn item_at_offset(&self, offset: f32) -> usize {
        let position = self.offsets.partition_point(|start| *start <= offset);
        let index = position.saturating_sub(1);

        match (self.offset_of(index), self.extent_of(index)) {
            (Some(start), Some(extent)) if offset > start + extent && index + 1 < self.len() => index + 1,
            _ => index,
        }
    }

    /// Rect of an item relative to a container scrolled by `scroll_offset`
    pub fn rect_of(&self, index: usize, scroll_offset: f32) -> Option<Rect> {
        let start = self.offset_of(index)? - scroll_offset;
        let extent = self.extent_of(index)?;
        let cross = self.cross_extents[index] * self.scale;

        Some(match self.axis {
            Axis::Vertical => Rect::new(0.0, start, cross, extent),
            Axis::Horizontal => Rect::new(start, 0.0, extent, cross),
        })
    }

    /// Scroll offset that centers `index` in a viewport of `viewport_extent`
    pub fn centered_offset(&self, index: usize, viewport_extent: f32) -> Option<f32> {
        let start = self.offset_of(index)?;
        let extent = self.extent_of(index)?;
        let max_offset = (self.total_extent() - viewport_extent).max(0.0);

        Some((start + extent / 2.0 - viewport_extent / 2.0).clamp(0.0, max_offset))
    }
}

/// Per-renderer viewport bookkeeping
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewportState {
    pub total_items: usize,
    /// Items mounted as real content
    pub materialized: BTreeSet<usize>,
    /// Item nearest the viewport center
    pub current_item: usize,
    /// Generation the state belongs to
    pub generation: u64,
}

/// Owner of [`ViewportState`] for one open file
#[derive(Debug)]
pub struct Virtualizer {
    config: VirtualizerConfig,
    generation: Generation,
    throttle: FrameThrottle,
    state: ViewportState,
    window: VirtualWindow,
    /// Sizes or count changed since the last computation
    dirty: bool,
}

impl Virtualizer {
    pub fn new(config: VirtualizerConfig, generation: Generation) -> Self {
        let state = ViewportState {
            generation: generation.value(),
            ..ViewportState::default()
        };

        Self {
            config,
            generation,
            throttle: FrameThrottle::for_60fps(),
            state,
            window: VirtualWindow::default(),
            dirty: true,
        }
    }

    pub fn config(&self) -> &VirtualizerConfig {
        &self.config
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn window(&self) -> &VirtualWindow {
        &self.window
    }

    pub fn current_item(&self) -> usize {
        self.state.current_item
    }

    pub fn is_materialized(&self, index: usize) -> bool {
        self.state.materialized.contains(&index)
    }

    /// Update the item count; forces the next recomputation
    pub fn set_total_items(&mut self, total: usize) {
        if self.state.total_items != total {
            self.state.total_items = total;
            self.state.materialized.retain(|index| *index < total);
            self.state.current_item = self.state.current_item.min(total.saturating_sub(1));
            self.dirty = true;
        }
    }

    /// Item sizes changed (zoom); forces the next recomputation
    pub fn invalidate_sizes(&mut self) {
        self.dirty = true;
    }

    /// Whether a scroll at `now` should recompute immediately
    ///
    /// Scrolls are throttled to one computation per frame; a pending size or
    /// count change always passes.
    pub fn should_recompute(&mut self, now: Instant) -> bool {
        if self.generation.is_stale() {
            return false;
        }
        if self.dirty {
            self.throttle.force(now);
            return true;
        }
        self.throttle.request(now)
    }

    /// Whether a scroll deferred by the throttle is now due
    pub fn poll_deferred(&mut self, now: Instant) -> bool {
        !self.generation.is_stale() && self.throttle.poll_pending(now)
    }

    /// Recompute the window for `tag`'s generation and apply it
    ///
    /// Returns `None` without touching state when `tag` belongs to another
    /// generation or has been superseded.
    pub fn recompute<F>(&mut self, tag: &Generation, container: Rect, item_rect: F) -> Option<&VirtualWindow>
    where
        F: FnMut(usize) -> Option<Rect>,
    {
        if *tag != self.generation || tag.is_stale() {
            tracing::debug!(
                tag = tag.value(),
                owner = self.generation.value(),
                "discarding stale viewport recomputation"
            );
            return None;
        }

        let window = compute_window(self.state.total_items, container, &self.config, item_rect);
        self.apply(window);
        Some(&self.window)
    }

    fn apply(&mut self, window: VirtualWindow) {
        let total = self.state.total_items;
        self.dirty = false;

        if total == 0 {
            self.state.materialized.clear();
            self.state.current_item = 0;
            self.window = window;
            return;
        }

        if let Some(current) = window.current {
            self.state.current_item = current;
        }

        let buffered = window.buffered.clone().unwrap_or_else(|| {
            let current = self.state.current_item.min(total - 1);
            buffer_range(current, current, self.config.buffer, total)
        });

        let before = self.state.materialized.len();
        self.state.materialized = buffered.clone().collect();
        if before != self.state.materialized.len() {
            tracing::debug!(start = buffered.start(), end = buffered.end(), "materialized range changed");
        }

        self.window = window;
    }
}
