//! Zoom, rotation and pan state shared by the document and image renderers
//!
//! Zoom is either [`Zoom::Fit`] or one numeric level. Stepping moves along a
//! fixed ascending list of discrete scale factors. Entering `Fit` always
//! resets the pan offset, and pan gestures are rejected while in `Fit`.

/// Default discrete scale factors, ascending
pub const ZOOM_STEPS: [f32; 10] = [0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 2.0, 3.0, 4.0, 5.0];

/// Tolerance when comparing a level against a step
const STEP_EPSILON: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zoom {
    /// Scale computed from container and content size at render time
    Fit,
    /// Fixed scale factor (1.0 = 100%)
    Level(f32),
}

impl Zoom {
    pub fn is_fit(&self) -> bool {
        matches!(self, Zoom::Fit)
    }
}

/// Clockwise rotation in quarter turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Normalize any multiple of 90 degrees (negative allowed)
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub fn clockwise(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg90,
            Rotation::Deg90 => Rotation::Deg180,
            Rotation::Deg180 => Rotation::Deg270,
            Rotation::Deg270 => Rotation::Deg0,
        }
    }

    /// Quarter turns swap width and height
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PanOffset {
    pub x: f32,
    pub y: f32,
}

impl PanOffset {
    pub const ORIGIN: PanOffset = PanOffset { x: 0.0, y: 0.0 };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformState {
    pub zoom: Zoom,
    pub rotation: Rotation,
    /// Only meaningful when zoom is not `Fit`
    pub pan: PanOffset,
}

impl Default for TransformState {
    fn default() -> Self {
        Self {
            zoom: Zoom::Fit,
            rotation: Rotation::Deg0,
            pan: PanOffset::ORIGIN,
        }
    }
}

/// Outcome of a wheel or trackpad gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelOutcome {
    /// The gesture changed (or tried to change) the zoom
    Zoomed,
    /// The gesture is a normal scroll and must pass through
    Scroll,
}

/// Zoom/rotation/pan state machine
#[derive(Debug, Clone)]
pub struct TransformController {
    state: TransformState,
    steps: Vec<f32>,
    drag_anchor: Option<(f32, f32)>,
}

impl TransformController {
    /// Create a controller in `Fit` with the default step list
    pub fn new() -> Self {
        Self::with_steps(ZOOM_STEPS.to_vec())
    }

    /// Create a controller with a custom ascending step list
    ///
    /// Non-finite and non-positive entries are dropped; an empty list falls
    /// back to [`ZOOM_STEPS`].
    pub fn with_steps(mut steps: Vec<f32>) -> Self {
        steps.retain(|step| step.is_finite() && *step > 0.0);
        steps.sort_by(f32::total_cmp);
        steps.dedup_by(|a, b| (*a - *b).abs() < STEP_EPSILON);
        if steps.is_empty() {
            steps = ZOOM_STEPS.to_vec();
        }

        Self {
            state: TransformState::default(),
            steps,
            drag_anchor: None,
        }
    }

    pub fn state(&self) -> TransformState {
        self.state
    }

    pub fn zoom(&self) -> Zoom {
        self.state.zoom
    }

    pub fn rotation(&self) -> Rotation {
        self.state.rotation
    }

    pub fn pan(&self) -> PanOffset {
        self.state.pan
    }

    pub fn steps(&self) -> &[f32] {
        &self.steps
    }

    fn min_level(&self) -> f32 {
        self.steps[0]
    }

    fn max_level(&self) -> f32 {
        self.steps[self.steps.len() - 1]
    }

    /// Numeric level used for stepping; `Fit` counts as 100%
    fn stepping_level(&self) -> f32 {
        match self.state.zoom {
            Zoom::Fit => 1.0,
            Zoom::Level(level) => level,
        }
    }

    /// Move one step up; no-op at the top step
    pub fn zoom_in(&mut self) -> Zoom {
        let current = self.stepping_level();
        if let Some(next) = self.steps.iter().copied().find(|step| *step > current + STEP_EPSILON) {
            self.state.zoom = Zoom::Level(next);
        } else if self.state.zoom.is_fit() {
            self.state.zoom = Zoom::Level(self.max_level());
        }
        self.state.zoom
    }

    /// Move one step down; no-op at the bottom step
    pub fn zoom_out(&mut self) -> Zoom {
        let current = self.stepping_level();
        if let Some(prev) = self.steps.iter().rev().copied().find(|step| *step < current - STEP_EPSILON) {
            self.state.zoom = Zoom::Level(prev);
        } else if self.state.zoom.is_fit() {
            self.state.zoom = Zoom::Level(self.min_level());
        }
        self.state.zoom
    }

    /// Set an explicit level, clamped to the step range
    ///
    /// Returns false (state unchanged) for non-finite or non-positive input.
    pub fn set_zoom(&mut self, level: f32) -> bool {
        if !level.is_finite() || level <= 0.0 {
            return false;
        }
        self.state.zoom = Zoom::Level(level.clamp(self.min_level(), self.max_level()));
        true
    }

    /// Enter `Fit` and return the pan offset to the origin
    pub fn fit_to_view(&mut self) {
        self.state.zoom = Zoom::Fit;
        self.state.pan = PanOffset::ORIGIN;
        self.drag_anchor = None;
    }

    pub fn rotate_clockwise(&mut self) -> Rotation {
        self.state.rotation = self.state.rotation.clockwise();
        self.state.rotation
    }

    /// Shift the pan offset; rejected while in `Fit`
    pub fn pan_by(&mut self, dx: f32, dy: f32) -> bool {
        if self.state.zoom.is_fit() || !dx.is_finite() || !dy.is_finite() {
            return false;
        }
        self.state.pan.x += dx;
        self.state.pan.y += dy;
        true
    }

    pub fn reset_pan(&mut self) {
        self.state.pan = PanOffset::ORIGIN;
    }

    /// Start a pointer drag; rejected while in `Fit`
    pub fn begin_drag(&mut self, x: f32, y: f32) -> bool {
        if self.state.zoom.is_fit() {
            return false;
        }
        self.drag_anchor = Some((x, y));
        true
    }

    /// Pan by the pointer delta since the last drag position
    pub fn drag_to(&mut self, x: f32, y: f32) -> bool {
        let Some((anchor_x, anchor_y)) = self.drag_anchor else {
            return false;
        };
        self.drag_anchor = Some((x, y));
        self.pan_by(x - anchor_x, y - anchor_y)
    }

    pub fn end_drag(&mut self) {
        self.drag_anchor = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_anchor.is_some()
    }

    /// Map a wheel delta to a zoom step when the device signals zoom intent
    ///
    /// Negative delta (wheel up / pinch out) zooms in.
    pub fn wheel(&mut self, delta: f32, zoom_intent: bool) -> WheelOutcome {
        if !zoom_intent || delta == 0.0 || !delta.is_finite() {
            return WheelOutcome::Scroll;
        }
        if delta < 0.0 {
            self.zoom_in();
        } else {
            self.zoom_out();
        }
        WheelOutcome::Zoomed
    }

    /// Scale to render at for the given container and unrotated content size
    ///
    /// The `Fit` scale is clamped to this controller's step range.
    pub fn effective_scale(&self, container: Size, content: Size) -> f32 {
        match self.state.zoom {
            Zoom::Level(level) => level,
            Zoom::Fit => {
                unclamped_fit(container, content, self.state.rotation).clamp(self.min_level(), self.max_level())
            }
        }
    }
}

impl Default for TransformController {
    fn default() -> Self {
        Self::new()
    }
}

/// Largest scale at which the rotated content fits inside the container,
/// clamped to the [`ZOOM_STEPS`] range
pub fn fit_scale(container: Size, content: Size, rotation: Rotation) -> f32 {
    unclamped_fit(container, content, rotation).clamp(ZOOM_STEPS[0], ZOOM_STEPS[ZOOM_STEPS.len() - 1])
}

fn unclamped_fit(container: Size, content: Size, rotation: Rotation) -> f32 {
    let (content_width, content_height) = if rotation.swaps_axes() {
        (content.height, content.width)
    } else {
        (content.width, content.height)
    };

    if container.width <= 0.0 || container.height <= 0.0 || content_width <= 0.0 || content_height <= 0.0 {
        return 1.0;
    }

    let width = container.width / content_width;
    let height = container.height / content_height;

    width.min(height)
}
