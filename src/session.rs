//! Per-run session: immutable frame geometry plus the mutable state the
//! controllers read and write every tick.

use std::collections::VecDeque;
use std::time::Duration;

use thiserror::Error;

use crate::classifier::RangeMap;
use crate::config::{FrameConfig, Thresholds};
use crate::gestures::Mode;

/// Configuration that cannot produce a working session. Raised when a
/// session is built, never from inside a tick.
#[derive(Debug, Error, PartialEq)]
pub enum SetupError {
    #[error("degenerate range: input span {min}..{max} is empty")]
    DegenerateRange { min: f32, max: f32 },
    #[error("margin {margin}px leaves no usable {axis} range in a {dim}px camera frame")]
    MarginTooLarge {
        axis: &'static str,
        margin: u32,
        dim: u32,
    },
    #[error("{0} must be positive")]
    NonPositive(&'static str),
    #[error("{name} must lie in {range}, got {value}")]
    OutOfRange {
        name: &'static str,
        range: &'static str,
        value: f32,
    },
}

/// Validated camera/screen geometry for one session.
#[derive(Debug, Clone)]
pub struct FrameContext {
    pub camera_width: f32,
    pub camera_height: f32,
    pub screen_width: f32,
    pub screen_height: f32,
    pub margin: f32,
    pub smoothing: usize,
    x_map: RangeMap,
    y_map: RangeMap,
}

impl FrameContext {
    pub fn new(frame: &FrameConfig) -> Result<Self, SetupError> {
        if frame.camera_width == 0 {
            return Err(SetupError::NonPositive("frame.camera_width"));
        }
        if frame.camera_height == 0 {
            return Err(SetupError::NonPositive("frame.camera_height"));
        }
        if frame.screen_width == 0 {
            return Err(SetupError::NonPositive("frame.screen_width"));
        }
        if frame.screen_height == 0 {
            return Err(SetupError::NonPositive("frame.screen_height"));
        }
        if frame.smoothing == 0 {
            return Err(SetupError::NonPositive("frame.smoothing"));
        }
        if frame.fps == 0 {
            return Err(SetupError::NonPositive("frame.fps"));
        }
        for (axis, dim) in [("x", frame.camera_width), ("y", frame.camera_height)] {
            if frame.margin.saturating_mul(2) >= dim {
                return Err(SetupError::MarginTooLarge {
                    axis,
                    margin: frame.margin,
                    dim,
                });
            }
        }

        let cam_w = frame.camera_width as f32;
        let cam_h = frame.camera_height as f32;
        let margin = frame.margin as f32;
        let screen_w = frame.screen_width as f32;
        let screen_h = frame.screen_height as f32;

        Ok(Self {
            camera_width: cam_w,
            camera_height: cam_h,
            screen_width: screen_w,
            screen_height: screen_h,
            margin,
            smoothing: frame.smoothing,
            x_map: RangeMap::new(margin, cam_w - margin, 0.0, screen_w)?,
            y_map: RangeMap::new(margin, cam_h - margin, 0.0, screen_h)?,
        })
    }

    /// Clamp a camera pixel position into the usable inset and project it
    /// onto the full screen.
    pub fn project(&self, px: f32, py: f32) -> (f32, f32) {
        let cx = px.clamp(self.margin, self.camera_width - self.margin);
        let cy = py.clamp(self.margin, self.camera_height - self.margin);
        (
            self.x_map.map(cx).clamp(0.0, self.screen_width),
            self.y_map.map(cy).clamp(0.0, self.screen_height),
        )
    }
}

const MIN_SCROLL_STEP_PX: f32 = 1.0;
const MIN_ZOOM_STEP: f32 = 0.001;

/// Reject thresholds that would make a controller misbehave.
pub fn check_thresholds(th: &Thresholds) -> Result<(), SetupError> {
    if !(th.pinch_dist > 0.0) {
        return Err(SetupError::NonPositive("thresholds.pinch_dist"));
    }
    if th.tap_ms == 0 {
        return Err(SetupError::NonPositive("thresholds.tap_ms"));
    }
    if th.hold_ms == 0 {
        return Err(SetupError::NonPositive("thresholds.hold_ms"));
    }
    for (name, value, min, range) in [
        ("thresholds.scroll_step_px", th.scroll_step_px, MIN_SCROLL_STEP_PX, "[1, inf)"),
        ("thresholds.zoom_step", th.zoom_step, MIN_ZOOM_STEP, "[0.001, inf)"),
        ("thresholds.dual_zoom_step", th.dual_zoom_step, MIN_ZOOM_STEP, "[0.001, inf)"),
    ] {
        if !(value >= min && value.is_finite()) {
            return Err(SetupError::OutOfRange { name, range, value });
        }
    }
    if !(th.swipe_edge > 0.0 && th.swipe_edge < 0.5) {
        return Err(SetupError::OutOfRange {
            name: "thresholds.swipe_edge",
            range: "(0, 0.5)",
            value: th.swipe_edge,
        });
    }
    if !(0.0..=1.0).contains(&th.min_label_score) {
        return Err(SetupError::OutOfRange {
            name: "thresholds.min_label_score",
            range: "[0, 1]",
            value: th.min_label_score,
        });
    }
    Ok(())
}

/// Mutable interpretation state, written by exactly one controller per tick.
///
/// Anchors are `None` whenever the gesture that owns them is not active.
#[derive(Debug, Default, Clone)]
pub struct SessionState {
    /// Last `smoothing` projected cursor positions, oldest first.
    pub cursor_history: VecDeque<(f32, f32)>,
    /// Session time of the first frame of an unresolved pinch.
    pub pinch_start_time: Option<Duration>,
    pub scroll_anchor: Option<f32>,
    pub zoom_anchor: Option<f32>,
    pub last_swipe_time: Option<Duration>,
    pub last_zoom_time: Option<Duration>,
    pub last_scroll_time: Option<Duration>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything owned by `mode`. Debounce timestamps survive so that
    /// re-entering a mode cannot fire early.
    pub fn exit(&mut self, mode: Mode) {
        match mode {
            Mode::Idle | Mode::Swipe => {}
            Mode::Cursor => {
                self.cursor_history.clear();
                self.pinch_start_time = None;
                self.scroll_anchor = None;
            }
            Mode::ScrollOrZoom => {
                self.scroll_anchor = None;
                self.zoom_anchor = None;
            }
            Mode::DualPinchZoom => {
                self.zoom_anchor = None;
            }
        }
    }
}
