//! Two-finger scroll/zoom and two-hand pinch zoom.
//!
//! Zoom notches come from an anchor limiter on a normalized distance with a
//! debounce on top, so rapid back-and-forth motion cannot spam the hotkey.
//! A growing distance zooms out, a shrinking one zooms in.

use std::time::Duration;

use crate::classifier::distance;
use crate::config::Thresholds;
use crate::gestures::{Action, Hotkey, Outcome, Status};
use crate::hand::Hand;
use crate::limiter::{AnchorLimiter, Debounce, Notch, ScrollGate};
use crate::session::{FrameContext, SessionState};

#[derive(Debug, Clone, Copy)]
struct ZoomGate {
    limiter: AnchorLimiter,
    debounce: Debounce,
}

impl ZoomGate {
    fn new(step: f32, debounce_ms: u64) -> Self {
        Self {
            limiter: AnchorLimiter::new(step),
            debounce: Debounce::new(Duration::from_millis(debounce_ms)),
        }
    }

    fn notch(&self, state: &mut SessionState, value: f32, now: Duration) -> Option<Hotkey> {
        if state.zoom_anchor.is_none() {
            state.zoom_anchor = Some(value);
            return None;
        }
        if !self.debounce.ready(state.last_zoom_time, now) {
            return None;
        }
        let notch = self.limiter.step(&mut state.zoom_anchor, value)?;
        state.last_zoom_time = Some(now);
        Some(match notch {
            Notch::Increase => Hotkey::ZoomOut,
            Notch::Decrease => Hotkey::ZoomIn,
        })
    }
}

/// Two raised fingers: index/middle spread drives zoom, otherwise their
/// average height, clamped to the camera frame, drives scrolling.
#[derive(Debug, Clone)]
pub struct ScrollZoomController {
    camera_height: f32,
    zoom: ZoomGate,
    scroll: ScrollGate,
}

impl ScrollZoomController {
    pub fn new(ctx: &FrameContext, th: &Thresholds) -> Self {
        Self {
            camera_height: ctx.camera_height,
            zoom: ZoomGate::new(th.zoom_step, th.zoom_debounce_ms),
            scroll: ScrollGate::new(
                th.scroll_step_px,
                Duration::from_millis(th.scroll_debounce_ms),
            ),
        }
    }

    pub fn update(&self, state: &mut SessionState, hand: &Hand, now: Duration) -> Outcome {
        let (index, middle) = (hand.index_tip(), hand.middle_tip());

        if let Some(key) = self.zoom.notch(state, distance(&index, &middle), now) {
            return Outcome::status(Status::Zoomed(key)).with(Action::Hotkey { key });
        }

        let avg_y =
            ((index.y + middle.y) / 2.0 * self.camera_height).clamp(0.0, self.camera_height);
        let notches = self.scroll.notches(
            &mut state.scroll_anchor,
            &mut state.last_scroll_time,
            avg_y,
            now,
        );
        let out = Outcome::status(Status::Scroll);
        if notches != 0 {
            out.with(Action::Scroll { notches })
        } else {
            out
        }
    }
}

/// Both hands pinching: the distance between the index tips, in camera
/// widths, drives zoom.
#[derive(Debug, Clone)]
pub struct DualZoomController {
    camera_width: f32,
    camera_height: f32,
    zoom: ZoomGate,
}

impl DualZoomController {
    pub fn new(ctx: &FrameContext, th: &Thresholds) -> Self {
        Self {
            camera_width: ctx.camera_width,
            camera_height: ctx.camera_height,
            zoom: ZoomGate::new(th.dual_zoom_step, th.zoom_debounce_ms),
        }
    }

    pub fn hands_distance(&self, a: &Hand, b: &Hand) -> f32 {
        let (x1, y1) = a
            .index_tip()
            .to_pixels(self.camera_width, self.camera_height);
        let (x2, y2) = b
            .index_tip()
            .to_pixels(self.camera_width, self.camera_height);
        (x2 - x1).hypot(y2 - y1) / self.camera_width
    }

    pub fn update(&self, state: &mut SessionState, a: &Hand, b: &Hand, now: Duration) -> Outcome {
        match self.zoom.notch(state, self.hands_distance(a, b), now) {
            Some(key) => Outcome::status(Status::DualZoomed(key)).with(Action::Hotkey { key }),
            None => Outcome::status(Status::DualZoom),
        }
    }
}
