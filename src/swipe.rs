//! Open-hand swipes: moving the wrist into an edge zone of the camera frame
//! switches desktops (left/right) or shows all windows (top). One swipe per
//! debounce window, whatever the direction.

use std::time::Duration;

use crate::config::Thresholds;
use crate::gestures::{Action, Hotkey, Outcome, Status};
use crate::hand::Hand;
use crate::limiter::Debounce;
use crate::session::{FrameContext, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Left,
    Right,
    Up,
}

impl SwipeDirection {
    pub fn hotkey(self) -> Hotkey {
        match self {
            SwipeDirection::Left => Hotkey::SwipeLeft,
            SwipeDirection::Right => Hotkey::SwipeRight,
            SwipeDirection::Up => Hotkey::MissionControl,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SwipeController {
    camera_width: f32,
    camera_height: f32,
    edge: f32,
    debounce: Debounce,
}

impl SwipeController {
    pub fn new(ctx: &FrameContext, th: &Thresholds) -> Self {
        Self {
            camera_width: ctx.camera_width,
            camera_height: ctx.camera_height,
            edge: th.swipe_edge,
            debounce: Debounce::new(Duration::from_millis(th.swipe_debounce_ms)),
        }
    }

    /// Edge zone containing a wrist position (camera pixels). Checked in
    /// the order left, right, up.
    pub fn zone(&self, x: f32, y: f32) -> Option<SwipeDirection> {
        if x < self.camera_width * self.edge {
            Some(SwipeDirection::Left)
        } else if x > self.camera_width * (1.0 - self.edge) {
            Some(SwipeDirection::Right)
        } else if y < self.camera_height * self.edge {
            Some(SwipeDirection::Up)
        } else {
            None
        }
    }

    pub fn update(&self, state: &mut SessionState, hand: &Hand, now: Duration) -> Outcome {
        if !self.debounce.ready(state.last_swipe_time, now) {
            return Outcome::status(Status::Swipe);
        }
        let (x, y) = hand
            .wrist()
            .to_pixels(self.camera_width, self.camera_height);
        match self.zone(x, y) {
            Some(dir) => {
                state.last_swipe_time = Some(now);
                let key = dir.hotkey();
                Outcome::status(Status::Swiped(key)).with(Action::Hotkey { key })
            }
            None => Outcome::status(Status::Swipe),
        }
    }
}
