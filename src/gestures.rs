//! Mode arbitration and the per-tick gesture engine.
//!
//! Each tick reads one observation, picks exactly one mode, resets whatever
//! the previous mode owned when the mode changes, and runs that mode's
//! controller. Output is a short list of [`Action`]s for the sink.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use log::debug;
use serde::Serialize;

use crate::classifier::{both_pinching, fingers_up};
use crate::config::{FrameConfig, Profile, Thresholds};
use crate::cursor::CursorController;
use crate::hand::HandObservation;
use crate::session::{FrameContext, SessionState, SetupError, check_thresholds};
use crate::swipe::SwipeController;
use crate::zoom::{DualZoomController, ScrollZoomController};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Idle,
    Cursor,
    ScrollOrZoom,
    Swipe,
    DualPinchZoom,
}

/// Logical hotkeys; the chord for each comes from the profile bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Hotkey {
    ZoomIn,
    ZoomOut,
    SwipeLeft,
    SwipeRight,
    MissionControl,
}

impl Hotkey {
    pub const ALL: [Hotkey; 5] = [
        Hotkey::ZoomIn,
        Hotkey::ZoomOut,
        Hotkey::SwipeLeft,
        Hotkey::SwipeRight,
        Hotkey::MissionControl,
    ];

    pub fn binding_key(&self) -> &'static str {
        match self {
            Hotkey::ZoomIn => "zoom_in",
            Hotkey::ZoomOut => "zoom_out",
            Hotkey::SwipeLeft => "swipe_left",
            Hotkey::SwipeRight => "swipe_right",
            Hotkey::MissionControl => "mission_control",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Hotkey::ZoomIn => "Zoom In",
            Hotkey::ZoomOut => "Zoom Out",
            Hotkey::SwipeLeft => "Swipe Left",
            Hotkey::SwipeRight => "Swipe Right",
            Hotkey::MissionControl => "Mission Control",
        }
    }
}

/// Discrete output handed to the action sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Absolute screen position, already clamped to the screen.
    MoveTo { x: f32, y: f32 },
    Click,
    /// Positive scrolls up.
    Scroll { notches: i32 },
    Hotkey { key: Hotkey },
    /// A bound perception label appeared.
    Label { name: String },
}

/// Human-readable state of the last tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Idle,
    Cursor,
    Pinching,
    Click,
    DragScroll,
    Scroll,
    Zoomed(Hotkey),
    Swipe,
    Swiped(Hotkey),
    DualZoom,
    DualZoomed(Hotkey),
    TwoHandsOpen,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Idle => f.write_str("Idle"),
            Status::Cursor => f.write_str("Cursor Mode"),
            Status::Pinching => f.write_str("Pinching..."),
            Status::Click => f.write_str("Click"),
            Status::DragScroll => f.write_str("Click & Hold: Scrolling"),
            Status::Scroll => f.write_str("Scroll Mode"),
            Status::Zoomed(hk) | Status::Swiped(hk) => f.write_str(hk.label()),
            Status::Swipe => f.write_str("Swipe Mode"),
            Status::DualZoom => f.write_str("Dual Zoom Mode"),
            Status::DualZoomed(hk) => write!(f, "Dual: {}", hk.label()),
            Status::TwoHandsOpen => f.write_str("2 Hands (Open)"),
        }
    }
}

/// What one controller produced for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub actions: Vec<Action>,
    pub status: Status,
}

impl Outcome {
    pub fn status(status: Status) -> Self {
        Self {
            actions: Vec::new(),
            status,
        }
    }

    pub fn with(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub mode: Mode,
    pub status: Status,
    pub actions: Vec<Action>,
}

/// Pick the mode for one observation. Two-hand rules win over one-hand
/// rules; there is no hysteresis, each call stands alone.
pub fn arbitrate(obs: &HandObservation, pinch_dist: f32) -> Mode {
    match obs.hands.as_slice() {
        [] => Mode::Idle,
        [hand] => match fingers_up(hand) {
            0 | 1 => Mode::Cursor,
            2 => Mode::ScrollOrZoom,
            _ => Mode::Swipe,
        },
        [_, _, ..] => {
            if both_pinching(&obs.hands[..2], pinch_dist) {
                Mode::DualPinchZoom
            } else {
                Mode::Idle
            }
        }
    }
}

#[derive(Debug)]
pub struct GestureEngine {
    pinch_dist: f32,
    min_label_score: f32,
    labels: HashSet<String>,
    cursor: CursorController,
    scroll_zoom: ScrollZoomController,
    dual: DualZoomController,
    swipe: SwipeController,
    state: SessionState,
    mode: Mode,
    last_label: Option<String>,
}

impl GestureEngine {
    pub fn new(frame: &FrameConfig, th: &Thresholds) -> Result<Self, SetupError> {
        let ctx = FrameContext::new(frame)?;
        check_thresholds(th)?;
        Ok(Self {
            pinch_dist: th.pinch_dist,
            min_label_score: th.min_label_score,
            labels: HashSet::new(),
            cursor: CursorController::new(&ctx, th),
            scroll_zoom: ScrollZoomController::new(&ctx, th),
            dual: DualZoomController::new(&ctx, th),
            swipe: SwipeController::new(&ctx, th),
            state: SessionState::new(),
            mode: Mode::Idle,
            last_label: None,
        })
    }

    pub fn from_profile(p: &Profile) -> Result<Self, SetupError> {
        Ok(Self::new(&p.frame, &p.thresholds)?.with_labels(p.labels.keys().cloned()))
    }

    /// Perception labels that should surface as [`Action::Label`].
    pub fn with_labels(mut self, labels: impl IntoIterator<Item = String>) -> Self {
        self.labels = labels.into_iter().collect();
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[cfg(test)]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run one control tick. `None` means perception has produced nothing
    /// yet: report idle and leave all state untouched.
    pub fn tick(&mut self, obs: Option<&HandObservation>, now: Duration) -> Tick {
        let Some(obs) = obs else {
            return Tick {
                mode: Mode::Idle,
                status: Status::Idle,
                actions: Vec::new(),
            };
        };

        let next = arbitrate(obs, self.pinch_dist);
        if next != self.mode {
            debug!("mode {:?} -> {:?}", self.mode, next);
            self.state.exit(self.mode);
            self.mode = next;
        }

        let outcome = match next {
            Mode::Idle if obs.hand_count() >= 2 => Outcome::status(Status::TwoHandsOpen),
            Mode::Idle => Outcome::status(Status::Idle),
            Mode::Cursor => self.cursor.update(&mut self.state, &obs.hands[0], now),
            Mode::ScrollOrZoom => self.scroll_zoom.update(&mut self.state, &obs.hands[0], now),
            Mode::Swipe => self.swipe.update(&mut self.state, &obs.hands[0], now),
            Mode::DualPinchZoom => {
                self.dual
                    .update(&mut self.state, &obs.hands[0], &obs.hands[1], now)
            }
        };

        let mut actions = outcome.actions;
        if let Some(name) = self.label_edge(obs) {
            actions.push(Action::Label { name });
        }
        if !actions.is_empty() {
            debug!("tick {:?}: {:?}", next, actions);
        }

        Tick {
            mode: next,
            status: outcome.status,
            actions,
        }
    }

    /// A bound label fires once when it first shows up on a one-hand
    /// observation; holding the pose does not repeat it.
    fn label_edge(&mut self, obs: &HandObservation) -> Option<String> {
        let current = match (&obs.gesture, obs.hand_count()) {
            (Some(g), 1) if g.score >= self.min_label_score && self.labels.contains(&g.label) => {
                Some(g.label.clone())
            }
            _ => None,
        };
        let fired = match &current {
            Some(l) if self.last_label.as_ref() != Some(l) => Some(l.clone()),
            _ => None,
        };
        self.last_label = current;
        fired
    }
}
