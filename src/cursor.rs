//! One-hand cursor control: fingertip to screen, moving-average smoothing,
//! and the pinch timer that separates a click from a drag-scroll.
//!
//! Pinch timing is measured from the first pinched frame:
//! - released after at most `tap_ms` -> click
//! - held for more than `hold_ms` -> drag-scroll on the fingertip's height,
//!   clamped to the camera frame and spaced by `scroll_debounce_ms`
//! - released in between -> nothing
//!
//! The cursor stays put while pinched.

use std::time::Duration;

use crate::classifier::is_pinching;
use crate::config::Thresholds;
use crate::gestures::{Action, Outcome, Status};
use crate::hand::Hand;
use crate::limiter::ScrollGate;
use crate::session::{FrameContext, SessionState};

#[derive(Debug, Clone)]
pub struct CursorController {
    ctx: FrameContext,
    pinch_dist: f32,
    tap: Duration,
    hold: Duration,
    scroll: ScrollGate,
}

impl CursorController {
    pub fn new(ctx: &FrameContext, th: &Thresholds) -> Self {
        Self {
            ctx: ctx.clone(),
            pinch_dist: th.pinch_dist,
            tap: Duration::from_millis(th.tap_ms),
            hold: Duration::from_millis(th.hold_ms),
            scroll: ScrollGate::new(
                th.scroll_step_px,
                Duration::from_millis(th.scroll_debounce_ms),
            ),
        }
    }

    /// Push a projected point and return the mean of the window.
    pub fn smooth(&self, state: &mut SessionState, point: (f32, f32)) -> (f32, f32) {
        while state.cursor_history.len() >= self.ctx.smoothing {
            state.cursor_history.pop_front();
        }
        state.cursor_history.push_back(point);

        let n = state.cursor_history.len() as f32;
        let (sx, sy) = state
            .cursor_history
            .iter()
            .fold((0.0f32, 0.0f32), |(ax, ay), &(x, y)| (ax + x, ay + y));
        (
            (sx / n).clamp(0.0, self.ctx.screen_width),
            (sy / n).clamp(0.0, self.ctx.screen_height),
        )
    }

    pub fn update(&self, state: &mut SessionState, hand: &Hand, now: Duration) -> Outcome {
        let (px, py) = hand
            .index_tip()
            .to_pixels(self.ctx.camera_width, self.ctx.camera_height);

        if is_pinching(hand, self.pinch_dist) {
            let start = *state.pinch_start_time.get_or_insert(now);
            if now.saturating_sub(start) > self.hold {
                let notches = self.scroll.notches(
                    &mut state.scroll_anchor,
                    &mut state.last_scroll_time,
                    py.clamp(0.0, self.ctx.camera_height),
                    now,
                );
                let out = Outcome::status(Status::DragScroll);
                return if notches != 0 {
                    out.with(Action::Scroll { notches })
                } else {
                    out
                };
            }
            return Outcome::status(Status::Pinching);
        }

        let (x, y) = self.smooth(state, self.ctx.project(px, py));
        let mut out = Outcome::status(Status::Cursor).with(Action::MoveTo { x, y });

        if let Some(start) = state.pinch_start_time.take() {
            if now.saturating_sub(start) <= self.tap {
                out = out.with(Action::Click);
                out.status = Status::Click;
            }
            state.scroll_anchor = None;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameConfig;
    use crate::hand::testing::*;

    fn controller(th: &Thresholds) -> CursorController {
        let ctx = FrameContext::new(&FrameConfig::default()).unwrap();
        CursorController::new(&ctx, th)
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn finger(x: f32, y: f32) -> Hand {
        with_index_tip(hand_at(x, y + 0.1), x, y)
    }

    fn clicks(o: &Outcome) -> usize {
        o.actions.iter().filter(|a| **a == Action::Click).count()
    }

    /// Pinch from t=0 to `release_at`, then open the hand.
    fn pinch_and_release(c: &CursorController, release_at: u64) -> (SessionState, Outcome) {
        let mut st = SessionState::new();
        let pinch = pinched(finger(0.5, 0.5));
        let mut t = 0;
        while t < release_at {
            c.update(&mut st, &pinch, ms(t));
            t += 10;
        }
        let out = c.update(&mut st, &finger(0.5, 0.5), ms(release_at));
        (st, out)
    }

    #[test]
    fn test_smoothing_is_a_bounded_moving_average() {
        let th = Thresholds::default();
        let c = controller(&th);
        let mut st = SessionState::new();
        assert_eq!(c.smooth(&mut st, (0.0, 0.0)), (0.0, 0.0));
        assert_eq!(c.smooth(&mut st, (100.0, 50.0)), (50.0, 25.0));
        // window of 2: the first sample is evicted
        assert_eq!(c.smooth(&mut st, (200.0, 50.0)), (150.0, 50.0));
        assert_eq!(st.cursor_history.len(), 2);
    }

    #[test]
    fn test_move_to_always_on_screen() {
        let c = controller(&Thresholds::default());
        let mut st = SessionState::new();
        let coords = [-2.0, -0.1, 0.0, 0.05, 0.3, 0.5, 0.77, 0.99, 1.0, 1.4, 5.0];
        for &x in &coords {
            for &y in &coords {
                let out = c.update(&mut st, &finger(x, y), ms(0));
                for a in &out.actions {
                    if let Action::MoveTo { x, y } = a {
                        assert!((0.0..=1920.0).contains(x), "x={x}");
                        assert!((0.0..=1080.0).contains(y), "y={y}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_cursor_frozen_while_pinched() {
        let c = controller(&Thresholds::default());
        let mut st = SessionState::new();
        let out = c.update(&mut st, &pinched(finger(0.5, 0.5)), ms(0));
        assert!(out.actions.is_empty());
        assert_eq!(out.status, Status::Pinching);
        assert_eq!(st.pinch_start_time, Some(ms(0)));
    }

    #[test]
    fn test_tap_threshold_is_inclusive() {
        let c = controller(&Thresholds::default());
        let (_, at) = pinch_and_release(&c, 200);
        assert_eq!(clicks(&at), 1);
        let (st, over) = pinch_and_release(&c, 201);
        assert_eq!(clicks(&over), 0);
        assert_eq!(st.pinch_start_time, None);
    }

    #[test]
    fn test_hold_threshold_is_exclusive() {
        let c = controller(&Thresholds::default());
        let pinch = pinched(finger(0.5, 0.5));

        let mut st = SessionState::new();
        c.update(&mut st, &pinch, ms(0));
        let at = c.update(&mut st, &pinch, ms(400));
        assert_eq!(at.status, Status::Pinching);
        assert_eq!(st.scroll_anchor, None);

        let mut st = SessionState::new();
        c.update(&mut st, &pinch, ms(0));
        let below = c.update(&mut st, &pinch, ms(399));
        assert_eq!(below.status, Status::Pinching);
        let above = c.update(&mut st, &pinch, ms(401));
        assert_eq!(above.status, Status::DragScroll);
        assert!(st.scroll_anchor.is_some());
    }

    #[test]
    fn test_release_between_tap_and_hold_does_nothing() {
        let c = controller(&Thresholds::default());
        let (_, out) = pinch_and_release(&c, 300);
        assert_eq!(clicks(&out), 0);
        assert_eq!(out.status, Status::Cursor);
    }

    #[test]
    fn test_drag_scroll_after_hold() {
        let c = controller(&Thresholds::default());
        let mut st = SessionState::new();
        c.update(&mut st, &pinched(finger(0.5, 0.5)), ms(0));
        // first drag frame only sets the anchor (y = 240px)
        let o = c.update(&mut st, &pinched(finger(0.5, 0.5)), ms(450));
        assert!(o.actions.is_empty());
        // hand moves up 40px -> floor(40 / 15) = 2 notches up
        let up = pinched(finger(0.5, 200.0 / 480.0));
        let o = c.update(&mut st, &up, ms(480));
        assert_eq!(o.actions, vec![Action::Scroll { notches: 2 }]);
        // stationary: nothing more
        let o = c.update(&mut st, &up, ms(510));
        assert!(o.actions.is_empty());
        // long hold released: no click, anchor dropped
        let o = c.update(&mut st, &finger(0.5, 0.5), ms(540));
        assert_eq!(clicks(&o), 0);
        assert_eq!(st.scroll_anchor, None);
        assert_eq!(st.pinch_start_time, None);
    }

    #[test]
    fn test_drag_scroll_down_is_negative() {
        let c = controller(&Thresholds::default());
        let mut st = SessionState::new();
        let start = pinched(finger(0.5, 0.5));
        c.update(&mut st, &start, ms(0));
        c.update(&mut st, &start, ms(500));
        let down = pinched(finger(0.5, 260.0 / 480.0));
        let o = c.update(&mut st, &down, ms(530));
        assert_eq!(o.actions, vec![Action::Scroll { notches: -1 }]);
    }

    #[test]
    fn test_drag_scroll_far_outside_frame_is_clamped() {
        let c = controller(&Thresholds::default());
        let mut st = SessionState::new();
        let start = pinched(finger(0.5, 0.5));
        c.update(&mut st, &start, ms(0));
        c.update(&mut st, &start, ms(450));
        // tip reported far below the frame: counts as the bottom edge (480px)
        let o = c.update(&mut st, &pinched(finger(0.5, 1.0e6)), ms(480));
        assert_eq!(o.actions, vec![Action::Scroll { notches: -15 }]);
        assert_eq!(st.scroll_anchor, Some(465.0));
    }

    #[test]
    fn test_drag_scroll_spaced_at_high_tick_rate() {
        let c = controller(&Thresholds::default());
        let mut st = SessionState::new();
        c.update(&mut st, &pinched(finger(0.5, 0.5)), ms(0));
        let mut fired = Vec::new();
        let mut total = 0;
        // tip rises 4.8px every 10ms
        for i in 0..=40u64 {
            let y = 0.5 - i as f32 * 0.01;
            let o = c.update(&mut st, &pinched(finger(0.5, y)), ms(410 + i * 10));
            for a in &o.actions {
                if let Action::Scroll { notches } = a {
                    fired.push(410 + i * 10);
                    total += notches;
                }
            }
        }
        assert!(fired.len() >= 2);
        for pair in fired.windows(2) {
            assert!(pair[1] - pair[0] >= 50, "{fired:?}");
        }
        // held still once the window reopens: nothing is lost
        let o = c.update(&mut st, &pinched(finger(0.5, 0.1)), ms(2000));
        if let Some(Action::Scroll { notches }) = o.actions.first() {
            total += notches;
        }
        assert_eq!(total, 12);
    }
}
