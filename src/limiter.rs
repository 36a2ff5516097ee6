//! Anchor-based notch generation and time debounce.
//!
//! A limiter turns a continuously varying scalar into evenly spaced notches.
//! The first sample only sets the anchor. Afterwards every full `step` of
//! displacement past the anchor yields one notch and slides the anchor by
//! exactly one step, so motion beyond the step carries into the next notch.
//! The anchor itself lives in `SessionState`; the limiter holds only tuning.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notch {
    Increase,
    Decrease,
}

impl Notch {
    pub fn signum(self) -> i32 {
        match self {
            Notch::Increase => 1,
            Notch::Decrease => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorLimiter {
    step: f32,
    // +1: increase when the value grows; -1: increase when it shrinks
    polarity: f32,
}

impl AnchorLimiter {
    pub fn new(step: f32) -> Self {
        Self {
            step,
            polarity: 1.0,
        }
    }

    /// Limiter whose "increase" direction is a falling value (image-space
    /// `y` shrinking as the hand moves up).
    pub fn inverted(step: f32) -> Self {
        Self {
            step,
            polarity: -1.0,
        }
    }

    /// Advance by at most one notch.
    pub fn step(&self, anchor: &mut Option<f32>, value: f32) -> Option<Notch> {
        let Some(a) = *anchor else {
            *anchor = Some(value);
            return None;
        };
        let diff = self.polarity * (value - a);
        if diff > self.step {
            *anchor = Some(a + self.polarity * self.step);
            Some(Notch::Increase)
        } else if diff < -self.step {
            *anchor = Some(a - self.polarity * self.step);
            Some(Notch::Decrease)
        } else {
            None
        }
    }

    /// Emit every whole step available at `value` at once; returns the signed
    /// notch count (positive = increase). Same result as calling `step` until
    /// it stops firing.
    pub fn drain(&self, anchor: &mut Option<f32>, value: f32) -> i32 {
        let Some(a) = *anchor else {
            *anchor = Some(value);
            return 0;
        };
        let diff = self.polarity * (value - a);
        if !(diff.abs() > self.step) {
            return 0;
        }
        // whole steps strictly exceeded: an exact multiple leaves one behind
        let whole = ((diff.abs() / self.step).ceil() - 1.0).max(1.0);
        let n = whole as i32;
        let dir = diff.signum();
        *anchor = Some(a + self.polarity * dir * n as f32 * self.step);
        n * dir as i32
    }
}

/// Drained scroll limiter behind a debounce. Steps keep piling up on the
/// anchor while the window is closed and go out as one count when it opens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollGate {
    limiter: AnchorLimiter,
    debounce: Debounce,
}

impl ScrollGate {
    /// Image-space scroll: a falling `y` scrolls up.
    pub fn new(step_px: f32, debounce: Duration) -> Self {
        Self {
            limiter: AnchorLimiter::inverted(step_px),
            debounce: Debounce::new(debounce),
        }
    }

    pub fn notches(
        &self,
        anchor: &mut Option<f32>,
        last: &mut Option<Duration>,
        value: f32,
        now: Duration,
    ) -> i32 {
        if anchor.is_none() {
            *anchor = Some(value);
            return 0;
        }
        if !self.debounce.ready(*last, now) {
            return 0;
        }
        let n = self.limiter.drain(anchor, value);
        if n != 0 {
            *last = Some(now);
        }
        n
    }
}

/// Minimum spacing between two firings of the same action class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debounce {
    window: Duration,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn ready(&self, last: Option<Duration>, now: Duration) -> bool {
        last.is_none_or(|t| now.saturating_sub(t) >= self.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_sets_anchor_only() {
        let lim = AnchorLimiter::new(1.0);
        let mut a = None;
        assert_eq!(lim.step(&mut a, 42.0), None);
        assert_eq!(a, Some(42.0));
    }

    #[test]
    fn test_anchor_slides_by_one_step() {
        let lim = AnchorLimiter::new(0.025);
        let mut a = None;
        assert_eq!(lim.step(&mut a, 0.10), None);
        assert_eq!(lim.step(&mut a, 0.10), None);
        assert_eq!(lim.step(&mut a, 0.14), Some(Notch::Increase));
        assert!((a.unwrap() - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_jitter_inside_step_is_silent() {
        let lim = AnchorLimiter::new(15.0);
        let mut a = None;
        lim.step(&mut a, 200.0);
        for v in [205.0, 195.0, 214.0, 186.0, 200.0] {
            assert_eq!(lim.step(&mut a, v), None);
        }
        assert_eq!(a, Some(200.0));
    }

    #[test]
    fn test_exact_step_does_not_fire() {
        let lim = AnchorLimiter::new(10.0);
        let mut a = Some(0.0);
        assert_eq!(lim.step(&mut a, 10.0), None);
        assert_eq!(lim.step(&mut a, -10.0), None);
    }

    #[test]
    fn test_inverted_polarity() {
        let lim = AnchorLimiter::inverted(15.0);
        let mut a = Some(300.0);
        // hand moved up: y fell by more than a step
        assert_eq!(lim.step(&mut a, 280.0), Some(Notch::Increase));
        assert_eq!(a, Some(285.0));
        let mut a = Some(300.0);
        assert_eq!(lim.step(&mut a, 320.0), Some(Notch::Decrease));
        assert_eq!(a, Some(315.0));
    }

    #[test]
    fn test_notch_count_depends_on_displacement_not_tick_count() {
        let lim = AnchorLimiter::new(15.0);
        // 47px of monotonic motion -> floor(47 / 15) = 3 notches
        let mut coarse = Some(0.0);
        let coarse_total = lim.drain(&mut coarse, 47.0);

        let mut fine = Some(0.0);
        let mut fine_total = 0;
        for i in 1..=47 {
            fine_total += lim.drain(&mut fine, i as f32);
        }

        assert_eq!(coarse_total, 3);
        assert_eq!(fine_total, 3);
        assert_eq!(coarse, fine);
    }

    #[test]
    fn test_monotonic_decrease_counts() {
        let lim = AnchorLimiter::new(0.03);
        let mut a = Some(0.5);
        let mut total = 0;
        let mut v = 0.5;
        while v > 0.31 {
            v -= 0.007;
            total += lim.drain(&mut a, v);
        }
        let expected = -(((0.5 - v) / 0.03).floor() as i32);
        assert_eq!(total, expected);
    }

    #[test]
    fn test_stationary_after_anchor_is_idempotent() {
        let lim = AnchorLimiter::new(15.0);
        let mut a = None;
        lim.drain(&mut a, 123.0);
        for _ in 0..10 {
            assert_eq!(lim.drain(&mut a, 123.0), 0);
        }
    }

    #[test]
    fn test_drain_far_value_returns_in_one_call() {
        let lim = AnchorLimiter::inverted(15.0);
        let mut a = Some(240.0);
        // 9760px down: 650 whole steps, 10px left under the new anchor
        assert_eq!(lim.drain(&mut a, 10_000.0), -650);
        assert_eq!(a, Some(9990.0));
        assert_eq!(lim.drain(&mut a, 10_000.0), 0);

        let mut a = Some(240.0);
        assert!(lim.drain(&mut a, 4.8e8) < -1_000_000);
        assert_eq!(lim.drain(&mut a, f32::NAN), 0);
    }

    #[test]
    fn test_drain_tiny_step_returns_in_one_call() {
        let lim = AnchorLimiter::inverted(1e-6);
        let mut a = Some(240.0);
        assert!(lim.drain(&mut a, 216.0) > 20_000_000);
    }

    #[test]
    fn test_drain_exact_multiple_keeps_last_step() {
        let lim = AnchorLimiter::new(15.0);
        let mut a = Some(0.0);
        assert_eq!(lim.drain(&mut a, 30.0), 1);
        assert_eq!(a, Some(15.0));
        let mut a = Some(0.0);
        assert_eq!(lim.drain(&mut a, -45.0), -2);
        assert_eq!(a, Some(-30.0));
    }

    #[test]
    fn test_scroll_gate_holds_steps_until_window_opens() {
        let gate = ScrollGate::new(15.0, Duration::from_millis(50));
        let (mut a, mut last) = (None, None);
        let ms = Duration::from_millis;
        assert_eq!(gate.notches(&mut a, &mut last, 300.0, ms(0)), 0);
        assert_eq!(gate.notches(&mut a, &mut last, 280.0, ms(10)), 1);
        assert_eq!(last, Some(ms(10)));
        // inside the window: motion is kept, nothing fires
        assert_eq!(gate.notches(&mut a, &mut last, 250.0, ms(30)), 0);
        assert_eq!(gate.notches(&mut a, &mut last, 220.0, ms(59)), 0);
        assert_eq!(gate.notches(&mut a, &mut last, 220.0, ms(60)), 4);
        assert_eq!(a, Some(225.0));
    }

    #[test]
    fn test_debounce_window() {
        let d = Debounce::new(Duration::from_millis(200));
        assert!(d.ready(None, Duration::ZERO));
        let last = Some(Duration::from_millis(1000));
        assert!(!d.ready(last, Duration::from_millis(1199)));
        assert!(d.ready(last, Duration::from_millis(1200)));
        // clock going backwards never fires early
        assert!(!d.ready(last, Duration::from_millis(900)));
    }
}
