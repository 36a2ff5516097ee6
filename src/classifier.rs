//! Pure per-hand signals: finger count, pinch state, distances.
//!
//! Nothing here keeps state.

use crate::hand::{
    Hand, INDEX_PIP, INDEX_TIP, Landmark, MIDDLE_PIP, MIDDLE_TIP, PINKY_PIP, PINKY_TIP, RING_PIP,
    RING_TIP,
};
use crate::session::SetupError;

/// (tip, pip) pairs for the four non-thumb fingers.
const FINGERS: [(usize, usize); 4] = [
    (INDEX_TIP, INDEX_PIP),
    (MIDDLE_TIP, MIDDLE_PIP),
    (RING_TIP, RING_PIP),
    (PINKY_TIP, PINKY_PIP),
];

/// Distance between two landmarks in the image plane (normalized units).
pub fn distance(a: &Landmark, b: &Landmark) -> f32 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Number of raised fingers, thumb excluded. A finger is up when its tip
/// sits higher in the image (smaller `y`) than its PIP joint.
pub fn fingers_up(hand: &Hand) -> u8 {
    FINGERS
        .iter()
        .filter(|&&(tip, pip)| hand.at(tip).y < hand.at(pip).y)
        .count() as u8
}

pub fn pinch_distance(hand: &Hand) -> f32 {
    distance(&hand.thumb_tip(), &hand.index_tip())
}

pub fn is_pinching(hand: &Hand, threshold: f32) -> bool {
    pinch_distance(hand) < threshold
}

/// Both hands present and both pinching.
pub fn both_pinching(hands: &[Hand], threshold: f32) -> bool {
    hands.len() == 2 && hands.iter().all(|h| is_pinching(h, threshold))
}

/// Linear mapping from `[in_min, in_max]` to `[out_min, out_max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeMap {
    in_min: f32,
    in_max: f32,
    out_min: f32,
    out_max: f32,
}

impl RangeMap {
    pub fn new(in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> Result<Self, SetupError> {
        let span = in_max - in_min;
        if span == 0.0 || !span.is_finite() || !(out_max - out_min).is_finite() {
            return Err(SetupError::DegenerateRange {
                min: in_min,
                max: in_max,
            });
        }
        Ok(Self {
            in_min,
            in_max,
            out_min,
            out_max,
        })
    }

    pub fn map(&self, v: f32) -> f32 {
        (v - self.in_min) * (self.out_max - self.out_min) / (self.in_max - self.in_min)
            + self.out_min
    }
}
