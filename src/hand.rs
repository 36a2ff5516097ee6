//! Hand landmark snapshots as delivered by the perception boundary.
//!
//! Landmarks follow the MediaPipe hand model: 21 points per hand, wrist
//! first, then thumb through pinky from knuckle to tip. Coordinates are
//! normalized to the camera frame (`x`, `y` in `[0,1]`, smaller `y` is
//! higher in the image).

use serde::{Deserialize, Serialize};

pub const LANDMARK_COUNT: usize = 21;
pub const MAX_HANDS: usize = 2;

pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_PIP: usize = 6;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_TIP: usize = 12;
pub const RING_PIP: usize = 14;
pub const RING_TIP: usize = 16;
pub const PINKY_PIP: usize = 18;
pub const PINKY_TIP: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Position in pixels inside a `width` x `height` camera frame.
    pub fn to_pixels(&self, width: f32, height: f32) -> (f32, f32) {
        (self.x * width, self.y * height)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hand {
    pub landmarks: [Landmark; LANDMARK_COUNT],
}

impl Hand {
    pub fn new(landmarks: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { landmarks }
    }

    pub fn at(&self, idx: usize) -> Landmark {
        self.landmarks[idx]
    }

    pub fn wrist(&self) -> Landmark {
        self.landmarks[WRIST]
    }
    pub fn thumb_tip(&self) -> Landmark {
        self.landmarks[THUMB_TIP]
    }
    pub fn index_tip(&self) -> Landmark {
        self.landmarks[INDEX_TIP]
    }
    pub fn middle_tip(&self) -> Landmark {
        self.landmarks[MIDDLE_TIP]
    }
}

/// Best gesture label for a whole observation, as classified upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureLabel {
    pub label: String,
    pub score: f32,
}

/// One perception result: up to [`MAX_HANDS`] hands plus an optional label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandObservation {
    pub hands: Vec<Hand>,
    pub gesture: Option<GestureLabel>,
}

impl HandObservation {
    pub fn new(hands: Vec<Hand>, gesture: Option<GestureLabel>) -> Self {
        Self { hands, gesture }
    }

    pub fn hand_count(&self) -> usize {
        self.hands.len()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_to_pixels() {
        let lm = Landmark::new(0.5, 0.25, 0.0);
        assert_eq!(lm.to_pixels(640.0, 480.0), (320.0, 120.0));
    }

    #[test]
    fn test_hand_deserializes_from_object_list() {
        let pts: Vec<String> = (0..LANDMARK_COUNT)
            .map(|i| format!(r#"{{"x":{},"y":0.5,"z":0.0}}"#, i as f32 / 100.0))
            .collect();
        let json = format!("[{}]", pts.join(","));
        let hand: Hand = serde_json::from_str(&json).unwrap();
        assert_eq!(hand.at(INDEX_TIP).x, 0.08);
        assert_eq!(hand.wrist().y, 0.5);
    }

    #[test]
    fn test_hand_rejects_wrong_landmark_count() {
        let json = format!("[{}]", vec![r#"{"x":0.1,"y":0.1}"#; 20].join(","));
        assert!(serde_json::from_str::<Hand>(&json).is_err());
    }

    #[test]
    fn test_synthetic_hand_helpers() {
        let h = pinched(with_fingers_up(hand_at(0.5, 0.5), 1));
        let d = (h.thumb_tip().x - h.index_tip().x).abs();
        assert!(d < 0.02);
        assert_eq!(observe(vec![h]).hand_count(), 1);
    }
}
