//! Perception boundary: JSON observation records.
//!
//! A feeder (the hand-landmark model process) writes one JSON object per
//! frame, either over the daemon socket (`"op":"observe"`) or into a
//! recording file for `handctl replay`:
//!
//! ```json
//! {"t_ms": 120, "hands": [[{"x":0.5,"y":0.4,"z":0.0}, ...21 points]],
//!  "gesture": {"label": "Thumb_Down", "score": 0.93}}
//! ```

use anyhow::{Result, anyhow};
use log::warn;
use serde::Deserialize;
use std::io::BufRead;

use crate::hand::{GestureLabel, Hand, HandObservation, MAX_HANDS};

#[derive(Debug, Clone, Deserialize)]
pub struct ObservationRecord {
    /// Capture time in ms; only meaningful for recordings.
    #[serde(default)]
    pub t_ms: Option<u64>,
    #[serde(default)]
    pub hands: Vec<Hand>,
    #[serde(default)]
    pub gesture: Option<GestureLabel>,
}

impl ObservationRecord {
    /// Convert to an observation, keeping at most [`MAX_HANDS`] hands.
    pub fn into_observation(mut self) -> HandObservation {
        if self.hands.len() > MAX_HANDS {
            warn!(
                "observation carried {} hands; keeping the first {MAX_HANDS}",
                self.hands.len()
            );
            self.hands.truncate(MAX_HANDS);
        }
        HandObservation::new(self.hands, self.gesture)
    }
}

pub fn decode_line(line: &str) -> Result<ObservationRecord> {
    let rec: ObservationRecord = serde_json::from_str(line)?;
    let finite = rec
        .hands
        .iter()
        .all(|h| h.landmarks.iter().all(|lm| lm.is_finite()));
    if !finite {
        return Err(anyhow!("observation contains non-finite landmark coordinates"));
    }
    Ok(rec)
}

/// Read a JSON-lines recording. Blank lines and `#` comments are skipped;
/// records without `t_ms` are spaced one camera frame apart.
pub fn read_recording(reader: impl BufRead, frame_ms: u64) -> Result<Vec<(u64, HandObservation)>> {
    let mut out = Vec::new();
    let mut last_t: Option<u64> = None;
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let rec = decode_line(trimmed).map_err(|e| anyhow!("line {}: {e}", i + 1))?;
        let t = match (rec.t_ms, last_t) {
            (Some(t), Some(prev)) if t < prev => {
                return Err(anyhow!("line {}: t_ms {t} goes backwards (after {prev})", i + 1));
            }
            (Some(t), _) => t,
            (None, Some(prev)) => prev + frame_ms,
            (None, None) => 0,
        };
        last_t = Some(t);
        out.push((t, rec.into_observation()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::LANDMARK_COUNT;

    fn hand_json(x: f32) -> String {
        let pts: Vec<String> = (0..LANDMARK_COUNT)
            .map(|_| format!(r#"{{"x":{x},"y":0.5,"z":0.0}}"#))
            .collect();
        format!("[{}]", pts.join(","))
    }

    #[test]
    fn test_decode_observe_request() {
        let line = format!(
            r#"{{"op":"observe","hands":[{}],"gesture":{{"label":"Open_Palm","score":0.8}}}}"#,
            hand_json(0.3)
        );
        let obs = decode_line(&line).unwrap().into_observation();
        assert_eq!(obs.hand_count(), 1);
        assert_eq!(obs.gesture.unwrap().label, "Open_Palm");
    }

    #[test]
    fn test_decode_empty_frame() {
        let obs = decode_line("{}").unwrap().into_observation();
        assert_eq!(obs, HandObservation::default());
    }

    #[test]
    fn test_extra_hands_truncated() {
        let h = hand_json(0.5);
        let line = format!(r#"{{"hands":[{h},{h},{h}]}}"#);
        assert_eq!(decode_line(&line).unwrap().into_observation().hand_count(), 2);
    }

    #[test]
    fn test_recording_timestamps() {
        let h = hand_json(0.5);
        let text = format!(
            "# recorded\n{{\"t_ms\":10,\"hands\":[{h}]}}\n\n{{\"hands\":[]}}\n{{\"t_ms\":100}}\n"
        );
        let rec = read_recording(text.as_bytes(), 33).unwrap();
        let times: Vec<u64> = rec.iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![10, 43, 100]);
        assert_eq!(rec[0].1.hand_count(), 1);
    }

    #[test]
    fn test_recording_reports_bad_line() {
        let text = "{}\nnot json\n";
        let err = read_recording(text.as_bytes(), 33).unwrap_err().to_string();
        assert!(err.starts_with("line 2"), "{err}");
    }

    #[test]
    fn test_recording_rejects_time_going_backwards() {
        let text = "{\"t_ms\":50}\n{\"t_ms\":20}\n";
        assert!(read_recording(text.as_bytes(), 33).is_err());
    }
}
