use crate::actions::{ActionSink, KeyChord};
use crate::config::Profile;
use crate::gestures::Action;
use anyhow::{Result, anyhow};
use log::info;
use std::{
    process::{Command, Stdio},
    thread,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Done,
    /// A label binding asked the daemon to stop.
    Shutdown,
}

pub fn dispatch_action(
    action: &Action,
    profile: &Profile,
    sink: &mut dyn ActionSink,
) -> Result<Dispatched> {
    match action {
        Action::MoveTo { x, y } => sink.move_to(*x, *y)?,
        Action::Click => sink.click()?,
        Action::Scroll { notches } => sink.scroll(*notches)?,
        Action::Hotkey { key } => sink.key_chord(&profile.chord(*key)?)?,
        Action::Label { name } => return dispatch_label(name, profile, sink),
    }
    Ok(Dispatched::Done)
}

fn dispatch_label(name: &str, profile: &Profile, sink: &mut dyn ActionSink) -> Result<Dispatched> {
    let action = profile
        .labels
        .get(name)
        .map(|s| s.trim())
        .unwrap_or_default();

    if action.is_empty() {
        return Ok(Dispatched::Done);
    }
    if action == "toggle" {
        let en = !sink.is_enabled();
        sink.set_enabled(en);
        info!(
            "label '{name}': output {}",
            if en { "resumed" } else { "paused" }
        );
        return Ok(Dispatched::Done);
    }
    if action == "shutdown" {
        info!("label '{name}': shutdown requested");
        return Ok(Dispatched::Shutdown);
    }
    if let Some(rest) = action.strip_prefix("key:") {
        let chord: KeyChord = rest.parse()?;
        sink.key_chord(&chord)?;
        return Ok(Dispatched::Done);
    }
    if let Some(cmd) = action.strip_prefix("cmd:") {
        if !profile.meta.allow_commands {
            return Err(anyhow!("label '{name}' uses cmd: but allow_commands=false"));
        }
        let cmd = cmd.trim();
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .spawn()?;
        info!("label '{name}': spawned `{cmd}` (pid={})", child.id());
        // reap in the background; the control loop never waits on it
        thread::spawn(move || {
            let _ = child.wait();
        });
        return Ok(Dispatched::Done);
    }

    Err(anyhow!(
        "unknown action mapping for label {} -> '{}'",
        name,
        action
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Emitted, RecordingSink};
    use crate::gestures::Hotkey;

    fn profile() -> Profile {
        let mut p = Profile::builtin().unwrap();
        p.labels.insert("Open_Palm".into(), "toggle".into());
        p.labels.insert("Victory".into(), "key:SUPER+TAB".into());
        p
    }

    #[test]
    fn test_pointer_actions_reach_sink() {
        let p = profile();
        let mut sink = RecordingSink::new();
        for a in [
            Action::MoveTo { x: 5.0, y: 6.0 },
            Action::Click,
            Action::Scroll { notches: -2 },
        ] {
            assert_eq!(dispatch_action(&a, &p, &mut sink).unwrap(), Dispatched::Done);
        }
        assert_eq!(
            sink.emitted,
            vec![
                Emitted::Move { x: 5.0, y: 6.0 },
                Emitted::Click,
                Emitted::Scroll { notches: -2 },
            ]
        );
    }

    #[test]
    fn test_zoom_hotkeys_use_their_own_chords() {
        let p = profile();
        let mut sink = RecordingSink::new();
        for key in [Hotkey::ZoomIn, Hotkey::ZoomOut] {
            dispatch_action(&Action::Hotkey { key }, &p, &mut sink).unwrap();
        }
        assert_eq!(
            sink.emitted,
            vec![
                Emitted::Chord {
                    keys: "CTRL+EQUAL".into()
                },
                Emitted::Chord {
                    keys: "CTRL+MINUS".into()
                },
            ]
        );
    }

    #[test]
    fn test_label_actions() {
        let p = profile();
        let mut sink = RecordingSink::new();
        let label = |n: &str| Action::Label { name: n.into() };

        dispatch_action(&label("Victory"), &p, &mut sink).unwrap();
        assert_eq!(
            sink.emitted,
            vec![Emitted::Chord {
                keys: "SUPER+TAB".into()
            }]
        );

        dispatch_action(&label("Open_Palm"), &p, &mut sink).unwrap();
        assert!(!sink.is_enabled());
        dispatch_action(&Action::Click, &p, &mut sink).unwrap();
        assert_eq!(sink.emitted.len(), 1);
        dispatch_action(&label("Open_Palm"), &p, &mut sink).unwrap();
        assert!(sink.is_enabled());

        assert_eq!(
            dispatch_action(&label("Thumb_Down"), &p, &mut sink).unwrap(),
            Dispatched::Shutdown
        );
        assert_eq!(
            dispatch_action(&label("Unbound"), &p, &mut sink).unwrap(),
            Dispatched::Done
        );
    }

    #[test]
    fn test_cmd_label_refused_when_commands_disabled() {
        let mut p = profile();
        p.labels.insert("ILoveYou".into(), "cmd:true".into());
        let mut sink = RecordingSink::new();
        let a = Action::Label {
            name: "ILoveYou".into(),
        };
        assert!(dispatch_action(&a, &p, &mut sink).is_err());
    }
}
