use anyhow::Result;
use log::{info, warn};
use serde::Serialize;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Where decided actions end up. Once handed over an action is never
/// retried or cancelled.
pub trait ActionSink {
    fn is_enabled(&self) -> bool;
    fn set_enabled(&mut self, en: bool);
    fn move_to(&mut self, x: f32, y: f32) -> Result<()>;
    fn click(&mut self) -> Result<()>;
    /// Positive scrolls up.
    fn scroll(&mut self, notches: i32) -> Result<()>;
    fn key_chord(&mut self, chord: &KeyChord) -> Result<()>;
}

#[derive(Debug, Error, PartialEq)]
pub enum ChordError {
    #[error("empty key chord")]
    Empty,
    #[error("unsupported key token: {0}")]
    UnknownToken(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyToken {
    Ctrl,
    Alt,
    Shift,
    Super,
    Tab,
    Minus,
    Equal,
    Left,
    Right,
    Up,
    Down,
    Space,
    Enter,
    Esc,
    F3,
}

impl KeyToken {
    fn parse(tok: &str) -> Result<Self, ChordError> {
        let k = match tok {
            "CTRL" | "CONTROL" => KeyToken::Ctrl,
            "ALT" | "OPTION" => KeyToken::Alt,
            "SHIFT" => KeyToken::Shift,
            "SUPER" | "META" | "WIN" | "CMD" | "COMMAND" => KeyToken::Super,
            "TAB" => KeyToken::Tab,
            "MINUS" | "-" => KeyToken::Minus,
            "EQUAL" | "=" | "PLUS" => KeyToken::Equal,
            "LEFT" => KeyToken::Left,
            "RIGHT" => KeyToken::Right,
            "UP" => KeyToken::Up,
            "DOWN" => KeyToken::Down,
            "SPACE" => KeyToken::Space,
            "ENTER" | "RETURN" => KeyToken::Enter,
            "ESC" | "ESCAPE" => KeyToken::Esc,
            "F3" => KeyToken::F3,
            other => return Err(ChordError::UnknownToken(other.to_string())),
        };
        Ok(k)
    }
}

/// Keys pressed in order and released in reverse, e.g. "CTRL+EQUAL".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChord {
    keys: Vec<KeyToken>,
    text: String,
}

impl KeyChord {
    pub fn keys(&self) -> &[KeyToken] {
        &self.keys
    }
}

impl FromStr for KeyChord {
    type Err = ChordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<String> = s
            .split('+')
            .map(|p| p.trim().to_ascii_uppercase())
            .collect();
        if parts.iter().all(|p| p.is_empty()) {
            return Err(ChordError::Empty);
        }
        let mut keys = Vec::with_capacity(parts.len());
        for p in &parts {
            keys.push(KeyToken::parse(p)?);
        }
        Ok(Self {
            keys,
            text: parts.join("+"),
        })
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub struct UinputSink {
    enabled: bool,
    #[allow(dead_code)]
    linux: Option<Box<LinuxUinput>>,
}

impl UinputSink {
    /// Virtual pointer spanning `screen_w` x `screen_h` plus a keyboard.
    pub fn new(screen_w: u32, screen_h: u32) -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            let dev = LinuxUinput::create(screen_w, screen_h)?;
            return Ok(Self {
                enabled: true,
                linux: Some(Box::new(dev)),
            });
        }
        #[allow(unreachable_code)]
        {
            let _ = (screen_w, screen_h);
            warn!("uinput not available; running in NO-OP mode");
            Ok(Self::noop())
        }
    }

    pub fn noop() -> Self {
        Self {
            enabled: true,
            linux: None,
        }
    }
}

impl ActionSink for UinputSink {
    fn is_enabled(&self) -> bool {
        self.enabled
    }
    fn set_enabled(&mut self, en: bool) {
        self.enabled = en;
    }

    fn move_to(&mut self, x: f32, y: f32) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.move_abs(x.round() as i32, y.round() as i32)?;
        }
        #[cfg(not(target_os = "linux"))]
        let _ = (x, y);
        Ok(())
    }

    fn click(&mut self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.click_left()?;
        }
        Ok(())
    }

    fn scroll(&mut self, notches: i32) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.scroll_vertical(notches)?;
        }
        #[cfg(not(target_os = "linux"))]
        let _ = notches;
        Ok(())
    }

    fn key_chord(&mut self, chord: &KeyChord) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            let keys: Vec<_> = chord.keys().iter().map(|k| map_key(*k)).collect();
            // press in order
            for k in &keys {
                dev.key_send(*k, 1)?;
            }
            dev.sync()?;
            // release in reverse
            for k in keys.iter().rev() {
                dev.key_send(*k, 0)?;
            }
            dev.sync()?;
        }
        #[cfg(not(target_os = "linux"))]
        let _ = chord;
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn map_key(tok: KeyToken) -> uinput::event::keyboard::Key {
    use uinput::event::keyboard::Key as K;
    match tok {
        KeyToken::Ctrl => K::LeftControl,
        KeyToken::Alt => K::LeftAlt,
        KeyToken::Shift => K::LeftShift,
        KeyToken::Super => K::LeftMeta,
        KeyToken::Tab => K::Tab,
        KeyToken::Minus => K::Minus,
        KeyToken::Equal => K::Equal,
        KeyToken::Left => K::Left,
        KeyToken::Right => K::Right,
        KeyToken::Up => K::Up,
        KeyToken::Down => K::Down,
        KeyToken::Space => K::Space,
        KeyToken::Enter => K::Enter,
        KeyToken::Esc => K::Esc,
        KeyToken::F3 => K::F3,
    }
}

#[cfg(target_os = "linux")]
struct LinuxUinput {
    dev: uinput::device::Device,
}

#[cfg(target_os = "linux")]
impl LinuxUinput {
    fn create(screen_w: u32, screen_h: u32) -> Result<Self> {
        use uinput::event::{absolute, controller::Mouse, keyboard::Key, relative};

        let mut builder = uinput::default()?
            .name("Handctl Virtual Input")?
            // absolute pointer sized to the screen
            .event(absolute::Position::X)?
            .min(0)
            .max(screen_w as i32)
            .event(absolute::Position::Y)?
            .min(0)
            .max(screen_h as i32)
            // wheel
            .event(relative::Wheel::Vertical)?
            // mouse buttons
            .event(Mouse::Left)?;
        // keys for our chords
        for k in [
            Key::LeftControl,
            Key::LeftAlt,
            Key::LeftShift,
            Key::LeftMeta,
            Key::Tab,
            Key::Minus,
            Key::Equal,
            Key::Left,
            Key::Right,
            Key::Up,
            Key::Down,
            Key::Space,
            Key::Enter,
            Key::Esc,
            Key::F3,
        ] {
            builder = builder.event(k)?;
        }
        let dev = builder.create()?;

        info!("uinput: created virtual device ({screen_w}x{screen_h})");
        Ok(Self { dev })
    }

    fn sync(&mut self) -> Result<()> {
        self.dev.synchronize()?;
        Ok(())
    }

    fn key_send(&mut self, key: uinput::event::keyboard::Key, val: i32) -> Result<()> {
        self.dev.send(key, val)?;
        Ok(())
    }

    fn move_abs(&mut self, x: i32, y: i32) -> Result<()> {
        use uinput::event::absolute::Position;
        self.dev.send(Position::X, x)?;
        self.dev.send(Position::Y, y)?;
        self.sync()
    }

    fn click_left(&mut self) -> Result<()> {
        use uinput::event::controller::Mouse;
        self.dev.send(Mouse::Left, 1)?;
        self.sync()?;
        self.dev.send(Mouse::Left, 0)?;
        self.sync()?;
        Ok(())
    }

    fn scroll_vertical(&mut self, steps: i32) -> Result<()> {
        use uinput::event::relative::Wheel;
        self.dev.send(Wheel::Vertical, steps)?;
        self.sync()
    }
}

/// What a [`RecordingSink`] saw, with chords already resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "emit", rename_all = "snake_case")]
pub enum Emitted {
    Move { x: f32, y: f32 },
    Click,
    Scroll { notches: i32 },
    Chord { keys: String },
}

/// In-memory sink for replays and tests.
#[derive(Debug)]
pub struct RecordingSink {
    enabled: bool,
    pub emitted: Vec<Emitted>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            enabled: true,
            emitted: Vec::new(),
        }
    }
}

impl ActionSink for RecordingSink {
    fn is_enabled(&self) -> bool {
        self.enabled
    }
    fn set_enabled(&mut self, en: bool) {
        self.enabled = en;
    }
    fn move_to(&mut self, x: f32, y: f32) -> Result<()> {
        if self.enabled {
            self.emitted.push(Emitted::Move { x, y });
        }
        Ok(())
    }
    fn click(&mut self) -> Result<()> {
        if self.enabled {
            self.emitted.push(Emitted::Click);
        }
        Ok(())
    }
    fn scroll(&mut self, notches: i32) -> Result<()> {
        if self.enabled {
            self.emitted.push(Emitted::Scroll { notches });
        }
        Ok(())
    }
    fn key_chord(&mut self, chord: &KeyChord) -> Result<()> {
        if self.enabled {
            self.emitted.push(Emitted::Chord {
                keys: chord.to_string(),
            });
        }
        Ok(())
    }
}
