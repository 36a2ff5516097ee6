use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::{info, warn};
use serde::{Deserialize, Deserializer};
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::actions::KeyChord;
use crate::gestures::Hotkey;
use crate::session::{FrameContext, check_thresholds};

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
    #[serde(default)]
    pub allow_commands: bool,
}

/// Camera and screen geometry for a session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub camera_width: u32,
    pub camera_height: u32,
    pub screen_width: u32,
    pub screen_height: u32,
    /// Inset (camera pixels) that is mapped to the screen edges.
    pub margin: u32,
    /// Moving-average window for the cursor.
    pub smoothing: usize,
    /// Control loop rate; one tick per camera frame.
    pub fps: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            camera_width: 640,
            camera_height: 480,
            screen_width: 1920,
            screen_height: 1080,
            margin: 100,
            smoothing: 2,
            fps: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Thumb/index tip distance (normalized) below which a hand pinches.
    pub pinch_dist: f32,
    /// A pinch released within this many ms is a click.
    pub tap_ms: u64,
    /// A pinch held longer than this becomes a drag-scroll.
    pub hold_ms: u64,
    pub scroll_step_px: f32,
    pub zoom_step: f32,
    pub dual_zoom_step: f32,
    pub zoom_debounce_ms: u64,
    /// Minimum spacing between two scroll emissions; motion in between is
    /// carried into the next one.
    pub scroll_debounce_ms: u64,
    pub swipe_debounce_ms: u64,
    /// Fraction of the camera frame treated as a swipe edge zone.
    pub swipe_edge: f32,
    pub min_label_score: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            pinch_dist: 0.05,
            tap_ms: 200,
            hold_ms: 400,
            scroll_step_px: 15.0,
            zoom_step: 0.03,
            dual_zoom_step: 0.025,
            zoom_debounce_ms: 200,
            scroll_debounce_ms: 50,
            swipe_debounce_ms: 1000,
            swipe_edge: 0.2,
            min_label_score: 0.7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    #[serde(default)]
    pub frame: FrameConfig,
    #[serde(default)]
    pub thresholds: Thresholds,

    // Accept nested/dotted tables and flatten them into "a.b" -> "value"
    #[serde(deserialize_with = "deserialize_bindings_flat")]
    pub bindings: HashMap<String, String>,

    /// Perception gesture label -> action
    #[serde(default, deserialize_with = "deserialize_bindings_flat")]
    pub labels: HashMap<String, String>,
}

impl Profile {
    /// The profile shipped with the binary.
    pub fn builtin() -> Result<Self> {
        parse_profile(default_profile_text(), Path::new("<builtin>"))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
        parse_profile(&txt, path)
    }

    /// Chord bound to a logical hotkey. Validation guarantees presence.
    pub fn chord(&self, hk: Hotkey) -> Result<KeyChord> {
        let raw = self
            .bindings
            .get(hk.binding_key())
            .ok_or_else(|| anyhow!("no binding for {}", hk.binding_key()))?;
        Ok(raw.parse()?)
    }
}

// --------- custom bindings deserializer (tolerant) ----------
fn deserialize_bindings_flat<'de, D>(
    de: D,
) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = toml::Value::deserialize(de)?;
    let table = match val {
        toml::Value::Table(t) => t,
        other => {
            return Err(serde::de::Error::custom(format!(
                "bindings must be a table, got {:?}",
                other.type_str()
            )));
        }
    };

    let mut out = HashMap::new();
    flatten_table("", &table, &mut out).map_err(serde::de::Error::custom)?;
    Ok(out)
}

fn flatten_table(
    prefix: &str,
    table: &toml::value::Table,
    out: &mut HashMap<String, String>,
) -> std::result::Result<(), String> {
    for (k, v) in table {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            toml::Value::String(s) => {
                out.insert(key, s.clone());
            }
            toml::Value::Table(sub) => {
                flatten_table(&key, sub, out)?;
            }
            other => {
                return Err(format!(
                    "binding '{}' value must be a string, got {}",
                    key,
                    other.type_str()
                ));
            }
        }
    }
    Ok(())
}
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

pub fn config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("cannot resolve home directory"))?;
    Ok(dirs.home_dir().join(".config").join("handctl"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        let cfgdir = config_dir()?;
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = match Profile::from_file(&profdir.join(format!("{active_name}.toml"))) {
            Ok(p) => p,
            Err(e) if active_name != "default" => {
                warn!("active profile '{active_name}' unusable ({e}); falling back to default");
                Profile::from_file(&def_path)?
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    pub fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir.join(format!("{name}.toml"))
    }

    /// Re-read the active profile. On error the last good profile stays.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = Profile::from_file(&self.profile_path(&self.active_name))?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profile_path(name);
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        let profile = Profile::from_file(&p)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let uinput_ok = Path::new("/dev/uinput").exists();
        let in_input_group = check_in_input_group();
        let f = &self.profile.frame;
        serde_json::json!({
            "uinput_present": uinput_ok,
            "input_group_member": in_input_group,
            "config_dir": self.config_dir,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "profile_name": self.profile.meta.name,
            "camera": format!("{}x{}", f.camera_width, f.camera_height),
            "screen": format!("{}x{}", f.screen_width, f.screen_height),
            "fps": f.fps,
            "hints": {
                "udev_rule": "/etc/udev/rules.d/80-uinput.rules",
                "add_user_to_input_group": "sudo usermod -aG input $USER && newgrp input"
            }
        })
    }
}

fn parse_profile(txt: &str, origin: &Path) -> Result<Profile> {
    let profile: Profile =
        toml::from_str(txt).map_err(|e| anyhow!("failed to parse {}: {e}", origin.display()))?;
    validate_profile(&profile).map_err(|e| anyhow!("invalid profile {}: {e}", origin.display()))?;
    Ok(profile)
}

fn validate_profile(p: &Profile) -> Result<()> {
    FrameContext::new(&p.frame)?;
    check_thresholds(&p.thresholds)?;

    for hk in Hotkey::ALL {
        let key = hk.binding_key();
        let raw = p
            .bindings
            .get(key)
            .ok_or_else(|| anyhow!("missing binding '{key}'"))?;
        raw.parse::<KeyChord>()
            .map_err(|e| anyhow!("binding '{key}': {e}"))?;
    }
    for k in p.bindings.keys() {
        if !Hotkey::ALL.iter().any(|hk| hk.binding_key() == k) {
            warn!("ignoring unknown binding '{k}'");
        }
    }

    for (label, action) in &p.labels {
        if label.trim().is_empty() {
            return Err(anyhow!("empty label key"));
        }
        let action = action.trim();
        if let Some(chord) = action.strip_prefix("key:") {
            chord
                .parse::<KeyChord>()
                .map_err(|e| anyhow!("label '{label}': {e}"))?;
        } else if let Some(cmd) = action.strip_prefix("cmd:") {
            if !p.meta.allow_commands {
                return Err(anyhow!(
                    "label '{}' uses cmd: but allow_commands=false",
                    label
                ));
            }
            if cmd.trim().is_empty() {
                return Err(anyhow!("label '{label}' has an empty command"));
            }
        } else if action != "toggle" && action != "shutdown" {
            return Err(anyhow!("label '{}' has invalid action '{}'", label, action));
        }
    }
    Ok(())
}

fn check_in_input_group() -> bool {
    if let Ok(s) = fs::read_to_string("/etc/group") {
        let user = whoami::username();
        for line in s.lines() {
            if line.starts_with("input:") {
                if line
                    .split(':')
                    .nth(3)
                    .unwrap_or("")
                    .split(',')
                    .any(|u| u == user)
                {
                    return true;
                }
            }
        }
    }
    false
}
