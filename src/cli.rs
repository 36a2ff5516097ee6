use anyhow::{Result, anyhow};
use log::warn;
use pico_args::Arguments;
use serde_json::{Value, json};
use std::{
    env,
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
    process::Command,
    time::Duration,
};

use crate::actions::{ActionSink, Emitted, RecordingSink, UinputSink};
use crate::config::Profile;
use crate::gestures::GestureEngine;
use crate::input;
use crate::ipc::{self, Dispatched};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        return ipc::run_daemon();
    }

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("start") => {
            let exe = env::current_exe()?;
            let child = Command::new(exe).arg("--daemon").spawn()?;
            println!("handctl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some(op @ ("stop" | "status" | "reload" | "list" | "doctor")) => {
            let op = if op == "stop" { "shutdown" } else { op };
            let r = ipc::client_request(json!({"op": op}))?;
            print_response(&r);
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl use <profile_name>"))?;
            let r = ipc::client_request(json!({"op":"use","profile":name}))?;
            print_response(&r);
            Ok(())
        }

        Some("replay") => {
            let profile_path: Option<PathBuf> = pargs.opt_value_from_str("--profile")?;
            let file: PathBuf = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl replay <file.jsonl> [--profile <path>]"))?;
            let profile = match profile_path {
                Some(p) => Profile::from_file(&p)?,
                None => Profile::builtin()?,
            };
            let f = File::open(&file).map_err(|e| anyhow!("cannot open {}: {e}", file.display()))?;
            for line in replay(&profile, BufReader::new(f))? {
                println!("{line}");
            }
            Ok(())
        }

        Some("emit") => {
            // usage:
            //   handctl emit move 960 540
            //   handctl emit click
            //   handctl emit scroll 3
            //   handctl emit key CTRL+EQUAL
            let what: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl emit <move|click|scroll|key> ..."))?;
            let frame = Profile::builtin()?.frame;
            let mut sink = UinputSink::new(frame.screen_width, frame.screen_height)?;
            match what.as_str() {
                "move" => {
                    let x: f32 = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: handctl emit move <x> <y>"))?;
                    let y: f32 = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: handctl emit move <x> <y>"))?;
                    sink.move_to(x, y)?;
                    println!("ok: moved to {x},{y}");
                }
                "click" => {
                    sink.click()?;
                    println!("ok: clicked");
                }
                "scroll" => {
                    let steps: i32 = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: handctl emit scroll <steps>"))?;
                    sink.scroll(steps)?;
                    println!("ok: scrolled vertical {steps}");
                }
                "key" => {
                    let chord: String = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: handctl emit key CTRL+EQUAL"))?;
                    sink.key_chord(&chord.parse()?)?;
                    println!("ok: sent key chord {chord}");
                }
                other => return Err(anyhow!("unknown emit kind: {other}")),
            }
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

/// Run a recorded observation stream through a fresh engine. One JSON value
/// per tick that produced actions; a bound `shutdown` label ends the replay.
/// `cmd:` labels are never executed here.
pub fn replay(profile: &Profile, reader: impl BufRead) -> Result<Vec<Value>> {
    let mut profile = profile.clone();
    profile.meta.allow_commands = false;

    let frame_ms = 1000 / u64::from(profile.frame.fps.max(1));
    let recording = input::read_recording(reader, frame_ms)?;
    let mut engine = GestureEngine::from_profile(&profile)?;
    let mut sink = RecordingSink::new();

    let mut out = Vec::new();
    for (t_ms, obs) in &recording {
        let tick = engine.tick(Some(obs), Duration::from_millis(*t_ms));
        if tick.actions.is_empty() {
            continue;
        }
        let mut stop = false;
        for action in &tick.actions {
            match ipc::dispatch_action(action, &profile, &mut sink) {
                Ok(Dispatched::Done) => {}
                Ok(Dispatched::Shutdown) => stop = true,
                Err(e) => warn!("t={t_ms}ms: {e}"),
            }
        }
        let emitted: Vec<Emitted> = sink.emitted.drain(..).collect();
        out.push(json!({
            "t_ms": t_ms,
            "mode": tick.mode,
            "status": tick.status.to_string(),
            "actions": tick.actions,
            "emitted": emitted,
        }));
        if stop {
            out.push(json!({"t_ms": t_ms, "shutdown": true}));
            break;
        }
    }
    Ok(out)
}

fn print_help() {
    println!(
        r#"handctl - hand-gesture input daemon

USAGE:
  handctl help [command]                  Show general or command-specific help
  handctl start                           Start the daemon
  handctl stop                            Stop the daemon
  handctl status                          Show daemon and engine state
  handctl reload                          Reload active profile
  handctl use <name>                      Switch active profile
  handctl list                            List profiles
  handctl doctor                          Diagnose permissions and profile paths
  handctl replay <file.jsonl>             Run a recording offline, print actions
  handctl emit move <x> <y>               Move the pointer (screen pixels)
  handctl emit click                      Emit a left click
  handctl emit scroll <steps>             Emit vertical scroll (+/- steps)
  handctl emit key CTRL+EQUAL             Emit a key or chord

TIPS:
  - Feeders stream {{"op":"observe","hands":[...]}} lines to the daemon socket
  - Profiles: ~/.config/handctl/profiles
  - Active profile pointer: ~/.config/handctl/active
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "start" => println!("usage: handctl start\nStarts the background daemon."),
        "stop" => println!("usage: handctl stop\nStops the running daemon."),
        "status" => println!(
            "usage: handctl status\nShows active profile, socket, current mode, status text and tick count."
        ),
        "reload" => println!(
            "usage: handctl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: handctl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => println!("usage: handctl list\nLists available profiles."),
        "doctor" => println!(
            "usage: handctl doctor\nChecks /dev/uinput, input group membership and profile paths."
        ),
        "replay" => println!(
            "usage: handctl replay <file.jsonl> [--profile <path>]\nFeeds recorded observations (one JSON object per line, optional t_ms)\nthrough the engine and prints the resulting actions as JSON lines."
        ),
        "emit" => println!(
            "usage:\n  handctl emit move <x> <y>\n  handctl emit click\n  handctl emit scroll <steps>\n  handctl emit key CTRL+EQUAL"
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
