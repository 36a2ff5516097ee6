use anyhow::{Result, anyhow};
use log::{error, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::{Value, json};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use std::{
    fs,
    io::{self, BufRead, BufReader, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::{Path, PathBuf},
    sync::mpsc::{self, Sender},
    thread,
    time::Duration,
};

use super::pipeline::{Shared, run_pipeline};
use super::runtime::socket_path;
use crate::config::DaemonConfigState;
use crate::input;

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

pub fn run_daemon() -> Result<()> {
    // socket
    let sock = socket_path()?;
    if sock.exists() {
        let _ = fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    info!("daemon: listening on {}", sock.display());

    // config
    let mut cfg = DaemonConfigState::load_or_install_default()?;
    info!("daemon: active profile '{}'", cfg.active_name);

    let shared = Shared::default();
    shared.profile.publish(cfg.profile.clone());
    shared.active.publish(cfg.active_name.clone());

    // channels
    let (tx_req, rx_req) = mpsc::channel::<IpcMsg>();
    let (tx_evt, rx_evt) = mpsc::channel::<DaemonEvent>();

    // control loop
    {
        let shared = shared.clone();
        thread::spawn(move || {
            if let Err(e) = run_pipeline(shared, tx_evt) {
                error!("control loop failed: {e}");
            }
        });
    }

    spawn_signal_thread(tx_req.clone())?;
    let _watcher = match watch_profiles(&cfg.profiles_dir, tx_req.clone()) {
        Ok(w) => Some(w),
        Err(e) => {
            warn!("profile watcher unavailable ({e}); use `handctl reload`");
            None
        }
    };

    // accept loop
    listener.set_nonblocking(true)?;
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                let client = Client {
                    cfg: cfg.clone(),
                    shared: shared.clone(),
                    tx: tx_req.clone(),
                };
                thread::spawn(move || {
                    if let Err(e) = handle_client(stream, client) {
                        error!("ipc client error: {e}");
                    }
                });
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => error!("accept failed: {e}"),
        }

        while let Ok(evt) = rx_evt.try_recv() {
            match evt {
                DaemonEvent::ShutdownRequested => {
                    let _ = tx_req.send(IpcMsg::Shutdown);
                }
            }
        }

        while let Ok(msg) = rx_req.try_recv() {
            match msg {
                IpcMsg::Reload(reply) => {
                    let res = cfg.reload().map(|()| cfg.active_name.clone());
                    match &res {
                        Ok(_) => {
                            shared.profile.publish(cfg.profile.clone());
                            info!("profile reloaded");
                        }
                        Err(e) => error!("reload failed, keeping last good profile: {e}"),
                    }
                    let _ = reply.send(res);
                }
                IpcMsg::UseProfile(name, reply) => {
                    let res = cfg.set_active(&name).map(|()| cfg.active_name.clone());
                    match &res {
                        Ok(_) => {
                            shared.profile.publish(cfg.profile.clone());
                            shared.active.publish(cfg.active_name.clone());
                            info!("switched active profile to {}", cfg.active_name);
                        }
                        Err(e) => error!("use profile failed: {e}"),
                    }
                    let _ = reply.send(res);
                }
                IpcMsg::ProfileChanged(paths) => {
                    let active = cfg.profile_path(&cfg.active_name);
                    if !paths.contains(&active) {
                        continue;
                    }
                    match cfg.reload() {
                        Ok(()) => {
                            shared.profile.publish(cfg.profile.clone());
                            info!("{} changed on disk; reloaded", active.display());
                        }
                        Err(e) => warn!("{} changed but is invalid: {e}", active.display()),
                    }
                }
                IpcMsg::Shutdown => {
                    let _ = fs::remove_file(&sock);
                    info!("daemon: shut down");
                    return Ok(());
                }
            }
        }

        thread::sleep(Duration::from_millis(5));
    }
}

fn spawn_signal_thread(tx: Sender<IpcMsg>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("daemon: caught signal {sig}");
            let _ = tx.send(IpcMsg::Shutdown);
        }
    });
    Ok(())
}

fn watch_profiles(dir: &Path, tx: Sender<IpcMsg>) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(ev) if matches!(ev.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
            let paths: Vec<PathBuf> = ev
                .paths
                .into_iter()
                .filter(|p| p.extension().is_some_and(|e| e == "toml"))
                .collect();
            if !paths.is_empty() {
                let _ = tx.send(IpcMsg::ProfileChanged(paths));
            }
        }
        Ok(_) => {}
        Err(e) => warn!("profile watcher: {e}"),
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// One connection. Control clients send a request and read one reply per
/// line; perception feeders stream `observe` lines and never get a reply.
fn handle_client(stream: UnixStream, client: Client) -> Result<()> {
    stream.set_nonblocking(false)?;
    let mut writer = stream.try_clone()?;
    let reader = BufReader::new(stream);

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let req: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                writeln!(writer, "{}", json!({"ok": false, "error": format!("bad request: {e}")}))?;
                continue;
            }
        };
        let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");

        if op == "observe" {
            match input::decode_line(line) {
                Ok(rec) => {
                    client.shared.observations.publish(rec.into_observation());
                }
                Err(e) => warn!("dropping observation: {e}"),
            }
            continue;
        }

        let resp = client.respond(op, &req);
        writeln!(writer, "{resp}")?;
        if op == "shutdown" {
            break;
        }
    }
    Ok(())
}

struct Client {
    cfg: DaemonConfigState,
    shared: Shared,
    tx: Sender<IpcMsg>,
}

impl Client {
    /// The daemon's current profile; `cfg` is only a snapshot from accept time.
    fn active_name(&self) -> String {
        match self.shared.active.latest() {
            Some((_, name)) => name.as_ref().clone(),
            None => self.cfg.active_name.clone(),
        }
    }

    fn respond(&self, op: &str, req: &Value) -> Value {
        match op {
            "status" => {
                let engine = match self.shared.status.latest() {
                    Some((_, report)) => serde_json::to_value(report.as_ref()).unwrap_or(Value::Null),
                    None => json!("starting"),
                };
                json!({"ok": true, "data": {
                    "active_profile": self.active_name(),
                    "socket": socket_path().ok(),
                    "observations": self.shared.observations.generation(),
                    "engine": engine,
                }})
            }
            "reload" => self.await_reply(IpcMsg::Reload),
            "use" => match req.get("profile").and_then(|v| v.as_str()) {
                Some(name) if !name.is_empty() => {
                    let name = name.to_string();
                    self.await_reply(move |reply| IpcMsg::UseProfile(name, reply))
                }
                _ => json!({"ok": false, "error": "missing profile name"}),
            },
            "list" => {
                let list = self.cfg.list_profiles();
                json!({"ok": true, "data": {"profiles": list, "active": self.active_name()}})
            }
            "doctor" => json!({"ok": true, "data": self.cfg.doctor_report()}),
            "shutdown" => {
                let _ = self.tx.send(IpcMsg::Shutdown);
                json!({"ok": true, "data": "shutting down"})
            }
            _ => json!({"ok": false, "error": format!("unknown op: {op}")}),
        }
    }

    fn await_reply(&self, make: impl FnOnce(Sender<Result<String>>) -> IpcMsg) -> Value {
        let (tx, rx) = mpsc::channel();
        if self.tx.send(make(tx)).is_err() {
            return json!({"ok": false, "error": "daemon is shutting down"});
        }
        match rx.recv_timeout(REPLY_TIMEOUT) {
            Ok(Ok(active)) => json!({"ok": true, "data": {"active_profile": active}}),
            Ok(Err(e)) => json!({"ok": false, "error": e.to_string()}),
            Err(_) => json!({"ok": false, "error": "daemon did not answer"}),
        }
    }
}

enum IpcMsg {
    Reload(Sender<Result<String>>),
    UseProfile(String, Sender<Result<String>>),
    ProfileChanged(Vec<PathBuf>),
    Shutdown,
}

pub enum DaemonEvent {
    ShutdownRequested,
}

// client helper
pub fn client_request(req: Value) -> Result<Value> {
    let sock = socket_path()?;
    if !sock.exists() {
        return Err(anyhow!(
            "handctl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: Value = serde_json::from_str(&resp)?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::gestures::Mode;
    use crate::ipc::pipeline::StatusReport;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("handctl-test-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("profiles")).unwrap();
        dir
    }

    fn client(tag: &str) -> (Client, mpsc::Receiver<IpcMsg>) {
        let dir = scratch_dir(tag);
        let profiles_dir = dir.join("profiles");
        fs::write(profiles_dir.join("default.toml"), "").unwrap();
        fs::write(profiles_dir.join("desk.toml"), "").unwrap();
        fs::write(profiles_dir.join("notes.txt"), "").unwrap();
        let cfg = DaemonConfigState {
            active_name: "default".into(),
            profile: Profile::builtin().unwrap(),
            active_ptr: dir.join("active"),
            config_dir: dir,
            profiles_dir,
        };
        let (tx, rx) = mpsc::channel();
        let client = Client {
            cfg,
            shared: Shared::default(),
            tx,
        };
        (client, rx)
    }

    #[test]
    fn test_list_only_toml_profiles() {
        let (c, _rx) = client("list");
        let r = c.respond("list", &json!({"op": "list"}));
        assert_eq!(r["ok"], true);
        assert_eq!(r["data"]["profiles"], json!(["default", "desk"]));
        assert_eq!(r["data"]["active"], "default");
    }

    #[test]
    fn test_status_reads_latest_report() {
        let (c, _rx) = client("status");
        let r = c.respond("status", &json!({"op": "status"}));
        assert_eq!(r["data"]["engine"], "starting");

        c.shared.status.publish(StatusReport {
            mode: Mode::ScrollOrZoom,
            status: "Scroll Mode".into(),
            enabled: true,
            ticks: 7,
            observation: 3,
        });
        let r = c.respond("status", &json!({"op": "status"}));
        assert_eq!(r["data"]["engine"]["mode"], "scroll_or_zoom");
        assert_eq!(r["data"]["engine"]["status"], "Scroll Mode");
        assert_eq!(r["data"]["engine"]["ticks"], 7);
    }

    #[test]
    fn test_status_follows_profile_switch_after_connect() {
        let (c, _rx) = client("switch");
        let r = c.respond("status", &json!({"op": "status"}));
        assert_eq!(r["data"]["active_profile"], "default");

        // another connection switched profiles after this one was accepted
        c.shared.active.publish("desk".into());
        let r = c.respond("status", &json!({"op": "status"}));
        assert_eq!(r["data"]["active_profile"], "desk");
        let r = c.respond("list", &json!({"op": "list"}));
        assert_eq!(r["data"]["active"], "desk");
    }

    #[test]
    fn test_use_forwards_to_daemon_loop() {
        let (c, rx) = client("use");
        let loop_side = thread::spawn(move || match rx.recv().unwrap() {
            IpcMsg::UseProfile(name, reply) => {
                reply.send(Err(anyhow!("profile not found: {name}"))).unwrap();
            }
            _ => panic!("unexpected message"),
        });
        let r = c.respond("use", &json!({"op": "use", "profile": "nope"}));
        loop_side.join().unwrap();
        assert_eq!(r["ok"], false);
        assert_eq!(r["error"], "profile not found: nope");
    }

    #[test]
    fn test_use_requires_name_and_unknown_op_fails() {
        let (c, _rx) = client("misc");
        assert_eq!(c.respond("use", &json!({"op": "use"}))["ok"], false);
        let r = c.respond("frobnicate", &json!({}));
        assert_eq!(r["error"], "unknown op: frobnicate");
    }

    #[test]
    fn test_shutdown_notifies_loop() {
        let (c, rx) = client("shutdown");
        assert_eq!(c.respond("shutdown", &json!({}))["ok"], true);
        assert!(matches!(rx.try_recv(), Ok(IpcMsg::Shutdown)));
    }
}
