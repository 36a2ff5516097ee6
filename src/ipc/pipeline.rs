use anyhow::{Result, anyhow};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::{
    sync::{Arc, mpsc::Sender},
    thread,
    time::{Duration, Instant},
};

use super::dispatch::{Dispatched, dispatch_action};
use super::server::DaemonEvent;
use crate::actions::{ActionSink, UinputSink};
use crate::config::{FrameConfig, Profile};
use crate::gestures::{GestureEngine, Mode};
use crate::hand::HandObservation;
use crate::slot::LatestSlot;

/// What `handctl status` shows about the control loop.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub mode: Mode,
    pub status: String,
    pub enabled: bool,
    pub ticks: u64,
    /// Generation of the observation the last tick consumed (0 = none yet).
    pub observation: u64,
}

/// Slots shared between the socket side and the control loop.
#[derive(Clone, Default)]
pub struct Shared {
    pub profile: Arc<LatestSlot<Profile>>,
    /// Name of the active profile, republished on every switch.
    pub active: Arc<LatestSlot<String>>,
    pub observations: Arc<LatestSlot<HandObservation>>,
    pub status: Arc<LatestSlot<StatusReport>>,
}

struct ControlLoop {
    profile_gen: u64,
    profile: Arc<Profile>,
    engine: GestureEngine,
    ticks: u64,
}

impl ControlLoop {
    fn new(profiles: &LatestSlot<Profile>) -> Result<Self> {
        let (profile_gen, profile) = profiles
            .latest()
            .ok_or_else(|| anyhow!("no profile published"))?;
        let engine = GestureEngine::from_profile(&profile)?;
        Ok(Self {
            profile_gen,
            profile,
            engine,
            ticks: 0,
        })
    }

    /// Adopt a newly published profile with a fresh session. Returns the new
    /// frame when the screen geometry changed.
    fn refresh(&mut self, profiles: &LatestSlot<Profile>) -> Option<FrameConfig> {
        let (g, p) = profiles.latest()?;
        if g == self.profile_gen {
            return None;
        }
        self.profile_gen = g;
        match GestureEngine::from_profile(&p) {
            Ok(engine) => {
                let old = &self.profile.frame;
                let resized = old.screen_width != p.frame.screen_width
                    || old.screen_height != p.frame.screen_height;
                info!(
                    "control loop: profile updated, session reset (was {:?})",
                    self.engine.mode()
                );
                self.engine = engine;
                self.profile = p;
                resized.then(|| self.profile.frame.clone())
            }
            Err(e) => {
                error!("control loop: profile rejected ({e}); keeping previous");
                None
            }
        }
    }

    fn step(
        &mut self,
        obs: Option<&(u64, Arc<HandObservation>)>,
        now: Duration,
        sink: &mut dyn ActionSink,
    ) -> (StatusReport, Dispatched) {
        let tick = self.engine.tick(obs.map(|(_, o)| o.as_ref()), now);
        let mut outcome = Dispatched::Done;
        for action in &tick.actions {
            debug!("{:?}: {action:?}", tick.mode);
            match dispatch_action(action, &self.profile, sink) {
                Ok(Dispatched::Done) => {}
                Ok(Dispatched::Shutdown) => outcome = Dispatched::Shutdown,
                Err(e) => error!("dispatch failed: {e}"),
            }
        }
        self.ticks += 1;
        let report = StatusReport {
            mode: tick.mode,
            status: tick.status.to_string(),
            enabled: sink.is_enabled(),
            ticks: self.ticks,
            observation: obs.map_or(0, |(g, _)| *g),
        };
        (report, outcome)
    }

    fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.profile.frame.fps.max(1)))
    }
}

fn open_sink(frame: &FrameConfig) -> UinputSink {
    match UinputSink::new(frame.screen_width, frame.screen_height) {
        Ok(s) => {
            info!(
                "uinput sink ready ({}x{})",
                frame.screen_width, frame.screen_height
            );
            s
        }
        Err(e) => {
            warn!("uinput unavailable ({e}); actions will be dropped");
            UinputSink::noop()
        }
    }
}

pub fn run_pipeline(shared: Shared, tx_evt: Sender<DaemonEvent>) -> Result<()> {
    let mut ctl = ControlLoop::new(&shared.profile)?;
    let mut sink = open_sink(&ctl.profile.frame);
    info!("control loop: {} fps", ctl.profile.frame.fps);

    let start = Instant::now();
    let mut deadline = start;
    loop {
        if let Some(frame) = ctl.refresh(&shared.profile) {
            let en = sink.is_enabled();
            sink = open_sink(&frame);
            sink.set_enabled(en);
        }

        let obs = shared.observations.latest();
        let (report, outcome) = ctl.step(obs.as_ref(), start.elapsed(), &mut sink);
        shared.status.publish(report);
        if outcome == Dispatched::Shutdown {
            let _ = tx_evt.send(DaemonEvent::ShutdownRequested);
        }

        deadline += ctl.period();
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        } else {
            // fell behind; don't try to catch up with a burst of ticks
            deadline = now;
        }
    }
}
