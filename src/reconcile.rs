use std::sync::Arc;
use std::sync::mpsc::SyncSender;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::jobs::{JobRegistry, RegistrySnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRates {
    pub idle: Duration,
    pub running: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub running: usize,
    pub follow_output: bool,
}

impl StatusUpdate {
    pub fn status_text(&self) -> String {
        format!("{} running", self.running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub update: Option<StatusUpdate>,
    pub sleep: Duration,
}

#[derive(Debug)]
pub struct Reconciler {
    rates: RefreshRates,
    last_running: usize,
}

impl Reconciler {
    pub fn new(rates: RefreshRates) -> Self {
        Self {
            rates,
            last_running: 0,
        }
    }

    pub fn step(&mut self, snapshot: &RegistrySnapshot) -> Tick {
        let running = snapshot.running;
        let previous = std::mem::replace(&mut self.last_running, running);

        if running > 0 {
            return Tick {
                update: Some(StatusUpdate {
                    running,
                    follow_output: true,
                }),
                sleep: self.rates.running,
            };
        }

        // Announce going idle exactly once.
        let update = (previous > 0).then_some(StatusUpdate {
            running: 0,
            follow_output: false,
        });
        Tick {
            update,
            sleep: self.rates.idle,
        }
    }

    pub fn cycle(&mut self, registry: &JobRegistry) -> Tick {
        let snapshot = registry.snapshot();
        let tick = self.step(&snapshot);
        if !snapshot.finished.is_empty() {
            let reaped = registry.reap(&snapshot.finished);
            debug!(reaped, remaining = registry.entry_count(), "reaped finished jobs");
        }
        tick
    }
}

pub fn spawn_status_loop<E>(
    registry: Arc<JobRegistry>,
    rates: RefreshRates,
    events: SyncSender<E>,
) -> Result<thread::JoinHandle<()>>
where
    E: From<StatusUpdate> + Send + 'static,
{
    thread::Builder::new()
        .name("status-loop".to_string())
        .spawn(move || {
            let mut reconciler = Reconciler::new(rates);
            loop {
                let tick = reconciler.cycle(&registry);
                if let Some(update) = tick.update {
                    if events.send(E::from(update)).is_err() {
                        break;
                    }
                }
                thread::sleep(tick.sleep);
            }
            info!("status loop stopped");
        })
        .context("failed to start status loop thread")
}
