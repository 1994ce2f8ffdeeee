//! Background optimizer runner.
//!
//! Runs configuration passes on its own thread, either once, on a wall
//! clock cadence, or whenever the world has advanced a number of ticks.
//! Stopping takes effect as soon as the current pass completes.

use super::{run_pass, OptimizerOptions};
use crate::routes;
use crate::state::WorldState;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// One pass, then the runner exits on its own.
    None,
    /// Sleep this long between passes.
    EveryDuration(Duration),
    /// Wait until the world tick has advanced this far between passes.
    EveryTicks(u64),
}

pub struct OptimizerRunner {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

/// Poll cadence while waiting for ticks or a stop signal.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

impl OptimizerRunner {
    pub fn start(
        world: Arc<RwLock<WorldState>>,
        options: OptimizerOptions,
        mode: LoopMode,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("optimizer".to_string())
            .spawn(move || runner_main(world, options, mode, stop_rx))
            .expect("failed to spawn optimizer thread");
        OptimizerRunner {
            stop_tx,
            thread: Some(thread),
        }
    }

    /// Signal the runner and wait for it to finish. Safe to call twice.
    pub fn stop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for OptimizerRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn runner_main(
    world: Arc<RwLock<WorldState>>,
    options: OptimizerOptions,
    mode: LoopMode,
    stop_rx: Receiver<()>,
) {
    loop {
        {
            let mut state = match world.write() {
                Ok(state) => state,
                Err(_) => {
                    log::error!("world lock poisoned; optimizer runner stopping");
                    return;
                }
            };
            let report = run_pass(&mut state, &options);
            if state.routes_dirty {
                routes::update_routes(&mut state);
            }
            log::info!(
                "optimizer pass for {}: {} actions, {} warnings",
                options.guild,
                report.actions.len(),
                report.warnings.len()
            );
            for warning in &report.warnings {
                log::warn!("optimizer: {}", warning);
            }
        }

        match mode {
            LoopMode::None => return,
            LoopMode::EveryDuration(period) => match stop_rx.recv_timeout(period) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            },
            LoopMode::EveryTicks(ticks) => {
                let resume_at = match world.read() {
                    Ok(state) => state.tick + ticks,
                    Err(_) => return,
                };
                loop {
                    match stop_rx.recv_timeout(POLL_INTERVAL) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                    }
                    match world.read() {
                        Ok(state) if state.tick >= resume_at => break,
                        Ok(_) => {}
                        Err(_) => return,
                    }
                }
            }
        }
    }
}
