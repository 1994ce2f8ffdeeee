//! The tick engine: a dedicated thread driving the world at a fixed rate.
//!
//! The engine thread owns the cadence; the world itself lives behind a
//! reader-writer lock shared with the front-door API. One tick holds the
//! write lock for its whole duration, so external mutations and reads
//! always observe tick boundaries. Control (halt, resume, single-step,
//! reset, rate changes) flows through a channel and takes effect at the
//! next boundary.

use crate::input::Command;
use crate::metrics::{EngineStats, SimMetrics};
use crate::routes;
use crate::state::WorldState;
use crate::step::{self, CommandError};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Post-tick broadcast payload. The state is shared, not copied; `im` maps
/// make the clone behind the `Arc` cheap.
#[derive(Clone)]
pub struct TickDigest {
    pub state: Arc<WorldState>,
    pub tick: u64,
}

enum EngineControl {
    Halt,
    Resume,
    Step,
    Reset,
    SetTickRate(f64),
    Shutdown,
}

/// Window of tick completion times used for the achieved-TPS average.
const TPS_WINDOW: usize = 32;

#[derive(Default)]
struct PerfState {
    metrics: SimMetrics,
    recent: VecDeque<Instant>,
    last_tick: Duration,
    fatal: Option<String>,
}

pub struct TickEngine {
    world: Arc<RwLock<WorldState>>,
    control_tx: Sender<EngineControl>,
    subscribers: Arc<Mutex<Vec<SyncSender<TickDigest>>>>,
    perf: Arc<Mutex<PerfState>>,
    thread: Option<JoinHandle<()>>,
}

impl TickEngine {
    /// Spawn the engine around an initial world. The initial snapshot is
    /// retained verbatim for `reset`.
    pub fn spawn(initial: WorldState) -> Self {
        let world = Arc::new(RwLock::new(initial.clone()));
        let subscribers: Arc<Mutex<Vec<SyncSender<TickDigest>>>> = Arc::default();
        let perf: Arc<Mutex<PerfState>> = Arc::default();
        let (control_tx, control_rx) = mpsc::channel();

        let thread = {
            let world = Arc::clone(&world);
            let subscribers = Arc::clone(&subscribers);
            let perf = Arc::clone(&perf);
            thread::Builder::new()
                .name("ticker".to_string())
                .spawn(move || engine_main(world, initial, control_rx, subscribers, perf))
                .expect("failed to spawn ticker thread")
        };

        TickEngine {
            world,
            control_tx,
            subscribers,
            perf,
            thread: Some(thread),
        }
    }

    /// Shared handle to the world lock, for the optimizer runner.
    pub fn world_handle(&self) -> Arc<RwLock<WorldState>> {
        Arc::clone(&self.world)
    }

    pub fn halt(&self) {
        let _ = self.control_tx.send(EngineControl::Halt);
    }

    pub fn resume(&self) {
        let _ = self.control_tx.send(EngineControl::Resume);
    }

    /// Queue a single tick to run while halted.
    pub fn next_tick(&self) {
        let _ = self.control_tx.send(EngineControl::Step);
    }

    /// Restore the initial world snapshot.
    pub fn reset(&self) {
        let _ = self.control_tx.send(EngineControl::Reset);
    }

    pub fn set_tick_rate(&self, tps: f64) {
        let _ = self.control_tx.send(EngineControl::SetTickRate(tps));
    }

    pub fn shutdown(&mut self) {
        let _ = self.control_tx.send(EngineControl::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    /// Subscribe to post-tick digests. The channel is bounded; a subscriber
    /// that falls behind loses intermediate ticks rather than stalling the
    /// engine.
    pub fn subscribe(&self, capacity: usize) -> Receiver<TickDigest> {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        self.subscribers
            .lock()
            .expect("subscriber list lock poisoned")
            .push(tx);
        rx
    }

    /// Run a closure against a read-locked world.
    pub fn with_state<R>(&self, f: impl FnOnce(&WorldState) -> R) -> R {
        let world = self.world.read().expect("world lock poisoned");
        f(&world)
    }

    /// Run a closure against the write-locked world. For bulk operations
    /// (snapshot restore, optimizer passes) that go beyond single commands.
    pub fn with_state_mut<R>(&self, f: impl FnOnce(&mut WorldState) -> R) -> R {
        let mut world = self.world.write().expect("world lock poisoned");
        f(&mut world)
    }

    /// Apply a command under the write lock; route caches invalidated by
    /// the command are rebuilt before the lock is released.
    pub fn execute(&self, cmd: &Command) -> Result<(), CommandError> {
        let mut world = self.world.write().expect("world lock poisoned");
        step::execute_command(&mut world, cmd)?;
        if world.routes_dirty {
            routes::update_routes(&mut world);
        }
        Ok(())
    }

    pub fn stats(&self) -> EngineStats {
        // Lock order matches the ticker: world first, then perf.
        let (current_tick, halted, tick_rate) = {
            let world = self.world.read().expect("world lock poisoned");
            (world.tick, world.halted, world.tick_rate)
        };
        let perf = self.perf.lock().expect("perf lock poisoned");
        let actual_tps = match (perf.recent.front(), perf.recent.back()) {
            (Some(first), Some(last)) if perf.recent.len() > 1 => {
                let span = last.duration_since(*first).as_secs_f64();
                if span > 0.0 {
                    (perf.recent.len() - 1) as f64 / span
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };
        EngineStats {
            current_tick,
            halted,
            tick_rate,
            actual_tps,
            last_tick_ms: perf.last_tick.as_secs_f64() * 1000.0,
            broadcast_drops: perf.metrics.broadcast_drops,
            fatal: perf.fatal.clone(),
        }
    }

    pub fn metrics(&self) -> SimMetrics {
        self.perf
            .lock()
            .expect("perf lock poisoned")
            .metrics
            .clone()
    }
}

impl Drop for TickEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn engine_main(
    world: Arc<RwLock<WorldState>>,
    initial: WorldState,
    control_rx: Receiver<EngineControl>,
    subscribers: Arc<Mutex<Vec<SyncSender<TickDigest>>>>,
    perf: Arc<Mutex<PerfState>>,
) {
    let mut pending_steps: u64 = 0;
    let mut last_tick = Instant::now();

    macro_rules! world_write {
        () => {
            match world.write() {
                Ok(guard) => guard,
                Err(_) => {
                    log::error!("world lock poisoned; ticker stopping");
                    if let Ok(mut p) = perf.lock() {
                        p.fatal = Some("world lock poisoned".to_string());
                    }
                    return;
                }
            }
        };
    }

    loop {
        while let Ok(cmd) = control_rx.try_recv() {
            match cmd {
                EngineControl::Halt => {
                    world_write!().halted = true;
                    log::debug!("ticker halted");
                }
                EngineControl::Resume => {
                    world_write!().halted = false;
                    pending_steps = 0;
                    log::debug!("ticker resumed");
                }
                EngineControl::Step => {
                    pending_steps += 1;
                }
                EngineControl::Reset => {
                    let mut w = world_write!();
                    *w = initial.clone();
                    log::info!("world reset to initial snapshot");
                }
                EngineControl::SetTickRate(tps) => {
                    world_write!().tick_rate = tps.clamp(0.01, 1000.0);
                    log::debug!("tick rate set to {:.2}", tps);
                }
                EngineControl::Shutdown => {
                    log::info!("ticker shutting down");
                    return;
                }
            }
        }

        let delay = match world.read() {
            Ok(w) => Duration::from_secs_f64(1.0 / w.tick_rate),
            Err(_) => {
                log::error!("world lock poisoned; ticker stopping");
                if let Ok(mut p) = perf.lock() {
                    p.fatal = Some("world lock poisoned".to_string());
                }
                return;
            }
        };

        let elapsed = last_tick.elapsed();
        if elapsed < delay {
            thread::sleep((delay - elapsed).min(Duration::from_millis(10)));
            continue;
        }
        last_tick = Instant::now();

        let digest = {
            let mut w = world_write!();
            if w.halted && pending_steps == 0 {
                None
            } else {
                if w.halted {
                    pending_steps -= 1;
                }
                let started = Instant::now();
                let mut p = perf.lock().expect("perf lock poisoned");
                step::run_tick(&mut w, Some(&mut p.metrics));
                p.last_tick = started.elapsed();
                p.recent.push_back(Instant::now());
                if p.recent.len() > TPS_WINDOW {
                    p.recent.pop_front();
                }
                Some(TickDigest {
                    state: Arc::new(w.clone()),
                    tick: w.tick,
                })
            }
        };

        if let Some(digest) = digest {
            let mut subs = subscribers.lock().expect("subscriber list lock poisoned");
            let mut drops = 0u64;
            subs.retain(|tx| match tx.try_send(digest.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    drops += 1;
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
            drop(subs);
            if drops > 0 {
                if let Ok(mut p) = perf.lock() {
                    p.metrics.broadcast_drops += drops;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UpgradeKind;
    use crate::testing::WorldStateBuilder;

    fn fast_world() -> WorldState {
        let mut state = WorldStateBuilder::new()
            .with_guild("Alpha", "ALF")
            .with_territory("A", "ALF")
            .with_hq("A")
            .build();
        state.tick_rate = 200.0;
        state
    }

    fn wait_for_tick(engine: &TickEngine, at_least: u64) {
        for _ in 0..200 {
            if engine.with_state(|w| w.tick) >= at_least {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("engine did not reach tick {}", at_least);
    }

    #[test]
    fn test_ticks_advance_and_shutdown() {
        let mut engine = TickEngine::spawn(fast_world());
        wait_for_tick(&engine, 3);
        engine.shutdown();
        let frozen = engine.with_state(|w| w.tick);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(engine.with_state(|w| w.tick), frozen);
    }

    #[test]
    fn test_halt_step_resume() {
        let mut engine = TickEngine::spawn(fast_world());
        engine.halt();
        thread::sleep(Duration::from_millis(30));
        let halted_at = engine.with_state(|w| w.tick);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(engine.with_state(|w| w.tick), halted_at);

        engine.next_tick();
        wait_for_tick(&engine, halted_at + 1);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(engine.with_state(|w| w.tick), halted_at + 1);

        engine.resume();
        wait_for_tick(&engine, halted_at + 3);
        engine.shutdown();
    }

    #[test]
    fn test_reset_restores_initial_snapshot() {
        let mut engine = TickEngine::spawn(fast_world());
        wait_for_tick(&engine, 2);
        engine
            .execute(&Command::SetUpgrade {
                territory: "A".into(),
                kind: UpgradeKind::Damage,
                level: 3,
            })
            .unwrap();
        engine.reset();
        thread::sleep(Duration::from_millis(50));
        // After reset the upgrade is gone; ticks restart from the snapshot.
        engine.halt();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(
            engine.with_state(|w| w.territory("A").unwrap().options.upgrades.damage),
            0
        );
        engine.shutdown();
    }

    #[test]
    fn test_subscriber_receives_digests() {
        let mut engine = TickEngine::spawn(fast_world());
        let rx = engine.subscribe(8);
        let digest = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(digest.tick >= 1);
        assert_eq!(digest.state.tick, digest.tick);
        engine.shutdown();
    }

    #[test]
    fn test_slow_subscriber_drops_not_stalls() {
        let mut engine = TickEngine::spawn(fast_world());
        let rx = engine.subscribe(1);
        wait_for_tick(&engine, 30);
        engine.halt();
        thread::sleep(Duration::from_millis(30));
        // Only the bounded backlog is delivered; the rest were dropped.
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert!(received <= 2);
        assert!(engine.stats().broadcast_drops > 0);
        engine.shutdown();
    }

    #[test]
    fn test_stats_shape() {
        let mut engine = TickEngine::spawn(fast_world());
        wait_for_tick(&engine, 5);
        let stats = engine.stats();
        assert!(stats.current_tick >= 5);
        assert!(stats.actual_tps > 0.0);
        assert!(stats.fatal.is_none());
        engine.shutdown();
    }
}
