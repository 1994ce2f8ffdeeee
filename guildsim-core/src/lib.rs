//! # Guild Territorial Economy Core
//!
//! Simulation engine for a guild-based territorial economy: per-territory
//! resource generation, in-transit movement along computed trading routes,
//! border taxation, treasury tiers, periodic tributes, and an automatic
//! claim optimizer, all driven by a fixed-rate ticker.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   verbs    ┌────────────┐   commands   ┌────────────┐
//! │  Adapter   │───────────▶│ TickEngine │─────────────▶│ WorldState │
//! │ (UI/script)│◀───────────│  (ticker)  │   run_tick   │ (RwLock'd) │
//! └────────────┘  digests   └────────────┘              └─────┬──────┘
//!                                                             │
//!                      ┌──────────────┐    reads/mutates      │
//!                      │  Optimizer   │◀──────────────────────┘
//!                      │ (own thread) │   via the same commands
//!                      └──────────────┘
//! ```
//!
//! ## Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`WorldState`] | Complete simulation state (territories, guilds, tributes) |
//! | [`Command`] | Front-door mutations (ownership, levels, tributes, pins) |
//! | [`run_tick`] | Advance the world one simulated second |
//! | [`TickEngine`] | Dedicated ticker thread with halt/resume/step/reset |
//! | [`optimizer::run_pass`] | One automatic claim-configuration pass |
//!
//! The tick holds the world write lock for its whole duration, so all
//! readers and writers observe tick boundaries atomically. Routes are
//! cached per territory and recomputed when ownership, borders, allies,
//! routing modes, or topology change.

pub mod adapter;
pub mod chokepoint;
pub mod defines;
pub mod engine;
pub mod files;
pub mod graph;
pub mod input;
pub mod metrics;
pub mod optimizer;
pub mod resources;
pub mod routes;
pub mod snapshot;
pub mod state;
pub mod step;
pub mod systems;
pub mod testing;

pub use engine::{TickDigest, TickEngine};
pub use input::{Command, RouteDirection};
pub use metrics::{EngineStats, SimMetrics};
pub use resources::{PerHour, PerSecond, ResourceKind, Resources};
pub use state::{
    Border, BonusKind, Guild, Route, RoutingMode, Territory, TransitPacket, TreasuryLevel,
    Tribute, UpgradeKind, Warnings, WorldState, NONE_TAG,
};
pub use step::{execute_command, run_tick, CommandError};

#[cfg(test)]
mod step_tests;
