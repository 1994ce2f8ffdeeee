//! Per-tick simulation systems, in the order the tick runs them.

pub mod generation;
pub mod transit;
pub mod treasury;
pub mod tribute;
pub mod upkeep;

pub use generation::run_generation_tick;
pub use transit::run_transit_tick;
pub use treasury::run_treasury_tick;
pub use tribute::run_tribute_tick;
pub use upkeep::run_upkeep_tick;
