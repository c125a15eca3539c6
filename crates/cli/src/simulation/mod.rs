//! Synthetic multi-stream simulation.

mod coordinator;
mod source;
mod stats;

pub use coordinator::{Simulation, SimulationConfig, StrategySwitch};
pub use source::{SimulatedTimeServer, StreamProfile, SyntheticStream};
pub use stats::SimulationStats;
