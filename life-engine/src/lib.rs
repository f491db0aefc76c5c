#![deny(clippy::all)]
#![forbid(unsafe_code)]

mod config;
mod controller;
mod error;

pub use config::SimConfig;
pub use controller::{RunState, SimulationController, Snapshot};
pub use error::{Result, SimError};
pub use life_grid::{Grid, GridSize, Loc, Random};
