#![deny(clippy::all)]
#![forbid(unsafe_code)]

mod app;

use error_iter::ErrorIter as _;
use life_engine::SimConfig;
use log::error;
use std::error::Error;
use std::process::ExitCode;

const GRID_SIZE: u32 = 50;
const CELL_PIXEL_WIDTH: u32 = 12;
const SEED_PROBABILITY: f64 = 0.3;
const MIN_SPEED_MILLIS: u64 = 50;
const MAX_SPEED_MILLIS: u64 = 500;
const INITIAL_SPEED_MILLIS: u64 = 100;

fn main() -> ExitCode {
    env_logger::init();
    let config = SimConfig {
        grid_size: GRID_SIZE,
        seed_probability: SEED_PROBABILITY,
        min_speed_millis: MIN_SPEED_MILLIS,
        max_speed_millis: MAX_SPEED_MILLIS,
        initial_speed_millis: INITIAL_SPEED_MILLIS,
    };
    match app::run(config, CELL_PIXEL_WIDTH) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log_error("run", err);
            ExitCode::FAILURE
        }
    }
}

fn log_error<E: Error + 'static>(method_name: &str, err: E) {
    error!("{method_name}() failed: {err}");
    for source in err.sources().skip(1) {
        error!("  Caused by: {source}");
    }
}
