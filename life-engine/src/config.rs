use crate::error::{Result, SimError};
use life_grid::GridSize;

/// Tunables fixed for the lifetime of a controller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimConfig {
    /// Side length N of the N x N grid.
    pub grid_size: u32,
    /// Chance that `randomize` makes any one cell alive.
    pub seed_probability: f64,
    pub min_speed_millis: u64,
    pub max_speed_millis: u64,
    pub initial_speed_millis: u64,
}

impl SimConfig {
    pub fn grid_dimensions(&self) -> GridSize {
        GridSize::square(self.grid_size)
    }

    pub fn clamp_speed(&self, millis: u64) -> u64 {
        millis.clamp(self.min_speed_millis, self.max_speed_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.grid_size == 0 {
            return Err(invalid("grid size must be positive"));
        }
        if self.min_speed_millis == 0 {
            return Err(invalid("minimum speed must be at least 1 ms"));
        }
        if self.min_speed_millis > self.max_speed_millis {
            return Err(invalid(format!(
                "speed bounds {}..={} are reversed",
                self.min_speed_millis, self.max_speed_millis
            )));
        }
        if self.clamp_speed(self.initial_speed_millis) != self.initial_speed_millis {
            return Err(invalid(format!(
                "initial speed {} ms is outside {}..={}",
                self.initial_speed_millis, self.min_speed_millis, self.max_speed_millis
            )));
        }
        Ok(())
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            grid_size: 50,
            seed_probability: 0.3,
            min_speed_millis: 50,
            max_speed_millis: 500,
            initial_speed_millis: 100,
        }
    }
}

fn invalid(message: impl Into<String>) -> SimError {
    SimError::InvalidConfig {
        message: message.into(),
    }
}
