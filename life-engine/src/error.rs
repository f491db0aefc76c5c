use life_grid::BernoulliError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("cell ({row}, {col}) is outside the {width}x{height} grid")]
    OutOfBounds {
        row: u32,
        col: u32,
        width: u32,
        height: u32,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("invalid seed probability")]
    InvalidProbability(#[from] BernoulliError),

    #[error("no tokio runtime to drive the simulation")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

pub type Result<T> = std::result::Result<T, SimError>;
