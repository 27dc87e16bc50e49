//! Environmental Control Engine
//!
//! Pure threshold rules mapping a temperature sample to exhaust fan and
//! sprinkler states. Only actuators in AUTO mode are ever written.

mod engine;

pub use engine::{
    ControlEngine, ControlTarget, CurrentRelays, Decision, Evaluation, Thresholds, EXHAUST,
    SPRINKLER,
};

use thiserror::Error;

/// Control engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid thresholds: {0}")]
    InvalidThresholds(String),
}
