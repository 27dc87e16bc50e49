//! Threshold Rules

use crate::EngineError;
use serde::{Deserialize, Serialize};
use storage::{RelayMode, RelayRecord, RelayState};
use tracing::debug;

/// Device id of the exhaust fan
pub const EXHAUST: &str = "exhaust";
/// Device id of the sprinkler / mister
pub const SPRINKLER: &str = "sprinkler";

/// Actuators driven by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlTarget {
    Exhaust,
    Sprinkler,
}

impl ControlTarget {
    pub const ALL: [ControlTarget; 2] = [ControlTarget::Exhaust, ControlTarget::Sprinkler];

    /// Relay store key
    pub fn device(&self) -> &'static str {
        match self {
            ControlTarget::Exhaust => EXHAUST,
            ControlTarget::Sprinkler => SPRINKLER,
        }
    }
}

/// Temperatures above which each actuator switches on (°C, strict `>`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub exhaust_above: f64,
    pub sprinkler_above: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            exhaust_above: 25.0,
            sprinkler_above: 28.0,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.exhaust_above.is_finite() || !self.sprinkler_above.is_finite() {
            return Err(EngineError::InvalidThresholds(
                "thresholds must be finite".to_string(),
            ));
        }
        if self.sprinkler_above < self.exhaust_above {
            return Err(EngineError::InvalidThresholds(format!(
                "sprinkler threshold {} is below exhaust threshold {}",
                self.sprinkler_above, self.exhaust_above
            )));
        }
        Ok(())
    }
}

/// Stored records for both actuators; `None` means never written
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurrentRelays {
    pub exhaust: Option<RelayRecord>,
    pub sprinkler: Option<RelayRecord>,
}

impl CurrentRelays {
    pub fn get(&self, target: ControlTarget) -> Option<&RelayRecord> {
        match target {
            ControlTarget::Exhaust => self.exhaust.as_ref(),
            ControlTarget::Sprinkler => self.sprinkler.as_ref(),
        }
    }

    /// Stored mode, AUTO when absent
    pub fn mode(&self, target: ControlTarget) -> RelayMode {
        self.get(target).map(|r| r.mode).unwrap_or_default()
    }

    /// Stored state, OFF when absent
    pub fn state(&self, target: ControlTarget) -> RelayState {
        self.get(target).map(|r| r.state).unwrap_or_default()
    }
}

/// States computed from a single temperature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub exhaust: RelayState,
    pub sprinkler: RelayState,
}

impl Decision {
    pub fn state_for(&self, target: ControlTarget) -> RelayState {
        match target {
            ControlTarget::Exhaust => self.exhaust,
            ControlTarget::Sprinkler => self.sprinkler,
        }
    }
}

/// Decision plus the writes it implies
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// What the rule says for both actuators, including MANUAL ones
    pub decision: Decision,
    /// Only the actuators currently in AUTO
    pub updates: Vec<(ControlTarget, RelayState)>,
}

/// Stateless rule engine
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlEngine {
    thresholds: Thresholds,
}

impl ControlEngine {
    pub fn new(thresholds: Thresholds) -> Result<Self, EngineError> {
        thresholds.validate()?;
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Map a temperature to actuator states.
    ///
    /// Depends on the temperature alone; there is no hysteresis.
    pub fn decide(&self, temperature: f64) -> Decision {
        let on_if = |hot: bool| if hot { RelayState::On } else { RelayState::Off };
        Decision {
            exhaust: on_if(temperature > self.thresholds.exhaust_above),
            sprinkler: on_if(temperature > self.thresholds.sprinkler_above),
        }
    }

    /// Decide and keep only the writes for AUTO actuators
    pub fn evaluate(&self, temperature: f64, current: &CurrentRelays) -> Evaluation {
        let decision = self.decide(temperature);
        let updates = ControlTarget::ALL
            .into_iter()
            .filter(|target| current.mode(*target) == RelayMode::Auto)
            .map(|target| (target, decision.state_for(target)))
            .collect();

        let evaluation = Evaluation { decision, updates };
        debug!(
            "Evaluated {:.2}: exhaust={} sprinkler={} ({} auto)",
            temperature,
            decision.exhaust,
            decision.sprinkler,
            evaluation.updates.len()
        );
        evaluation
    }
}
