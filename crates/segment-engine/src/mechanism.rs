//! Detection mechanism identifiers

use crate::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Strategy used to derive segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mechanism {
    /// Debounced ignition on/off state machine
    Ignition,
    /// Windows with enough signal arrivals
    Frequency,
    /// CUSUM over per-window arrival counts
    ChangePoint,
    /// Exact engine-speed samples in the idle band
    Idling,
    /// Windowed engine-speed aggregates in the idle band
    StaticRpm,
    /// Fuel level trough to peak
    Refuel,
    /// Smoothed state-of-charge trough to peak
    Recharge,
}

impl Mechanism {
    pub const ALL: [Mechanism; 7] = [
        Mechanism::Ignition,
        Mechanism::Frequency,
        Mechanism::ChangePoint,
        Mechanism::Idling,
        Mechanism::StaticRpm,
        Mechanism::Refuel,
        Mechanism::Recharge,
    ];

    /// Stable name, also used as a metrics label
    pub fn as_str(&self) -> &'static str {
        match self {
            Mechanism::Ignition => "ignition",
            Mechanism::Frequency => "frequency",
            Mechanism::ChangePoint => "changePoint",
            Mechanism::Idling => "idling",
            Mechanism::StaticRpm => "staticRpm",
            Mechanism::Refuel => "refuel",
            Mechanism::Recharge => "recharge",
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mechanism {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignition" | "ignitiondetection" => Ok(Mechanism::Ignition),
            "frequency" | "frequencyanalysis" => Ok(Mechanism::Frequency),
            "changepoint" | "changepointdetection" => Ok(Mechanism::ChangePoint),
            "idling" | "idlingrpm" => Ok(Mechanism::Idling),
            "staticrpm" => Ok(Mechanism::StaticRpm),
            "refuel" => Ok(Mechanism::Refuel),
            "recharge" => Ok(Mechanism::Recharge),
            _ => Err(EngineError::UnknownMechanism(s.to_string())),
        }
    }
}
