use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};
use uuid::Uuid;

/// Power comparisons below this threshold are treated as zero (kW / kWh).
pub const EPSILON_KW: f64 = 1e-6;

/// Returns true when a power or energy amount is negligible.
pub fn is_negligible(kw: f64) -> bool {
    kw.abs() < EPSILON_KW
}

/// Stable identifier for a generation or load device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub Uuid);

impl DeviceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generation technology. Behavior does not differ per kind; the tag exists
/// for reporting and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Pv,
    Wind,
    FuelCell,
    FuelTurbine,
}

/// How a device's power level can be steered.
///
/// Adjustable devices support continuous output/draw between `min_kw` and
/// `max_kw`. Binary devices are on/off only and run at `rated_kw` while on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum Capability {
    Adjustable { min_kw: f64, max_kw: f64 },
    Binary { rated_kw: f64 },
}

impl Capability {
    pub fn is_adjustable(&self) -> bool {
        matches!(self, Capability::Adjustable { .. })
    }

    /// Lowest sustainable power level while online.
    pub fn floor_kw(&self) -> f64 {
        match *self {
            Capability::Adjustable { min_kw, .. } => min_kw.max(0.0),
            Capability::Binary { rated_kw } => rated_kw.max(0.0),
        }
    }

    /// Highest sustainable power level while online.
    pub fn ceiling_kw(&self) -> f64 {
        match *self {
            Capability::Adjustable { min_kw, max_kw } => max_kw.max(min_kw).max(0.0),
            Capability::Binary { rated_kw } => rated_kw.max(0.0),
        }
    }

    /// Clamp a requested power level into the sustainable band.
    pub fn clamp_kw(&self, kw: f64) -> f64 {
        kw.clamp(self.floor_kw(), self.ceiling_kw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negligible_threshold() {
        assert!(is_negligible(0.0));
        assert!(is_negligible(5e-7));
        assert!(!is_negligible(0.001));
    }

    #[test]
    fn capability_clamps_into_band() {
        let cap = Capability::Adjustable {
            min_kw: 10.0,
            max_kw: 50.0,
        };
        assert_eq!(cap.clamp_kw(5.0), 10.0);
        assert_eq!(cap.clamp_kw(75.0), 50.0);
        assert_eq!(cap.clamp_kw(30.0), 30.0);
    }

    #[test]
    fn binary_floor_equals_ceiling() {
        let cap = Capability::Binary { rated_kw: 40.0 };
        assert_eq!(cap.floor_kw(), 40.0);
        assert_eq!(cap.ceiling_kw(), 40.0);
        assert!(!cap.is_adjustable());
    }

    #[test]
    fn device_kind_round_trips_through_strings() {
        assert_eq!("fuel_cell".parse::<DeviceKind>().unwrap(), DeviceKind::FuelCell);
        assert_eq!(DeviceKind::Pv.to_string(), "pv");
    }
}
