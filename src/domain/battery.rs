#![allow(dead_code)]
use serde::{Deserialize, Serialize};

use super::types::is_negligible;

/// Result of a charge or discharge request: the energy actually moved (which
/// may be less than requested) and the resulting state of charge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryDelta {
    pub actual_kwh: f64,
    pub soc_percent: f64,
}

/// Battery energy storage system.
///
/// Invariant: `0 <= charge_kwh <= capacity_kwh`. Charge and discharge clamp
/// into this range and report the actual amount moved. A non-positive or
/// non-finite capacity is tolerated by treating the store as zero-capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryStore {
    capacity_kwh: f64,
    charge_kwh: f64,
    online: bool,
}

impl BatteryStore {
    pub fn new(capacity_kwh: f64, charge_kwh: f64) -> Self {
        let capacity = if capacity_kwh.is_finite() {
            capacity_kwh.max(0.0)
        } else {
            0.0
        };
        Self {
            capacity_kwh: capacity,
            charge_kwh: charge_kwh.clamp(0.0, capacity),
            online: true,
        }
    }

    pub fn offline(capacity_kwh: f64) -> Self {
        let mut store = Self::new(capacity_kwh, 0.0);
        store.online = false;
        store
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    pub fn capacity_kwh(&self) -> f64 {
        self.capacity_kwh
    }

    pub fn charge_kwh(&self) -> f64 {
        self.charge_kwh
    }

    pub fn free_capacity_kwh(&self) -> f64 {
        if !self.online {
            return 0.0;
        }
        (self.capacity_kwh - self.charge_kwh).max(0.0)
    }

    pub fn soc_percent(&self) -> f64 {
        if self.capacity_kwh <= 0.0 {
            return 0.0;
        }
        (self.charge_kwh / self.capacity_kwh * 100.0).clamp(0.0, 100.0)
    }

    pub fn free_percent(&self) -> f64 {
        100.0 - self.soc_percent()
    }

    /// Store up to `kwh` of energy. Returns the amount actually stored.
    pub fn charge(&mut self, kwh: f64) -> BatteryDelta {
        if !self.online || kwh <= 0.0 || !kwh.is_finite() {
            return self.delta(0.0);
        }
        let actual = kwh.min(self.free_capacity_kwh());
        if is_negligible(actual) {
            return self.delta(0.0);
        }
        self.charge_kwh += actual;
        self.delta(actual)
    }

    /// Withdraw up to `kwh` of energy. Returns the amount actually delivered.
    pub fn discharge(&mut self, kwh: f64) -> BatteryDelta {
        if !self.online || kwh <= 0.0 || !kwh.is_finite() {
            return self.delta(0.0);
        }
        let actual = kwh.min(self.charge_kwh);
        if is_negligible(actual) {
            return self.delta(0.0);
        }
        self.charge_kwh -= actual;
        self.delta(actual)
    }

    fn delta(&self, actual_kwh: f64) -> BatteryDelta {
        BatteryDelta {
            actual_kwh,
            soc_percent: self.soc_percent(),
        }
    }
}
