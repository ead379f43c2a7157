#![allow(dead_code)]
use serde::{Deserialize, Serialize};

use super::types::{is_negligible, Capability, DeviceId, DeviceKind};

/// A single generation unit (PV array, wind turbine, fuel cell, fuel turbine).
///
/// Invariant: while online an adjustable device holds
/// `min_kw <= output_kw <= max_kw` and a binary device holds
/// `output_kw == rated_kw`; while offline `output_kw == 0`. All mutation goes
/// through the operations below, which clamp and report the kW actually moved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationDevice {
    pub id: DeviceId,
    pub name: String,
    pub kind: DeviceKind,
    /// Lower number = more essential, served first when raising generation.
    pub priority: u32,
    pub capability: Capability,
    online: bool,
    output_kw: f64,
}

impl GenerationDevice {
    pub fn new(name: impl Into<String>, kind: DeviceKind, priority: u32, capability: Capability) -> Self {
        Self {
            id: DeviceId::new(),
            name: name.into(),
            kind,
            priority,
            capability,
            online: false,
            output_kw: 0.0,
        }
    }

    /// Construct with explicit state, clamping into the invariant band.
    pub fn with_state(mut self, online: bool, output_kw: f64) -> Self {
        self.online = online;
        self.output_kw = if online {
            match self.capability {
                Capability::Adjustable { .. } => self.capability.clamp_kw(output_kw),
                // Tolerate a below-rated reading on a binary device; the
                // dispatcher repairs it through set_full_output.
                Capability::Binary { rated_kw } => output_kw.clamp(0.0, rated_kw.max(0.0)),
            }
        } else {
            0.0
        };
        self
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn output_kw(&self) -> f64 {
        if self.online {
            self.output_kw
        } else {
            0.0
        }
    }

    pub fn is_adjustable(&self) -> bool {
        self.capability.is_adjustable()
    }

    /// Output still available above the current level.
    pub fn headroom_kw(&self) -> f64 {
        if !self.online {
            return 0.0;
        }
        (self.capability.ceiling_kw() - self.output_kw).max(0.0)
    }

    /// Output removable without taking the device offline. Binary devices can
    /// only shed their entire output via deactivation.
    pub fn curtailable_kw(&self) -> f64 {
        if !self.online {
            return 0.0;
        }
        match self.capability {
            Capability::Adjustable { min_kw, .. } => (self.output_kw - min_kw.max(0.0)).max(0.0),
            Capability::Binary { .. } => self.output_kw,
        }
    }

    /// Set an adjustable device's output, clamped into `[min, max]`.
    /// Returns the resulting output. No-op on binary or offline devices.
    pub fn set_output(&mut self, kw: f64) -> f64 {
        if !self.online || !self.capability.is_adjustable() {
            return self.output_kw();
        }
        self.output_kw = self.capability.clamp_kw(kw);
        self.output_kw
    }

    /// Raise output by up to `kw`. Returns the kW actually gained.
    pub fn increase_output(&mut self, kw: f64) -> f64 {
        if !self.online || kw <= 0.0 {
            return 0.0;
        }
        let gained = kw.min(self.headroom_kw());
        if is_negligible(gained) {
            return 0.0;
        }
        self.output_kw += gained;
        gained
    }

    /// Lower output by up to `kw`, never below the adjustable floor.
    /// Returns the kW actually removed. Binary devices do not reduce; use
    /// `deactivate`.
    pub fn decrease_output(&mut self, kw: f64) -> f64 {
        if !self.online || kw <= 0.0 || !self.capability.is_adjustable() {
            return 0.0;
        }
        let removed = kw.min(self.curtailable_kw());
        if is_negligible(removed) {
            return 0.0;
        }
        self.output_kw -= removed;
        removed
    }

    /// Bring a binary device that reads below rated back to full output.
    /// Returns the kW gained.
    pub fn set_full_output(&mut self) -> f64 {
        if !self.online {
            return 0.0;
        }
        if let Capability::Binary { rated_kw } = self.capability {
            let gained = (rated_kw.max(0.0) - self.output_kw).max(0.0);
            self.output_kw = rated_kw.max(0.0);
            return gained;
        }
        0.0
    }

    /// Bring the device online at its floor output (adjustable) or rated
    /// output (binary). Returns the kW gained.
    pub fn activate(&mut self) -> f64 {
        if self.online {
            return 0.0;
        }
        self.online = true;
        self.output_kw = self.capability.floor_kw();
        self.output_kw
    }

    /// Take the device offline. Returns the kW of output removed.
    pub fn deactivate(&mut self) -> f64 {
        if !self.online {
            return 0.0;
        }
        let removed = self.output_kw;
        self.online = false;
        self.output_kw = 0.0;
        removed
    }
}
