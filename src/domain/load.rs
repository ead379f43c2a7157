#![allow(dead_code)]
use serde::{Deserialize, Serialize};

use super::types::{is_negligible, Capability, DeviceId};

/// A consumer load. Adjustable loads can be throttled between `min_kw` and
/// `max_kw`; non-adjustable loads draw their full rated power or nothing.
///
/// Invariant mirrors [`GenerationDevice`]: `draw_kw` stays inside the
/// capability band while online and is zero while offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadDevice {
    pub id: DeviceId,
    pub name: String,
    /// Lower number = more essential, shed last.
    pub priority: u32,
    pub capability: Capability,
    online: bool,
    draw_kw: f64,
}

impl LoadDevice {
    pub fn new(name: impl Into<String>, priority: u32, capability: Capability) -> Self {
        Self {
            id: DeviceId::new(),
            name: name.into(),
            priority,
            capability,
            online: false,
            draw_kw: 0.0,
        }
    }

    /// Construct with explicit state, clamping into the invariant band.
    pub fn with_state(mut self, online: bool, draw_kw: f64) -> Self {
        self.online = online;
        self.draw_kw = if online {
            self.capability.clamp_kw(draw_kw)
        } else {
            0.0
        };
        self
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn draw_kw(&self) -> f64 {
        if self.online {
            self.draw_kw
        } else {
            0.0
        }
    }

    pub fn is_adjustable(&self) -> bool {
        self.capability.is_adjustable()
    }

    /// Power removable from this load: down to `min_kw` for adjustable loads,
    /// the entire draw (via deactivation) for binary loads.
    pub fn sheddable_kw(&self) -> f64 {
        if !self.online {
            return 0.0;
        }
        match self.capability {
            Capability::Adjustable { min_kw, .. } => (self.draw_kw - min_kw.max(0.0)).max(0.0),
            Capability::Binary { .. } => self.draw_kw,
        }
    }

    /// Raise draw by up to `kw` (adjustable only). Returns the kW gained.
    pub fn increase_draw(&mut self, kw: f64) -> f64 {
        if !self.online || kw <= 0.0 || !self.capability.is_adjustable() {
            return 0.0;
        }
        let gained = kw.min((self.capability.ceiling_kw() - self.draw_kw).max(0.0));
        if is_negligible(gained) {
            return 0.0;
        }
        self.draw_kw += gained;
        gained
    }

    /// Lower draw by up to `kw`, never below the adjustable floor.
    /// Returns the kW actually removed.
    pub fn decrease_draw(&mut self, kw: f64) -> f64 {
        if !self.online || kw <= 0.0 || !self.capability.is_adjustable() {
            return 0.0;
        }
        let removed = kw.min(self.sheddable_kw());
        if is_negligible(removed) {
            return 0.0;
        }
        self.draw_kw -= removed;
        removed
    }

    /// Shed up to `kw` from this load. Adjustable loads throttle toward their
    /// floor; binary loads drop entirely and report their full draw, which may
    /// exceed the request.
    pub fn shed(&mut self, kw: f64) -> f64 {
        if !self.online || kw <= 0.0 {
            return 0.0;
        }
        match self.capability {
            Capability::Adjustable { .. } => self.decrease_draw(kw),
            Capability::Binary { .. } => self.deactivate(),
        }
    }

    /// Bring the load online at its floor draw (adjustable) or rated draw
    /// (binary). Returns the kW of demand added.
    pub fn activate(&mut self) -> f64 {
        if self.online {
            return 0.0;
        }
        self.online = true;
        self.draw_kw = self.capability.floor_kw();
        self.draw_kw
    }

    /// Disconnect the load. Returns the kW of demand removed.
    pub fn deactivate(&mut self) -> f64 {
        if !self.online {
            return 0.0;
        }
        let removed = self.draw_kw;
        self.online = false;
        self.draw_kw = 0.0;
        removed
    }
}
