pub mod actions;
pub mod coordinator;
pub mod decision;
pub mod deficit;
pub mod error;
pub mod surplus;

pub use actions::*;
pub use coordinator::*;
pub use decision::*;
pub use deficit::*;
pub use error::DispatchError;
pub use surplus::*;

use serde::{Deserialize, Serialize};

use crate::domain::{BatteryStore, GenerationDevice, GridContract, LoadDevice};

/// Iteration cap shared by both resolvers. The per-call attempted-action set
/// (surplus) and the zero-progress break (deficit) are what actually bound
/// the loops; the cap backstops runaway convergence.
pub const MAX_ITERATIONS: u32 = 100;

/// The shared microgrid state the resolvers act on.
///
/// Owned by the surrounding session; the coordinator guards it with a mutex
/// so at most one tick mutates it at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Microgrid {
    pub generation: Vec<GenerationDevice>,
    pub loads: Vec<LoadDevice>,
    pub battery: BatteryStore,
    pub contract: GridContract,
}

impl Microgrid {
    pub fn new(
        generation: Vec<GenerationDevice>,
        loads: Vec<LoadDevice>,
        battery: BatteryStore,
        contract: GridContract,
    ) -> Self {
        Self {
            generation,
            loads,
            battery,
            contract,
        }
    }

    /// Sum of online generation device outputs (kW).
    pub fn total_generation_kw(&self) -> f64 {
        self.generation.iter().map(|d| d.output_kw()).sum()
    }

    /// Sum of online load draws (kW).
    pub fn total_demand_kw(&self) -> f64 {
        self.loads.iter().map(|l| l.draw_kw()).sum()
    }
}

/// Outcome of one resolver call: how much of the imbalance was handled and
/// how much persists. `managed_kw + remaining_kw` equals the original
/// imbalance (within epsilon) and `remaining_kw` is never negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub managed_kw: f64,
    pub remaining_kw: f64,
}

impl Resolution {
    pub fn none() -> Self {
        Self {
            managed_kw: 0.0,
            remaining_kw: 0.0,
        }
    }

    pub fn unresolved(imbalance_kw: f64) -> Self {
        Self {
            managed_kw: 0.0,
            remaining_kw: imbalance_kw.max(0.0),
        }
    }

    pub fn is_fully_managed(&self) -> bool {
        crate::domain::is_negligible(self.remaining_kw)
    }
}
