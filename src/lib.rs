//! Microgrid power dispatcher.
//!
//! On each evaluation tick the dispatcher reconciles total generation against
//! total demand and takes a bounded, prioritized sequence of corrective
//! actions to close the gap: surplus is absorbed by charging the battery,
//! selling under the grid contract or curtailing generation; deficit is
//! covered by raising generation, discharging the battery, buying from the
//! grid or shedding load.

pub mod config;
pub mod dispatch;
pub mod domain;
#[cfg(feature = "sim")]
pub mod sim;
pub mod telemetry;
