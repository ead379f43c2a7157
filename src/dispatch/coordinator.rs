use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::actions::{ActionJournal, ResolutionAction};
use super::decision::DecisionThresholds;
use super::deficit::DeficitResolver;
use super::surplus::SurplusResolver;
use super::{Microgrid, Resolution};
use crate::domain::EPSILON_KW;

/// Which way the imbalance pointed on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TickOutcome {
    Balanced,
    Surplus,
    Deficit,
}

/// Result of one coordinator evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickResult {
    pub at: DateTime<Utc>,
    pub outcome: TickOutcome,
    /// Signed generation-minus-demand imbalance observed at tick start.
    pub imbalance_kw: f64,
    pub managed_kw: f64,
    pub remaining_kw: f64,
}

impl TickResult {
    fn balanced(imbalance_kw: f64) -> Self {
        Self {
            at: Utc::now(),
            outcome: TickOutcome::Balanced,
            imbalance_kw,
            managed_kw: 0.0,
            remaining_kw: 0.0,
        }
    }
}

/// Computes the signed imbalance each tick and dispatches to the matching
/// resolver. Owns the resolvers (and through them the hysteresis flags) and
/// the action journal for the lifetime of a run.
///
/// A resolver error never propagates: it is logged and surfaces as a tick
/// where nothing was managed.
pub struct ImbalanceCoordinator {
    surplus: SurplusResolver,
    deficit: DeficitResolver,
    journal: ActionJournal,
    epsilon_kw: f64,
}

impl ImbalanceCoordinator {
    pub fn new(thresholds: DecisionThresholds) -> Self {
        Self {
            surplus: SurplusResolver::new(thresholds.clone()),
            deficit: DeficitResolver::new(thresholds),
            journal: ActionJournal::default(),
            epsilon_kw: EPSILON_KW,
        }
    }

    /// Evaluate one tick against the shared microgrid state.
    pub fn evaluate_tick(&mut self, grid: &mut Microgrid) -> TickResult {
        let generated = grid.total_generation_kw();
        let demanded = grid.total_demand_kw();
        let imbalance = generated - demanded;

        if !imbalance.is_finite() {
            warn!(generated_kw = generated, demanded_kw = demanded, "non-finite imbalance, skipping tick");
            return TickResult::balanced(0.0);
        }
        if imbalance.abs() < self.epsilon_kw {
            return TickResult::balanced(imbalance);
        }

        let magnitude = imbalance.abs();
        let (outcome, resolved) = if imbalance > 0.0 {
            (
                TickOutcome::Surplus,
                self.surplus.resolve(grid, &mut self.journal, magnitude),
            )
        } else {
            (
                TickOutcome::Deficit,
                self.deficit.resolve(grid, &mut self.journal, magnitude),
            )
        };

        let resolution = match resolved {
            Ok(r) => r,
            Err(e) => {
                error!(outcome = %outcome, error = %e, "resolver failed, treating imbalance as unmanaged");
                Resolution::unresolved(magnitude)
            }
        };

        info!(
            outcome = %outcome,
            imbalance_kw = imbalance,
            managed_kw = resolution.managed_kw,
            remaining_kw = resolution.remaining_kw,
            "dispatch tick"
        );

        TickResult {
            at: Utc::now(),
            outcome,
            imbalance_kw: imbalance,
            managed_kw: resolution.managed_kw,
            remaining_kw: resolution.remaining_kw,
        }
    }

    /// Most recent resolution actions, newest last.
    pub fn recent_actions(&self, count: usize) -> Vec<ResolutionAction> {
        self.journal.recent(count)
    }
}

/// Repeating evaluation schedule around a coordinator.
///
/// At most one tick is in flight at a time: the loop body holds the microgrid
/// mutex for the duration of the synchronous evaluation. `stop` prevents any
/// further tick from starting and lets an in-flight tick finish.
pub struct DispatchLoop {
    grid: Arc<Mutex<Microgrid>>,
    coordinator: Mutex<ImbalanceCoordinator>,
    cancel: CancellationToken,
}

impl DispatchLoop {
    pub fn new(grid: Arc<Mutex<Microgrid>>, coordinator: ImbalanceCoordinator) -> Arc<Self> {
        Arc::new(Self {
            grid,
            coordinator: Mutex::new(coordinator),
            cancel: CancellationToken::new(),
        })
    }

    /// Spawn the tick loop on the current runtime.
    pub fn spawn(self: &Arc<Self>, tick_seconds: u64) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run(tick_seconds).await })
    }

    async fn run(&self, tick_seconds: u64) {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(tick_seconds.max(1)));
        info!(tick_seconds, "dispatch loop started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("dispatch loop stopped");
                    break;
                }
                _ = interval.tick() => {
                    self.tick_once();
                }
            }
        }
    }

    /// Run a single evaluation immediately. Also used by the loop body.
    pub fn tick_once(&self) -> TickResult {
        let mut grid = self.grid.lock();
        let mut coordinator = self.coordinator.lock();
        coordinator.evaluate_tick(&mut grid)
    }

    /// Request shutdown. Idempotent; an in-flight tick completes first.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Most recent resolution actions, newest last.
    pub fn recent_actions(&self, count: usize) -> Vec<ResolutionAction> {
        self.coordinator.lock().recent_actions(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BatteryStore, Capability, DeviceKind, GenerationDevice, GridContract, LoadDevice};

    fn balanced_grid() -> Microgrid {
        Microgrid::new(
            vec![GenerationDevice::new(
                "pv",
                DeviceKind::Pv,
                1,
                Capability::Adjustable {
                    min_kw: 0.0,
                    max_kw: 100.0,
                },
            )
            .with_state(true, 50.0)],
            vec![LoadDevice::new("plant", 1, Capability::Binary { rated_kw: 50.0 }).with_state(true, 50.0)],
            BatteryStore::new(100.0, 50.0),
            GridContract::new(100.0, 100.0, true, 1.0, 0.5),
        )
    }

    #[test]
    fn balanced_grid_yields_no_action() {
        let mut grid = balanced_grid();
        let mut coordinator = ImbalanceCoordinator::new(DecisionThresholds::default());

        let result = coordinator.evaluate_tick(&mut grid);
        assert_eq!(result.outcome, TickOutcome::Balanced);
        assert_eq!(result.managed_kw, 0.0);
        assert_eq!(result.remaining_kw, 0.0);
        assert!(coordinator.recent_actions(10).is_empty());
    }

    #[test]
    fn surplus_routed_to_surplus_resolver() {
        let mut grid = balanced_grid();
        grid.generation[0].set_output(80.0);
        let mut coordinator = ImbalanceCoordinator::new(DecisionThresholds::default());

        let result = coordinator.evaluate_tick(&mut grid);
        assert_eq!(result.outcome, TickOutcome::Surplus);
        assert!((result.imbalance_kw - 30.0).abs() < 1e-9);
        assert!((result.managed_kw - 30.0).abs() < 1e-9);
    }

    #[test]
    fn deficit_routed_to_deficit_resolver() {
        let mut grid = balanced_grid();
        grid.generation[0].set_output(20.0);
        let mut coordinator = ImbalanceCoordinator::new(DecisionThresholds::default());

        let result = coordinator.evaluate_tick(&mut grid);
        assert_eq!(result.outcome, TickOutcome::Deficit);
        assert!((result.imbalance_kw + 30.0).abs() < 1e-9);
        assert!((result.managed_kw - 30.0).abs() < 1e-9);
        assert!(result.remaining_kw < 1e-9);
    }

    #[tokio::test]
    async fn loop_stops_and_lets_inflight_tick_finish() {
        let grid = Arc::new(Mutex::new(balanced_grid()));
        let coordinator = ImbalanceCoordinator::new(DecisionThresholds::default());
        let dispatch = DispatchLoop::new(grid, coordinator);

        let handle = dispatch.spawn(1);
        // Let the first immediate tick run.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        dispatch.stop();
        handle.await.unwrap();
        assert!(dispatch.is_stopped());
    }

    #[tokio::test]
    async fn tick_once_works_without_a_running_loop() {
        let grid = Arc::new(Mutex::new(balanced_grid()));
        let coordinator = ImbalanceCoordinator::new(DecisionThresholds::default());
        let dispatch = DispatchLoop::new(grid, coordinator);

        let result = dispatch.tick_once();
        assert_eq!(result.outcome, TickOutcome::Balanced);
    }
}
