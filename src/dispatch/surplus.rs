use std::collections::HashSet;

use strum::Display;
use tracing::{debug, error, warn};

use super::actions::{ActionJournal, ActionTarget, ActionVerb, ResolutionAction};
use super::decision::{ChargeSellPolicy, DecisionThresholds};
use super::error::DispatchError;
use super::{Microgrid, Resolution, MAX_ITERATIONS};
use crate::domain::EPSILON_KW;

/// The corrective actions available for disposing of a surplus, in the order
/// they are preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
enum SurplusAction {
    Both,
    ChargeBattery,
    SellEnergy,
    LimitGeneration,
}

/// Converts a positive generation-minus-demand imbalance into charge, sell
/// and curtailment actions.
///
/// Each action is attempted at most once per `resolve` call; together with
/// the iteration cap this guarantees termination. The charge-vs-sell
/// hysteresis flag survives across calls by design.
#[derive(Debug)]
pub struct SurplusResolver {
    thresholds: DecisionThresholds,
    policy: ChargeSellPolicy,
}

impl SurplusResolver {
    pub fn new(thresholds: DecisionThresholds) -> Self {
        Self {
            thresholds,
            policy: ChargeSellPolicy::default(),
        }
    }

    /// Dispose of `surplus_kw`, mutating battery, contract and generation
    /// state. Sub-action failures are contained; the returned resolution
    /// always satisfies `managed + remaining == surplus` within epsilon.
    pub fn resolve(
        &mut self,
        grid: &mut Microgrid,
        journal: &mut ActionJournal,
        surplus_kw: f64,
    ) -> Result<Resolution, DispatchError> {
        if !surplus_kw.is_finite() {
            return Err(DispatchError::Validation(format!(
                "surplus is not finite: {surplus_kw}"
            )));
        }
        if surplus_kw <= EPSILON_KW {
            return Ok(Resolution::none());
        }

        let mut managed = 0.0;
        let mut remaining = surplus_kw;
        let mut attempted: HashSet<SurplusAction> = HashSet::new();
        let mut iterations = 0u32;

        while remaining > EPSILON_KW && iterations < MAX_ITERATIONS {
            iterations += 1;

            let Some(action) = self.next_action(grid, &attempted) else {
                warn!(
                    remaining_kw = remaining,
                    "no unattempted surplus action available, stopping early"
                );
                break;
            };
            attempted.insert(action);

            let handled = match self.execute(action, grid, journal, remaining) {
                Ok(kw) => kw,
                Err(e) => {
                    warn!(action = %action, error = %e, "surplus action failed, continuing with remaining actions");
                    0.0
                }
            };

            debug!(action = %action, handled_kw = handled, remaining_kw = remaining, "surplus action applied");
            managed += handled.min(remaining);
            remaining = (remaining - handled).max(0.0);
        }

        if remaining > EPSILON_KW && iterations >= MAX_ITERATIONS {
            let e = DispatchError::ConvergenceExhausted {
                iterations,
                remaining_kw: remaining,
            };
            error!(error = %e, "surplus resolution exhausted its iteration cap");
        }

        Ok(Resolution {
            managed_kw: managed,
            remaining_kw: remaining,
        })
    }

    /// First action in priority order that is available and not yet tried.
    fn next_action(&self, grid: &Microgrid, attempted: &HashSet<SurplusAction>) -> Option<SurplusAction> {
        let battery_ok = grid.battery.is_online() && grid.battery.free_capacity_kwh() > EPSILON_KW;
        let sell_ok = grid.contract.sale_headroom_kwh() > EPSILON_KW;

        let mut candidates = Vec::with_capacity(4);
        if battery_ok && sell_ok {
            candidates.push(SurplusAction::Both);
        }
        if battery_ok {
            candidates.push(SurplusAction::ChargeBattery);
        }
        if sell_ok {
            candidates.push(SurplusAction::SellEnergy);
        }
        candidates.push(SurplusAction::LimitGeneration);

        candidates.into_iter().find(|a| !attempted.contains(a))
    }

    fn execute(
        &mut self,
        action: SurplusAction,
        grid: &mut Microgrid,
        journal: &mut ActionJournal,
        remaining_kw: f64,
    ) -> Result<f64, DispatchError> {
        match action {
            SurplusAction::Both => self.execute_both(grid, journal, remaining_kw),
            SurplusAction::ChargeBattery => self.charge_battery(grid, journal, remaining_kw),
            SurplusAction::SellEnergy => self.sell_energy(grid, journal, remaining_kw),
            SurplusAction::LimitGeneration => self.limit_generation(grid, journal, remaining_kw),
        }
    }

    /// Run the tie-break winner first, then cover any shortfall with the
    /// other action. Each leg is contained on its own.
    fn execute_both(
        &mut self,
        grid: &mut Microgrid,
        journal: &mut ActionJournal,
        remaining_kw: f64,
    ) -> Result<f64, DispatchError> {
        let charge_first = self.policy.prioritize_charging(
            &self.thresholds,
            remaining_kw,
            grid.battery.free_percent(),
            grid.contract.sell_price,
        );
        debug!(charge_first, "charge/sell tie-break");

        let primary = if charge_first {
            self.charge_battery(grid, journal, remaining_kw)
        } else {
            self.sell_energy(grid, journal, remaining_kw)
        };
        let mut handled = primary.unwrap_or_else(|e| {
            warn!(error = %e, "primary surplus action failed");
            0.0
        });

        let shortfall = remaining_kw - handled;
        if shortfall > EPSILON_KW {
            let secondary = if charge_first {
                self.sell_energy(grid, journal, shortfall)
            } else {
                self.charge_battery(grid, journal, shortfall)
            };
            handled += secondary.unwrap_or_else(|e| {
                warn!(error = %e, "secondary surplus action failed");
                0.0
            });
        }

        Ok(handled)
    }

    fn charge_battery(
        &self,
        grid: &mut Microgrid,
        journal: &mut ActionJournal,
        amount_kw: f64,
    ) -> Result<f64, DispatchError> {
        let requested = amount_kw.min(grid.battery.free_capacity_kwh());
        let delta = grid.battery.charge(requested);
        journal.record(ResolutionAction::executed(
            ActionTarget::Battery,
            ActionVerb::Charge,
            amount_kw,
            delta.actual_kwh,
        ));
        Ok(delta.actual_kwh)
    }

    fn sell_energy(
        &self,
        grid: &mut Microgrid,
        journal: &mut ActionJournal,
        amount_kw: f64,
    ) -> Result<f64, DispatchError> {
        let headroom = grid.contract.sale_headroom_kwh();
        if headroom <= EPSILON_KW {
            journal.record(ResolutionAction::failed(
                ActionTarget::GridContract,
                ActionVerb::Sell,
                amount_kw,
                "sales limit reached",
            ));
            return Err(DispatchError::Action("sales limit reached".into()));
        }
        let actual = grid.contract.sell(amount_kw.min(headroom));
        journal.record(ResolutionAction::executed(
            ActionTarget::GridContract,
            ActionVerb::Sell,
            amount_kw,
            actual,
        ));
        Ok(actual)
    }

    /// Curtail online generators, least essential first (highest priority
    /// number). Adjustable devices throttle toward their floor; binary
    /// devices can only be deactivated and report their full output.
    fn limit_generation(
        &self,
        grid: &mut Microgrid,
        journal: &mut ActionJournal,
        target_kw: f64,
    ) -> Result<f64, DispatchError> {
        let mut order: Vec<usize> = grid
            .generation
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_online() && d.curtailable_kw() > EPSILON_KW)
            .map(|(i, _)| i)
            .collect();
        order.sort_by_key(|&i| std::cmp::Reverse(grid.generation[i].priority));

        let mut reduced = 0.0;
        for i in order {
            let need = target_kw - reduced;
            if need <= EPSILON_KW {
                break;
            }
            let dev = &mut grid.generation[i];
            let removed = if dev.is_adjustable() {
                let r = dev.decrease_output(need);
                journal.record(
                    ResolutionAction::executed(
                        ActionTarget::Generation(dev.id),
                        ActionVerb::Reduce,
                        need,
                        r,
                    )
                    .with_detail(dev.name.clone()),
                );
                r
            } else {
                let r = dev.deactivate();
                journal.record(
                    ResolutionAction::executed(
                        ActionTarget::Generation(dev.id),
                        ActionVerb::Deactivate,
                        need,
                        r,
                    )
                    .with_detail(dev.name.clone()),
                );
                r
            };
            reduced += removed;
        }

        Ok(reduced)
    }
}
