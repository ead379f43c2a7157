use std::cmp::Reverse;
use std::collections::HashMap;

use itertools::Itertools;
use ordered_float::OrderedFloat;
use tracing::{debug, error, warn};

use super::actions::{ActionJournal, ActionTarget, ActionVerb, ResolutionAction};
use super::decision::{BuyDischargePolicy, DecisionThresholds};
use super::error::DispatchError;
use super::{Microgrid, Resolution, MAX_ITERATIONS};
use crate::domain::EPSILON_KW;

/// Converts a positive demand-minus-generation imbalance into generation
/// raises, battery discharge, grid purchases and, as a last resort, load
/// shedding.
///
/// The discharge-vs-buy hysteresis flag survives across calls by design.
#[derive(Debug)]
pub struct DeficitResolver {
    thresholds: DecisionThresholds,
    policy: BuyDischargePolicy,
}

impl DeficitResolver {
    pub fn new(thresholds: DecisionThresholds) -> Self {
        Self {
            thresholds,
            policy: BuyDischargePolicy::default(),
        }
    }

    /// Cover `deficit_kw`, mutating generation, battery, contract and load
    /// state. Sub-action failures are contained; the returned resolution
    /// always satisfies `managed + remaining == deficit` within epsilon.
    pub fn resolve(
        &mut self,
        grid: &mut Microgrid,
        journal: &mut ActionJournal,
        deficit_kw: f64,
    ) -> Result<Resolution, DispatchError> {
        if !deficit_kw.is_finite() {
            return Err(DispatchError::Validation(format!(
                "deficit is not finite: {deficit_kw}"
            )));
        }
        if deficit_kw <= EPSILON_KW {
            return Ok(Resolution::none());
        }

        let mut managed = 0.0;
        let mut remaining = deficit_kw;

        // Phase 1: squeeze everything out of the generation fleet before
        // touching storage, the grid or the loads.
        let raised = self.maximize_generation(grid, journal, remaining);
        if raised > EPSILON_KW {
            debug!(raised_kw = raised, "generation raised");
            managed += raised.min(remaining);
            remaining = (remaining - raised).max(0.0);
        }

        // Phase 2: battery, purchases, then shedding.
        let mut iterations = 0u32;
        while remaining > EPSILON_KW && iterations < MAX_ITERATIONS {
            iterations += 1;

            let bess_available =
                grid.battery.is_online() && grid.battery.charge_kwh() > EPSILON_KW;
            let can_buy = grid.contract.purchase_headroom_kwh() > EPSILON_KW;

            let handled = match (bess_available, can_buy) {
                (true, true) => self.discharge_and_buy(grid, journal, remaining),
                (true, false) => self
                    .discharge_battery(grid, journal, remaining)
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "battery discharge failed, continuing");
                        0.0
                    }),
                (false, true) => self.buy_energy(grid, journal, remaining).unwrap_or_else(|e| {
                    warn!(error = %e, "grid purchase failed, continuing");
                    0.0
                }),
                (false, false) => self.shed_loads(grid, journal, remaining),
            };

            if handled <= EPSILON_KW {
                debug!(
                    remaining_kw = remaining,
                    "deficit step made no progress, stopping"
                );
                break;
            }

            managed += handled.min(remaining);
            remaining = (remaining - handled).max(0.0);
        }

        if remaining > EPSILON_KW && iterations >= MAX_ITERATIONS {
            let e = DispatchError::ConvergenceExhausted {
                iterations,
                remaining_kw: remaining,
            };
            error!(error = %e, "deficit resolution exhausted its iteration cap");
        }

        Ok(Resolution {
            managed_kw: managed,
            remaining_kw: remaining,
        })
    }

    /// Phase 1. First pass raises already-online devices toward their
    /// ceiling; second pass activates offline devices, both in ascending
    /// priority order (most essential served first). Adjustable devices are
    /// brought to the exact needed output, binary devices to full output.
    fn maximize_generation(
        &self,
        grid: &mut Microgrid,
        journal: &mut ActionJournal,
        target_kw: f64,
    ) -> f64 {
        let mut order: Vec<usize> = (0..grid.generation.len()).collect();
        order.sort_by_key(|&i| grid.generation[i].priority);

        let mut raised = 0.0;

        for &i in &order {
            let need = target_kw - raised;
            if need <= EPSILON_KW {
                break;
            }
            let dev = &mut grid.generation[i];
            if !dev.is_online() {
                continue;
            }
            let gained = if dev.is_adjustable() {
                dev.increase_output(need)
            } else {
                dev.set_full_output()
            };
            if gained > EPSILON_KW {
                journal.record(
                    ResolutionAction::executed(
                        ActionTarget::Generation(dev.id),
                        ActionVerb::SetOutput,
                        need,
                        gained,
                    )
                    .with_detail(dev.name.clone()),
                );
                raised += gained;
            }
        }

        for &i in &order {
            let need = target_kw - raised;
            if need <= EPSILON_KW {
                break;
            }
            let dev = &mut grid.generation[i];
            if dev.is_online() {
                continue;
            }
            let mut gained = dev.activate();
            journal.record(
                ResolutionAction::executed(
                    ActionTarget::Generation(dev.id),
                    ActionVerb::Activate,
                    need,
                    gained,
                )
                .with_detail(dev.name.clone()),
            );
            if dev.is_adjustable() && gained < need {
                let extra = dev.increase_output(need - gained);
                if extra > EPSILON_KW {
                    journal.record(
                        ResolutionAction::executed(
                            ActionTarget::Generation(dev.id),
                            ActionVerb::SetOutput,
                            need - gained,
                            extra,
                        )
                        .with_detail(dev.name.clone()),
                    );
                }
                gained += extra;
            }
            raised += gained;
        }

        raised
    }

    /// Run the tie-break winner first, then cover any shortfall with the
    /// other action. Each leg is contained on its own.
    fn discharge_and_buy(
        &mut self,
        grid: &mut Microgrid,
        journal: &mut ActionJournal,
        remaining_kw: f64,
    ) -> f64 {
        let discharge_first = self.policy.prioritize_discharge(
            &self.thresholds,
            remaining_kw,
            grid.battery.soc_percent(),
            grid.contract.buy_price,
        );
        debug!(discharge_first, "discharge/buy tie-break");

        let primary = if discharge_first {
            self.discharge_battery(grid, journal, remaining_kw)
        } else {
            self.buy_energy(grid, journal, remaining_kw)
        };
        let mut handled = primary.unwrap_or_else(|e| {
            warn!(error = %e, "primary deficit action failed");
            0.0
        });

        let shortfall = remaining_kw - handled;
        if shortfall > EPSILON_KW {
            let secondary = if discharge_first {
                self.buy_energy(grid, journal, shortfall)
            } else {
                self.discharge_battery(grid, journal, shortfall)
            };
            handled += secondary.unwrap_or_else(|e| {
                warn!(error = %e, "secondary deficit action failed");
                0.0
            });
        }

        handled
    }

    fn discharge_battery(
        &self,
        grid: &mut Microgrid,
        journal: &mut ActionJournal,
        amount_kw: f64,
    ) -> Result<f64, DispatchError> {
        let requested = amount_kw.min(grid.battery.charge_kwh());
        let delta = grid.battery.discharge(requested);
        journal.record(ResolutionAction::executed(
            ActionTarget::Battery,
            ActionVerb::Discharge,
            amount_kw,
            delta.actual_kwh,
        ));
        Ok(delta.actual_kwh)
    }

    fn buy_energy(
        &self,
        grid: &mut Microgrid,
        journal: &mut ActionJournal,
        amount_kw: f64,
    ) -> Result<f64, DispatchError> {
        let headroom = grid.contract.purchase_headroom_kwh();
        if headroom <= EPSILON_KW {
            journal.record(ResolutionAction::failed(
                ActionTarget::GridContract,
                ActionVerb::Buy,
                amount_kw,
                "purchase limit reached",
            ));
            return Err(DispatchError::Action("purchase limit reached".into()));
        }
        let actual = grid.contract.buy(amount_kw.min(headroom));
        journal.record(ResolutionAction::executed(
            ActionTarget::GridContract,
            ActionVerb::Buy,
            amount_kw,
            actual,
        ));
        Ok(actual)
    }

    /// Last resort: drop consumer load, least essential tier first (highest
    /// priority number).
    ///
    /// The first tier whose combined sheddable power covers the residual is
    /// reduced internally, adjustable loads first, each ordered by absolute
    /// distance from the needed amount with ties toward larger devices. A
    /// tier that cannot cover the residual is shed entirely - unless a single
    /// device in the next tier covers the residual on its own, in which case
    /// only that device is shed.
    fn shed_loads(&self, grid: &mut Microgrid, journal: &mut ActionJournal, target_kw: f64) -> f64 {
        let tiers: HashMap<u32, Vec<usize>> = grid
            .loads
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_online() && l.sheddable_kw() > EPSILON_KW)
            .map(|(i, l)| (l.priority, i))
            .into_group_map();
        let tier_order: Vec<u32> = tiers.keys().copied().sorted_by_key(|&t| Reverse(t)).collect();

        let mut shed_total = 0.0;
        for (pos, &tier) in tier_order.iter().enumerate() {
            let residual = target_kw - shed_total;
            if residual <= EPSILON_KW {
                break;
            }
            let members = &tiers[&tier];
            let capacity: f64 = members.iter().map(|&i| grid.loads[i].sheddable_kw()).sum();

            if capacity + EPSILON_KW >= residual {
                shed_total += self.shed_within_tier(grid, journal, members, residual);
                break;
            }

            if let Some(&next_tier) = tier_order.get(pos + 1) {
                let covering = tiers[&next_tier]
                    .iter()
                    .copied()
                    .filter(|&i| grid.loads[i].sheddable_kw() + EPSILON_KW >= residual)
                    .min_by_key(|&i| OrderedFloat(grid.loads[i].sheddable_kw()));
                if let Some(i) = covering {
                    debug!(
                        tier,
                        next_tier,
                        load = %grid.loads[i].name,
                        "single next-tier load covers the residual, sparing tier"
                    );
                    shed_total += self.shed_device(grid, journal, i, residual);
                    break;
                }
            }

            for &i in members {
                let sheddable = grid.loads[i].sheddable_kw();
                shed_total += self.shed_device(grid, journal, i, sheddable);
            }
        }

        shed_total
    }

    fn shed_within_tier(
        &self,
        grid: &mut Microgrid,
        journal: &mut ActionJournal,
        members: &[usize],
        needed_kw: f64,
    ) -> f64 {
        let mut ordered = members.to_vec();
        ordered.sort_by_key(|&i| {
            let load = &grid.loads[i];
            (
                !load.is_adjustable(),
                OrderedFloat((load.sheddable_kw() - needed_kw).abs()),
                Reverse(OrderedFloat(load.sheddable_kw())),
            )
        });

        let mut shed = 0.0;
        for i in ordered {
            let residual = needed_kw - shed;
            if residual <= EPSILON_KW {
                break;
            }
            shed += self.shed_device(grid, journal, i, residual);
        }
        shed
    }

    fn shed_device(
        &self,
        grid: &mut Microgrid,
        journal: &mut ActionJournal,
        index: usize,
        amount_kw: f64,
    ) -> f64 {
        let load = &mut grid.loads[index];
        let verb = if load.is_adjustable() {
            ActionVerb::Reduce
        } else {
            ActionVerb::Deactivate
        };
        let removed = load.shed(amount_kw);
        if removed > EPSILON_KW {
            journal.record(
                ResolutionAction::executed(ActionTarget::Load(load.id), verb, amount_kw, removed)
                    .with_detail(load.name.clone()),
            );
        }
        removed
    }
}
