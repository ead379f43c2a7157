use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

/// Thresholds steering the charge-vs-sell and buy-vs-discharge tie-breaks.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DecisionThresholds {
    /// Battery free capacity (%) at or below which surplus always charges,
    /// and charge level (%) at or below which deficit always buys.
    #[validate(range(min = 0.0, max = 100.0))]
    pub battery_guard_percent: f64,

    /// Normalized price factor above which the grid side wins outright for
    /// large imbalances.
    #[validate(range(min = 0.0, max = 1.0))]
    pub price_factor_threshold: f64,

    /// Imbalance size (kW) that counts as large for the outright-price rule.
    #[validate(range(min = 0.0))]
    pub large_imbalance_kw: f64,

    /// Width of the band within which the previous decision is retained.
    #[validate(range(min = 0.0, max = 1.0))]
    pub hysteresis_band: f64,

    /// Tariff that maps to a price factor of 1.0. Prices are normalized
    /// against this before comparison.
    #[validate(range(min = 0.000001))]
    pub reference_price: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            battery_guard_percent: 20.0,
            price_factor_threshold: 0.7,
            large_imbalance_kw: 50.0,
            hysteresis_band: 0.05,
            reference_price: 1.0,
        }
    }
}

impl DecisionThresholds {
    fn price_factor(&self, price: f64) -> f64 {
        if !price.is_finite() || price <= 0.0 {
            return 0.0;
        }
        (price / self.reference_price).clamp(0.0, 1.0)
    }
}

/// Charge-vs-sell tie-break for surplus resolution.
///
/// The previous decision is retained when the two factors sit within the
/// hysteresis band of each other, so noisy inputs near the threshold do not
/// flip the choice every tick. The flag deliberately survives across calls.
#[derive(Debug, Default)]
pub struct ChargeSellPolicy {
    previous: Option<bool>,
}

impl ChargeSellPolicy {
    /// Returns true when charging should run before selling.
    pub fn prioritize_charging(
        &mut self,
        thresholds: &DecisionThresholds,
        surplus_kw: f64,
        battery_free_percent: f64,
        sell_price: f64,
    ) -> bool {
        if battery_free_percent <= thresholds.battery_guard_percent {
            return self.remember(true);
        }

        let price_factor = thresholds.price_factor(sell_price);
        if price_factor > thresholds.price_factor_threshold && surplus_kw > thresholds.large_imbalance_kw {
            return self.remember(false);
        }

        let fullness_factor = ((100.0 - battery_free_percent) / 100.0).clamp(0.0, 1.0);
        if price_factor > fullness_factor + thresholds.hysteresis_band {
            self.remember(false)
        } else if fullness_factor > price_factor + thresholds.hysteresis_band {
            self.remember(true)
        } else {
            let retained = self.previous.unwrap_or(true);
            debug!(
                price_factor,
                fullness_factor, retained, "charge/sell inside hysteresis band, retaining previous"
            );
            retained
        }
    }

    fn remember(&mut self, charge: bool) -> bool {
        self.previous = Some(charge);
        charge
    }
}

/// Discharge-vs-buy tie-break for deficit resolution, symmetric to
/// [`ChargeSellPolicy`]: an expensive grid pushes toward discharging, an
/// empty battery pushes toward buying, and the band in between retains the
/// previous decision.
#[derive(Debug, Default)]
pub struct BuyDischargePolicy {
    previous: Option<bool>,
}

impl BuyDischargePolicy {
    /// Returns true when discharging should run before buying.
    pub fn prioritize_discharge(
        &mut self,
        thresholds: &DecisionThresholds,
        deficit_kw: f64,
        battery_charge_percent: f64,
        buy_price: f64,
    ) -> bool {
        if battery_charge_percent <= thresholds.battery_guard_percent {
            return self.remember(false);
        }

        let price_factor = thresholds.price_factor(buy_price);
        if price_factor > thresholds.price_factor_threshold && deficit_kw > thresholds.large_imbalance_kw {
            return self.remember(true);
        }

        let emptiness_factor = ((100.0 - battery_charge_percent) / 100.0).clamp(0.0, 1.0);
        if price_factor > emptiness_factor + thresholds.hysteresis_band {
            self.remember(true)
        } else if emptiness_factor > price_factor + thresholds.hysteresis_band {
            self.remember(false)
        } else {
            let retained = self.previous.unwrap_or(true);
            debug!(
                price_factor,
                emptiness_factor, retained, "buy/discharge inside hysteresis band, retaining previous"
            );
            retained
        }
    }

    fn remember(&mut self, discharge: bool) -> bool {
        self.previous = Some(discharge);
        discharge
    }
}
