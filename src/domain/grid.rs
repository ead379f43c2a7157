#![allow(dead_code)]
use serde::{Deserialize, Serialize};

use super::types::is_negligible;

/// Grid operator contract: sale/purchase limits, cumulative counters and the
/// current tariffs.
///
/// Invariants: `sold_kwh <= sale_limit_kwh` and `bought_kwh <=
/// purchase_limit_kwh` at all times; counters are monotonically
/// non-decreasing within a billing period (reset policy is external); when
/// export is disallowed the sale limit and sold counter are pinned at zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridContract {
    sale_limit_kwh: f64,
    sold_kwh: f64,
    purchase_limit_kwh: f64,
    bought_kwh: f64,
    export_allowed: bool,
    pub buy_price: f64,
    pub sell_price: f64,
}

impl GridContract {
    pub fn new(
        sale_limit_kwh: f64,
        purchase_limit_kwh: f64,
        export_allowed: bool,
        buy_price: f64,
        sell_price: f64,
    ) -> Self {
        let sale_limit = if export_allowed {
            sale_limit_kwh.max(0.0)
        } else {
            0.0
        };
        Self {
            sale_limit_kwh: sale_limit,
            sold_kwh: 0.0,
            purchase_limit_kwh: purchase_limit_kwh.max(0.0),
            bought_kwh: 0.0,
            export_allowed,
            buy_price: buy_price.max(0.0),
            sell_price: sell_price.max(0.0),
        }
    }

    pub fn export_allowed(&self) -> bool {
        self.export_allowed
    }

    pub fn sale_limit_kwh(&self) -> f64 {
        self.sale_limit_kwh
    }

    pub fn sold_kwh(&self) -> f64 {
        self.sold_kwh
    }

    pub fn purchase_limit_kwh(&self) -> f64 {
        self.purchase_limit_kwh
    }

    pub fn bought_kwh(&self) -> f64 {
        self.bought_kwh
    }

    /// Energy still sellable under the contract.
    pub fn sale_headroom_kwh(&self) -> f64 {
        if !self.export_allowed {
            return 0.0;
        }
        (self.sale_limit_kwh - self.sold_kwh).max(0.0)
    }

    /// Energy still purchasable under the contract.
    pub fn purchase_headroom_kwh(&self) -> f64 {
        (self.purchase_limit_kwh - self.bought_kwh).max(0.0)
    }

    /// Export up to `kwh` to the grid. Returns the amount actually sold.
    pub fn sell(&mut self, kwh: f64) -> f64 {
        if kwh <= 0.0 || !kwh.is_finite() {
            return 0.0;
        }
        let actual = kwh.min(self.sale_headroom_kwh());
        if is_negligible(actual) {
            return 0.0;
        }
        self.sold_kwh += actual;
        actual
    }

    /// Import up to `kwh` from the grid. Returns the amount actually bought.
    pub fn buy(&mut self, kwh: f64) -> f64 {
        if kwh <= 0.0 || !kwh.is_finite() {
            return 0.0;
        }
        let actual = kwh.min(self.purchase_headroom_kwh());
        if is_negligible(actual) {
            return 0.0;
        }
        self.bought_kwh += actual;
        actual
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sell_is_bounded_by_headroom() {
        let mut osd = GridContract::new(100.0, 500.0, true, 1.5, 0.8);
        assert_eq!(osd.sell(60.0), 60.0);
        assert_eq!(osd.sell(60.0), 40.0);
        assert_eq!(osd.sell(10.0), 0.0);
        assert_eq!(osd.sold_kwh(), 100.0);
    }

    #[test]
    fn buy_is_bounded_by_headroom() {
        let mut osd = GridContract::new(100.0, 50.0, true, 1.5, 0.8);
        assert_eq!(osd.buy(30.0), 30.0);
        assert_eq!(osd.buy(30.0), 20.0);
        assert_eq!(osd.purchase_headroom_kwh(), 0.0);
    }

    #[test]
    fn export_disallowed_pins_sales_at_zero() {
        let mut osd = GridContract::new(100.0, 500.0, false, 1.5, 0.8);
        assert_eq!(osd.sale_limit_kwh(), 0.0);
        assert_eq!(osd.sale_headroom_kwh(), 0.0);
        assert_eq!(osd.sell(25.0), 0.0);
        assert_eq!(osd.sold_kwh(), 0.0);
    }

    #[test]
    fn counters_never_decrease() {
        let mut osd = GridContract::new(100.0, 100.0, true, 1.5, 0.8);
        osd.sell(10.0);
        osd.buy(5.0);
        assert_eq!(osd.sell(-4.0), 0.0);
        assert_eq!(osd.buy(f64::NAN), 0.0);
        assert_eq!(osd.sold_kwh(), 10.0);
        assert_eq!(osd.bought_kwh(), 5.0);
    }
}
