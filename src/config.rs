use anyhow::Result;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use validator::Validate;

use crate::dispatch::{DecisionThresholds, Microgrid};
use crate::domain::{BatteryStore, Capability, DeviceKind, GenerationDevice, GridContract, LoadDevice};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub dispatch: DispatchConfig,
    #[validate(nested)]
    pub battery: BatteryConfig,
    #[validate(nested)]
    pub contract: ContractConfig,
    #[serde(default)]
    #[validate(nested)]
    pub generation: Vec<GenerationDeviceConfig>,
    #[serde(default)]
    #[validate(nested)]
    pub loads: Vec<LoadDeviceConfig>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DispatchConfig {
    /// Evaluation interval in seconds. Coarse by design.
    #[validate(range(min = 1))]
    pub tick_seconds: u64,
    #[validate(nested)]
    pub thresholds: DecisionThresholds,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BatteryConfig {
    #[validate(range(min = 0.0))]
    pub capacity_kwh: f64,
    #[validate(range(min = 0.0))]
    pub initial_charge_kwh: f64,
    #[serde(default = "default_true")]
    pub online: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ContractConfig {
    #[validate(range(min = 0.0))]
    pub sale_limit_kwh: f64,
    #[validate(range(min = 0.0))]
    pub purchase_limit_kwh: f64,
    pub export_allowed: bool,
    #[validate(range(min = 0.0))]
    pub buy_price: f64,
    #[validate(range(min = 0.0))]
    pub sell_price: f64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GenerationDeviceConfig {
    pub name: String,
    pub kind: DeviceKind,
    pub priority: u32,
    pub capability: Capability,
    #[serde(default = "default_true")]
    pub online: bool,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub output_kw: f64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoadDeviceConfig {
    pub name: String,
    pub priority: u32,
    pub capability: Capability,
    #[serde(default = "default_true")]
    pub online: bool,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub draw_kw: f64,
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("MGD__").split("__"));
        let cfg: Config = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build the microgrid the dispatcher will balance.
    pub fn build_microgrid(&self) -> Microgrid {
        let generation = self
            .generation
            .iter()
            .map(|g| {
                GenerationDevice::new(g.name.clone(), g.kind, g.priority, g.capability)
                    .with_state(g.online, g.output_kw)
            })
            .collect();
        let loads = self
            .loads
            .iter()
            .map(|l| {
                LoadDevice::new(l.name.clone(), l.priority, l.capability)
                    .with_state(l.online, l.draw_kw)
            })
            .collect();
        let mut battery = BatteryStore::new(self.battery.capacity_kwh, self.battery.initial_charge_kwh);
        battery.set_online(self.battery.online);
        let contract = GridContract::new(
            self.contract.sale_limit_kwh,
            self.contract.purchase_limit_kwh,
            self.contract.export_allowed,
            self.contract.buy_price,
            self.contract.sell_price,
        );
        Microgrid::new(generation, loads, battery, contract)
    }
}
