//! Commodity supply/demand bookkeeping.
//!
//! Maps each grown commodity to a symbolic demand curve and the producer
//! managers supplying it. Regions consult this each time step to find unmet
//! demand, which the [`BuildingManager`](crate::builder::BuildingManager)
//! turns into build orders.

use crate::commodity::CommodityProducerManager;
use mfs_core::models::{Commodity, SymFunction};
use mfs_core::{Error, Map, Result};

/// The registry tying demand curves to the managers that can meet them.
#[derive(Debug, Default)]
pub struct SupplyDemandManager {
    curves: Map<Commodity, SymFunction>,
    managers: Vec<CommodityProducerManager>,
}

impl SupplyDemandManager {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a commodity's demand curve. Re-declaration is a key error.
    pub fn register_commodity(
        &mut self,
        commodity: impl Into<Commodity>,
        curve: SymFunction,
    ) -> Result<()> {
        let commodity = commodity.into();
        if self.curves.contains_key(&commodity) {
            return Err(Error::Key(format!(
                "demand for commodity '{commodity}' is already registered"
            )));
        }
        self.curves.insert(commodity, curve);
        Ok(())
    }

    /// Attach a producer manager whose capacity counts toward supply.
    pub fn register_manager(&mut self, manager: CommodityProducerManager) {
        self.managers.push(manager);
    }

    /// Mutable access to the attached managers, for bookkeeping as
    /// facilities come and go.
    pub fn managers_mut(&mut self) -> &mut [CommodityProducerManager] {
        &mut self.managers
    }

    /// The commodities with registered demand, in registration order.
    pub fn commodities(&self) -> impl Iterator<Item = &Commodity> {
        self.curves.keys()
    }

    /// Total production capacity for a commodity across all managers.
    pub fn supply(&self, commodity: &Commodity) -> f64 {
        self.managers
            .iter()
            .map(|m| m.total_capacity(commodity))
            .sum()
    }

    /// Demand for a commodity at time `t`, per its curve. Zero for unknown
    /// commodities.
    pub fn demand(&self, commodity: &Commodity, t: i32) -> f64 {
        self.curves
            .get(commodity)
            .map_or(0.0, |curve| curve.value(f64::from(t)))
    }

    /// `demand - supply` at time `t`; positive means capacity must be built.
    pub fn unmet_demand(&self, commodity: &Commodity, t: i32) -> f64 {
        self.demand(commodity, t) - self.supply(commodity)
    }
}
