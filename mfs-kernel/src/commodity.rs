//! Commodity production bookkeeping.
//!
//! A facility that produces a commodity is described by a
//! [`CommodityProducer`] entry; institutions own a
//! [`CommodityProducerManager`] aggregating their producers so the growth
//! machinery can compare total capacity against demand.

use mfs_core::models::{AgentId, Commodity};
use mfs_core::{Error, Map, Result};

/// Per-commodity production characteristics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProducerInfo {
    /// Nameplate production capacity per time step.
    pub capacity: f64,
    /// Cost per unit of capacity, used by build decisions.
    pub cost: f64,
}

/// Tags an agent as a producer of one or more commodities.
#[derive(Clone, Debug)]
pub struct CommodityProducer {
    agent: AgentId,
    info: Map<Commodity, ProducerInfo>,
}

impl CommodityProducer {
    /// A producer descriptor for `agent` with no commodities yet.
    pub fn new(agent: AgentId) -> Self {
        Self {
            agent,
            info: Map::default(),
        }
    }

    /// The described agent.
    pub fn agent(&self) -> AgentId {
        self.agent
    }

    /// Declare (or update) production of a commodity.
    pub fn add_commodity(&mut self, commodity: impl Into<Commodity>, capacity: f64, cost: f64) {
        self.info
            .insert(commodity.into(), ProducerInfo { capacity, cost });
    }

    /// True when this producer produces the commodity.
    pub fn produces(&self, commodity: &Commodity) -> bool {
        self.info.contains_key(commodity)
    }

    /// Production capacity for a commodity, zero when not produced.
    pub fn capacity(&self, commodity: &Commodity) -> f64 {
        self.info.get(commodity).map_or(0.0, |i| i.capacity)
    }

    /// Production cost for a commodity, infinite when not produced.
    pub fn cost(&self, commodity: &Commodity) -> f64 {
        self.info.get(commodity).map_or(f64::INFINITY, |i| i.cost)
    }

    /// The produced commodities, in declaration order.
    pub fn commodities(&self) -> impl Iterator<Item = &Commodity> {
        self.info.keys()
    }
}

/// Owns a set of producers and aggregates capacity per commodity.
#[derive(Clone, Debug, Default)]
pub struct CommodityProducerManager {
    producers: Map<AgentId, CommodityProducer>,
}

impl CommodityProducerManager {
    /// An empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a producer. Double registration is a key error.
    pub fn register_producer(&mut self, producer: CommodityProducer) -> Result<()> {
        if self.producers.contains_key(&producer.agent()) {
            return Err(Error::Key(format!(
                "producer {} is already registered",
                producer.agent()
            )));
        }
        self.producers.insert(producer.agent(), producer);
        Ok(())
    }

    /// Remove a producer. Unregistering an unknown producer is a key error.
    pub fn unregister_producer(&mut self, agent: AgentId) -> Result<()> {
        self.producers
            .shift_remove(&agent)
            .map(|_| ())
            .ok_or_else(|| Error::Key(format!("producer {agent} was never registered")))
    }

    /// Total production capacity across all producers of a commodity.
    pub fn total_capacity(&self, commodity: &Commodity) -> f64 {
        self.producers
            .values()
            .map(|p| p.capacity(commodity))
            .sum()
    }

    /// The registered producers, in registration order.
    pub fn producers(&self) -> impl Iterator<Item = &CommodityProducer> {
        self.producers.values()
    }

    /// Number of registered producers.
    pub fn len(&self) -> usize {
        self.producers.len()
    }

    /// True when no producer is registered.
    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }
}
