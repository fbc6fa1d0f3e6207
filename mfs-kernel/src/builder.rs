//! Demand-driven build decisions.
//!
//! When a region finds unmet demand for a commodity, the building manager
//! decides what to build: it solves the integer program
//!
//! ```text
//! minimize   sum(n_i * cost_i)
//! subject to sum(n_i * capacity_i) >= unmet_demand,  n_i in N
//! ```
//!
//! over every registered producer prototype of that commodity, by
//! branch-and-bound on the cost/capacity-ratio relaxation.

use mfs_core::models::AgentId;
use mfs_core::{Error, Result, Set};

/// One buildable producer prototype, as offered by a builder agent.
#[derive(Clone, Debug)]
pub struct ProducerOption {
    /// The institution able to build this prototype.
    pub builder: AgentId,
    /// The facility prototype that would be built.
    pub prototype: String,
    /// Capacity each built instance adds.
    pub capacity: f64,
    /// Cost per built instance.
    pub cost: f64,
}

/// A solved instruction: `builder` should build `count` instances of
/// `prototype`.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildOrder {
    /// Number of instances to build.
    pub count: u32,
    /// The prototype to build.
    pub prototype: String,
    /// The agent that will do the building.
    pub builder: AgentId,
}

/// Tracks builder agents and turns unmet demand into build orders.
#[derive(Debug, Default)]
pub struct BuildingManager {
    builders: Set<AgentId>,
}

impl BuildingManager {
    /// An empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a builder agent. Double registration is a key error.
    pub fn register_builder(&mut self, builder: AgentId) -> Result<()> {
        if !self.builders.insert(builder) {
            return Err(Error::Key(format!(
                "builder {builder} is already registered"
            )));
        }
        Ok(())
    }

    /// Remove a builder agent. Unknown builders are a key error.
    pub fn unregister_builder(&mut self, builder: AgentId) -> Result<()> {
        if !self.builders.shift_remove(&builder) {
            return Err(Error::Key(format!("builder {builder} was never registered")));
        }
        Ok(())
    }

    /// The registered builders, in registration order.
    pub fn builders(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.builders.iter().copied()
    }

    /// Decide what to build to cover `unmet_demand`.
    ///
    /// Returns an empty list iff `unmet_demand <= 0`. Fails when demand is
    /// positive but no option has positive capacity.
    pub fn make_build_decision(
        &self,
        options: &[ProducerOption],
        unmet_demand: f64,
    ) -> Result<Vec<BuildOrder>> {
        if unmet_demand <= 0.0 {
            return Ok(Vec::new());
        }

        // Keep options usable by the optimizer, preserving caller order for
        // deterministic tie-breaks in the output.
        let usable: Vec<&ProducerOption> = options
            .iter()
            .filter(|o| o.capacity > 0.0 && o.cost.is_finite() && o.cost >= 0.0)
            .collect();
        if usable.is_empty() {
            return Err(Error::Value(format!(
                "unmet demand of {unmet_demand} with no buildable producers"
            )));
        }
        for option in &usable {
            if (unmet_demand / option.capacity).ceil() > 1e6 {
                return Err(Error::Value(format!(
                    "build decision for {unmet_demand} is too large for prototype '{}'",
                    option.prototype
                )));
            }
        }

        let counts = branch_and_bound(&usable, unmet_demand);
        tracing::debug!(
            unmet_demand,
            options = usable.len(),
            "building manager solved a build decision"
        );
        Ok(usable
            .iter()
            .zip(counts)
            .filter(|(_, n)| *n > 0)
            .map(|(option, n)| BuildOrder {
                count: n,
                prototype: option.prototype.clone(),
                builder: option.builder,
            })
            .collect())
    }
}

/// Exact minimization by depth-first branch-and-bound.
///
/// Options are explored in best cost/capacity order; the remaining-demand
/// lower bound `cost + remaining * best_ratio` prunes the tree. Ties keep
/// the first solution found, which makes the result deterministic in the
/// caller's option order.
fn branch_and_bound(options: &[&ProducerOption], demand: f64) -> Vec<u32> {
    let mut order: Vec<usize> = (0..options.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = options[a].cost / options[a].capacity;
        let rb = options[b].cost / options[b].capacity;
        ra.partial_cmp(&rb).unwrap_or(std::cmp::Ordering::Equal)
    });

    // Suffix minimum of the cost/capacity ratio, for the lower bound.
    let mut suffix_ratio = vec![f64::INFINITY; order.len() + 1];
    for i in (0..order.len()).rev() {
        let option = options[order[i]];
        suffix_ratio[i] = (option.cost / option.capacity).min(suffix_ratio[i + 1]);
    }

    struct Search<'a> {
        options: &'a [&'a ProducerOption],
        order: &'a [usize],
        suffix_ratio: &'a [f64],
        best_cost: f64,
        best: Vec<u32>,
        current: Vec<u32>,
    }

    impl Search<'_> {
        fn descend(&mut self, depth: usize, remaining: f64, cost: f64) {
            if remaining <= 0.0 {
                if cost < self.best_cost {
                    self.best_cost = cost;
                    self.best = self.current.clone();
                }
                return;
            }
            if depth == self.order.len() {
                return;
            }
            // Even fractional filling at the best remaining ratio cannot
            // beat the incumbent: prune.
            if cost + remaining * self.suffix_ratio[depth] >= self.best_cost {
                return;
            }
            let option = self.options[self.order[depth]];
            let max_n = (remaining / option.capacity).ceil() as u32;
            for n in (0..=max_n).rev() {
                self.current[self.order[depth]] = n;
                self.descend(
                    depth + 1,
                    remaining - f64::from(n) * option.capacity,
                    cost + f64::from(n) * option.cost,
                );
            }
            self.current[self.order[depth]] = 0;
        }
    }

    let mut search = Search {
        options,
        order: &order,
        suffix_ratio: &suffix_ratio,
        best_cost: f64::INFINITY,
        best: vec![0; options.len()],
        current: vec![0; options.len()],
    };
    // Seed the incumbent with the single-option greedy fill so pruning has
    // a finite bound immediately.
    {
        let first = order[0];
        let n = (demand / options[first].capacity).ceil() as u32;
        search.best_cost = f64::from(n) * options[first].cost;
        search.best[first] = n;
    }
    search.descend(0, demand, 0.0);
    search.best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(builder: u64, prototype: &str, capacity: f64, cost: f64) -> ProducerOption {
        ProducerOption {
            builder: AgentId(builder),
            prototype: prototype.to_string(),
            capacity,
            cost,
        }
    }

    #[test]
    fn no_demand_means_no_orders() {
        let manager = BuildingManager::new();
        let options = [option(1, "reactor", 1000.0, 5.0)];
        assert!(manager.make_build_decision(&options, 0.0).unwrap().is_empty());
        assert!(manager
            .make_build_decision(&options, -10.0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn demand_without_producers_fails() {
        let manager = BuildingManager::new();
        assert!(manager.make_build_decision(&[], 10.0).is_err());
        // Zero-capacity options cannot help either.
        let options = [option(1, "idle", 0.0, 1.0)];
        assert!(manager.make_build_decision(&options, 10.0).is_err());
    }

    #[test]
    fn covers_demand_with_minimum_count() {
        let manager = BuildingManager::new();
        let options = [option(1, "reactor", 900.0, 5.0)];
        let orders = manager.make_build_decision(&options, 2000.0).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].count, 3);
        assert_eq!(orders[0].prototype, "reactor");
    }

    #[test]
    fn mixes_prototypes_when_cheaper() {
        let manager = BuildingManager::new();
        // Optimal cover of 10 is one large (cap 4, cost 4) plus two small
        // (cap 3, cost 2.9): cost 9.8 beats any single-prototype fill.
        let options = [
            option(1, "large", 4.0, 4.0),
            option(1, "small", 3.0, 2.9),
        ];
        let orders = manager.make_build_decision(&options, 10.0).unwrap();
        let total_cost: f64 = orders
            .iter()
            .map(|o| {
                let opt = options
                    .iter()
                    .find(|c| c.prototype == o.prototype)
                    .unwrap();
                f64::from(o.count) * opt.cost
            })
            .sum();
        let total_cap: f64 = orders
            .iter()
            .map(|o| {
                let opt = options
                    .iter()
                    .find(|c| c.prototype == o.prototype)
                    .unwrap();
                f64::from(o.count) * opt.capacity
            })
            .sum();
        assert!(total_cap >= 10.0);
        approx::assert_relative_eq!(total_cost, 9.8);
    }

    #[test]
    fn builder_registry_round_trip() {
        let mut manager = BuildingManager::new();
        manager.register_builder(AgentId(1)).unwrap();
        assert!(manager.register_builder(AgentId(1)).is_err());
        manager.unregister_builder(AgentId(1)).unwrap();
        assert!(manager.unregister_builder(AgentId(1)).is_err());
    }
}
