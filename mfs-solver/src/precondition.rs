use crate::ExchangeGraph;
use mfs_core::models::Commodity;
use mfs_core::Map;

/// How supplied commodity weights should be interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WeightOrder {
    /// Higher weight clears first.
    #[default]
    Natural,
    /// Weights were given in reverse: each weight `w` becomes
    /// `max + min - w`, so lower-valued commodities clear first.
    Reverse,
}

/// Orders request nodes and groups so the greedy solver visits the most
/// valuable work first.
///
/// Per node, the average preference over its arcs feeds the weight
/// `commod_weight * (1 + p/(1 + p))`; per group, the weight is the mean of
/// its node weights. Nodes sort within their group and groups sort overall,
/// descending. All sorts are stable, so insertion order breaks ties.
#[derive(Clone, Debug, Default)]
pub struct GreedyPreconditioner {
    commod_weights: Map<Commodity, f64>,
    ascending: bool,
}

impl GreedyPreconditioner {
    /// A preconditioner with unit commodity weights.
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply commodity weights, applying the given interpretation.
    /// Unlisted commodities weigh 1.0.
    pub fn with_weights(mut weights: Map<Commodity, f64>, order: WeightOrder) -> Self {
        if order == WeightOrder::Reverse && !weights.is_empty() {
            let min = weights.values().cloned().fold(f64::INFINITY, f64::min);
            let max = weights.values().cloned().fold(f64::NEG_INFINITY, f64::max);
            for weight in weights.values_mut() {
                *weight = max + min - *weight;
            }
        }
        for (commod, weight) in &weights {
            tracing::info!(%commod, weight, "commodity weight for preconditioning");
        }
        Self {
            commod_weights: weights,
            ascending: false,
        }
    }

    /// Sort ascending instead, so the least valuable work clears first.
    pub fn ascending(mut self) -> Self {
        self.ascending = true;
        self
    }

    fn commod_weight(&self, commodity: &Commodity) -> f64 {
        self.commod_weights.get(commodity).copied().unwrap_or(1.0)
    }

    /// Reorder the graph's nodes and groups in place.
    pub fn condition(&self, graph: &mut ExchangeGraph) {
        let mut group_weights: Vec<f64> = Vec::with_capacity(graph.groups.len());

        for group in &mut graph.groups {
            let mut node_weights: Vec<f64> = group
                .nodes
                .iter()
                .map(|node| {
                    let avg_pref = if node.arcs.is_empty() {
                        0.0
                    } else {
                        node.arcs.iter().map(|&a| graph.arcs[a].pref).sum::<f64>()
                            / node.arcs.len() as f64
                    };
                    self.commod_weight(&node.commodity) * (1.0 + avg_pref / (1.0 + avg_pref))
                })
                .collect();

            // Stable sort of (node, weight) pairs, keyed by weight.
            let mut order: Vec<usize> = (0..group.nodes.len()).collect();
            order.sort_by(|&a, &b| self.compare(node_weights[a], node_weights[b]));
            apply_permutation(&mut group.nodes, &order);
            apply_permutation(&mut node_weights, &order);

            let group_weight = if node_weights.is_empty() {
                0.0
            } else {
                node_weights.iter().sum::<f64>() / node_weights.len() as f64
            };
            tracing::debug!(group = group.portfolio, weight = group_weight, "group weight");
            group_weights.push(group_weight);
        }

        let mut order: Vec<usize> = (0..graph.groups.len()).collect();
        order.sort_by(|&a, &b| self.compare(group_weights[a], group_weights[b]));
        apply_permutation(&mut graph.groups, &order);
    }

    fn compare(&self, a: f64, b: f64) -> std::cmp::Ordering {
        let ord = b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal);
        if self.ascending { ord.reverse() } else { ord }
    }
}

/// Reorder `items` so that position `i` receives the element previously at
/// `order[i]`.
fn apply_permutation<T>(items: &mut Vec<T>, order: &[usize]) {
    let mut slots: Vec<Option<T>> = items.drain(..).map(Some).collect();
    items.extend(order.iter().map(|&i| {
        slots[i]
            .take()
            .expect("permutation indices must be distinct")
    }));
}
