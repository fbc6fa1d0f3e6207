use crate::{ExchangeGraph, ExchangeSolver, NodeState, RequestNode};
use mfs_core::models::{Trade, EPS_RSRC};

/// The default matcher: a deterministic greedy walk over the preconditioned
/// graph.
///
/// Groups are visited in preconditioned order, nodes within a group in their
/// preconditioned order, and a node's arcs in ascending cost (descending
/// preference), with stable insertion-order tie-breaks throughout. Matching
/// repeats in passes until a pass produces no new trade.
#[derive(Clone, Copy, Debug, Default)]
pub struct GreedySolver;

impl GreedySolver {
    /// A new greedy solver.
    pub fn new() -> Self {
        Self
    }
}

/// The mutable quantities the solver draws down while matching.
#[derive(Clone, Debug)]
struct SolveState {
    /// Remaining demand per (request portfolio, request).
    demand: Vec<Vec<f64>>,
    /// Remaining supply per (bid portfolio, bid).
    supply: Vec<Vec<f64>>,
    /// Remaining capacity per (request portfolio, constraint).
    req_cap: Vec<Vec<f64>>,
    /// Remaining capacity per (bid portfolio, constraint).
    bid_cap: Vec<Vec<f64>>,
}

impl SolveState {
    fn init(graph: &ExchangeGraph) -> Self {
        Self {
            demand: graph
                .request_portfolios()
                .iter()
                .map(|p| p.requests().iter().map(|r| r.target.quantity()).collect())
                .collect(),
            supply: graph
                .bid_portfolios()
                .iter()
                .map(|p| p.bids().iter().map(|b| b.offer.quantity()).collect())
                .collect(),
            req_cap: graph
                .request_portfolios()
                .iter()
                .map(|p| p.constraints().iter().map(|c| c.capacity()).collect())
                .collect(),
            bid_cap: graph
                .bid_portfolios()
                .iter()
                .map(|p| p.constraints().iter().map(|c| c.capacity()).collect())
                .collect(),
        }
    }

    /// The largest quantity the arc can carry right now, honoring remaining
    /// demand, supply, and every active capacity constraint on both sides.
    fn arc_bound(&self, graph: &ExchangeGraph, arc: &crate::ExchangeArc) -> f64 {
        let r = arc.request;
        let b = arc.bid;
        let mut bound = self.demand[r.portfolio as usize][r.index as usize]
            .min(self.supply[b.portfolio as usize][b.index as usize]);
        for (ci, c) in graph.request_portfolios()[r.portfolio as usize]
            .constraints()
            .iter()
            .enumerate()
        {
            let coeff = c.coeff(r.index as usize);
            if coeff > 0.0 {
                bound = bound.min(self.req_cap[r.portfolio as usize][ci] / coeff);
            }
        }
        for (ci, c) in graph.bid_portfolios()[b.portfolio as usize]
            .constraints()
            .iter()
            .enumerate()
        {
            let coeff = c.coeff(b.index as usize);
            if coeff > 0.0 {
                bound = bound.min(self.bid_cap[b.portfolio as usize][ci] / coeff);
            }
        }
        bound
    }

    fn commit(&mut self, graph: &ExchangeGraph, arc: &crate::ExchangeArc, qty: f64) {
        let r = arc.request;
        let b = arc.bid;
        let demand = &mut self.demand[r.portfolio as usize][r.index as usize];
        *demand = (*demand - qty).max(0.0);
        let supply = &mut self.supply[b.portfolio as usize][b.index as usize];
        *supply = (*supply - qty).max(0.0);
        for (ci, c) in graph.request_portfolios()[r.portfolio as usize]
            .constraints()
            .iter()
            .enumerate()
        {
            let cap = &mut self.req_cap[r.portfolio as usize][ci];
            *cap = (*cap - c.coeff(r.index as usize) * qty).max(0.0);
        }
        for (ci, c) in graph.bid_portfolios()[b.portfolio as usize]
            .constraints()
            .iter()
            .enumerate()
        {
            let cap = &mut self.bid_cap[b.portfolio as usize][ci];
            *cap = (*cap - c.coeff(b.index as usize) * qty).max(0.0);
        }
    }
}

impl GreedySolver {
    /// Arc indices of a node in matching order: ascending cost, stable.
    fn ordered_arcs(graph: &ExchangeGraph, node: &RequestNode) -> Vec<usize> {
        let mut arcs = node.arcs.clone();
        arcs.sort_by(|&a, &b| {
            graph.arcs[a]
                .cost()
                .partial_cmp(&graph.arcs[b].cost())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        arcs
    }

    /// Match one node against its arcs, appending trades and returning the
    /// quantity newly matched.
    ///
    /// Exclusivity rules: an exclusive request trades its full target in a
    /// single arc or not at all; an exclusive bid trades its full offer or
    /// not at all.
    fn match_node(
        graph: &ExchangeGraph,
        state: &mut SolveState,
        node: &RequestNode,
        trades: &mut Vec<Trade>,
    ) -> f64 {
        let r = node.request;
        let mut matched = 0.0;
        for arc_idx in Self::ordered_arcs(graph, node) {
            let remaining = state.demand[r.portfolio as usize][r.index as usize];
            if remaining <= EPS_RSRC {
                break;
            }
            let arc = &graph.arcs[arc_idx];
            let request = graph.request(r);
            let bid = graph.bid(arc.bid);
            let bound = state.arc_bound(graph, arc);

            let qty = if request.exclusive {
                // Exclusive requests fill completely or skip the match.
                let want = request.target.quantity();
                if remaining + EPS_RSRC < want || bound + EPS_RSRC < want {
                    continue;
                }
                want
            } else if bid.exclusive {
                let offer = bid.offer.quantity();
                let available = state.supply[arc.bid.portfolio as usize][arc.bid.index as usize];
                if available + EPS_RSRC < offer
                    || bound + EPS_RSRC < offer
                    || offer > remaining + EPS_RSRC
                {
                    continue;
                }
                offer
            } else {
                bound
            };

            if qty <= EPS_RSRC {
                continue;
            }
            state.commit(graph, arc, qty);
            trades.push(Trade {
                request: r,
                bid: arc.bid,
                qty,
            });
            matched += qty;
        }
        matched
    }

    /// Attempt to fully satisfy every member of a mutual-request group,
    /// committing atomically. On any shortfall the state is rolled back and
    /// no trades are emitted.
    fn match_clique(
        graph: &ExchangeGraph,
        state: &mut SolveState,
        group_idx: usize,
        members: &[usize],
        trades: &mut Vec<Trade>,
    ) -> bool {
        let snapshot = state.clone();
        let mut clique_trades = Vec::new();
        let group = &graph.groups[group_idx];
        let portfolio = group.portfolio as usize;

        for &member in members {
            let Some(node) = group
                .nodes
                .iter()
                .find(|n| n.request.index as usize == member)
            else {
                continue;
            };
            Self::match_node(graph, state, node, &mut clique_trades);
            if state.demand[portfolio][member] > EPS_RSRC {
                *state = snapshot;
                tracing::debug!(
                    portfolio,
                    member,
                    "mutual-request group unsatisfiable; rolling back"
                );
                return false;
            }
        }
        trades.append(&mut clique_trades);
        true
    }
}

impl ExchangeSolver for GreedySolver {
    fn solve(&self, graph: &mut ExchangeGraph) -> Vec<Trade> {
        let mut state = SolveState::init(graph);
        let mut trades = Vec::new();
        // (group, clique) pairs already attempted; cliques get one shot
        // since quantities only ever shrink.
        let mut tried_cliques: mfs_core::Set<(usize, usize)> = mfs_core::Set::default();

        loop {
            let before = trades.len();
            for group_idx in 0..graph.groups.len() {
                let portfolio = graph.groups[group_idx].portfolio as usize;
                let mutual = graph.request_portfolios()[portfolio].mutual_groups().to_vec();

                for node_idx in 0..graph.groups[group_idx].nodes.len() {
                    let request_index =
                        graph.groups[group_idx].nodes[node_idx].request.index as usize;

                    if let Some(clique_idx) =
                        mutual.iter().position(|m| m.contains(&request_index))
                    {
                        if tried_cliques.insert((group_idx, clique_idx)) {
                            Self::match_clique(
                                graph,
                                &mut state,
                                group_idx,
                                &mutual[clique_idx],
                                &mut trades,
                            );
                        }
                        continue;
                    }

                    let node = &graph.groups[group_idx].nodes[node_idx];
                    Self::match_node(graph, &mut state, node, &mut trades);
                }
            }
            if trades.len() == before {
                break;
            }
        }

        // Label terminal node states from the residual demand. Computed in
        // a read-only pass first since the write pass holds the groups
        // mutably.
        let labels: Vec<Vec<NodeState>> = graph
            .groups
            .iter()
            .map(|group| {
                group
                    .nodes
                    .iter()
                    .map(|node| {
                        let r = node.request;
                        let target = graph.request(r).target.quantity();
                        let matched =
                            target - state.demand[r.portfolio as usize][r.index as usize];
                        if matched > EPS_RSRC {
                            NodeState::Matched(matched)
                        } else {
                            NodeState::Unmatched
                        }
                    })
                    .collect()
            })
            .collect();
        for (group, group_labels) in graph.groups.iter_mut().zip(labels) {
            for (node, label) in group.nodes.iter_mut().zip(group_labels) {
                node.state = label;
            }
        }

        tracing::debug!(
            trades = trades.len(),
            nodes = graph.node_count(),
            "greedy solve complete"
        );
        trades
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GreedyPreconditioner, NodeState};
    use approx::assert_relative_eq;
    use mfs_core::models::{
        AgentId, Bid, BidPortfolio, CapacityConstraint, Composition, Material, Request, RequestId,
        RequestPortfolio, Resource, ResourceIds,
    };
    use std::sync::Arc;

    fn mat(ids: &mut ResourceIds, qty: f64) -> Resource {
        let comp = Arc::new(Composition::from_mass([(92235, 1.0)]).unwrap());
        Resource::Material(Material::new(ids, qty, comp).unwrap())
    }

    fn rid(portfolio: u32, index: u32) -> RequestId {
        RequestId { portfolio, index }
    }

    #[test]
    fn empty_portfolios_produce_zero_trades() {
        let mut graph = ExchangeGraph::build(vec![], vec![]);
        assert!(GreedySolver::new().solve(&mut graph).is_empty());

        let mut graph = ExchangeGraph::build(
            vec![RequestPortfolio::new(AgentId(1))],
            vec![BidPortfolio::new(AgentId(2))],
        );
        assert!(GreedySolver::new().solve(&mut graph).is_empty());
    }

    #[test]
    fn simple_match_bounded_by_offer() {
        let mut ids = ResourceIds::new();
        let mut rp = RequestPortfolio::new(AgentId(1));
        rp.add_request(Request::new("c", mat(&mut ids, 10.0))).unwrap();
        let mut bp = BidPortfolio::new(AgentId(2));
        bp.add_bid(Bid::new(rid(0, 0), mat(&mut ids, 4.0))).unwrap();

        let mut graph = ExchangeGraph::build(vec![rp], vec![bp]);
        let trades = GreedySolver::new().solve(&mut graph);
        assert_eq!(trades.len(), 1);
        assert_relative_eq!(trades[0].qty, 4.0);
        assert_eq!(graph.groups[0].nodes[0].state, NodeState::Matched(4.0));
    }

    #[test]
    fn preference_orders_bid_consumption() {
        let mut ids = ResourceIds::new();
        // Two requesters for the same 50 kg exclusive offer; the higher
        // preference wins and no split occurs.
        let mut r1 = RequestPortfolio::new(AgentId(1));
        r1.add_request(Request::new("c", mat(&mut ids, 50.0)).with_preference(2.0))
            .unwrap();
        let mut r2 = RequestPortfolio::new(AgentId(2));
        r2.add_request(Request::new("c", mat(&mut ids, 50.0)).with_preference(1.0))
            .unwrap();

        let mut bp = BidPortfolio::new(AgentId(3));
        bp.add_bid(Bid::new(rid(0, 0), mat(&mut ids, 50.0)).exclusive())
            .unwrap();
        bp.add_bid(Bid::new(rid(1, 0), mat(&mut ids, 50.0)).exclusive())
            .unwrap();
        bp.add_constraint(CapacityConstraint::new(50.0).unwrap());

        let mut graph = ExchangeGraph::build(vec![r1, r2], vec![bp]);
        GreedyPreconditioner::new().condition(&mut graph);
        let trades = GreedySolver::new().solve(&mut graph);

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].request, rid(0, 0));
        assert_relative_eq!(trades[0].qty, 50.0);
        // The losing requester is terminally unmatched.
        let unmatched = graph
            .groups
            .iter()
            .find(|g| g.portfolio == 1)
            .unwrap();
        assert_eq!(unmatched.nodes[0].state, NodeState::Unmatched);
    }

    #[test]
    fn exclusive_request_fills_fully_or_not_at_all() {
        let mut ids = ResourceIds::new();
        let mut rp = RequestPortfolio::new(AgentId(1));
        rp.add_request(Request::new("c", mat(&mut ids, 10.0)).exclusive())
            .unwrap();
        // Offer is short of the target: no trade may happen.
        let mut bp = BidPortfolio::new(AgentId(2));
        bp.add_bid(Bid::new(rid(0, 0), mat(&mut ids, 8.0))).unwrap();

        let mut graph = ExchangeGraph::build(vec![rp], vec![bp]);
        let trades = GreedySolver::new().solve(&mut graph);
        assert!(trades.is_empty());
        assert_eq!(graph.groups[0].nodes[0].state, NodeState::Unmatched);
    }

    #[test]
    fn portfolio_capacity_caps_total_matched() {
        let mut ids = ResourceIds::new();
        let mut rp = RequestPortfolio::new(AgentId(1));
        rp.add_request(Request::new("c", mat(&mut ids, 10.0))).unwrap();
        rp.add_request(Request::new("c", mat(&mut ids, 10.0))).unwrap();
        rp.add_constraint(CapacityConstraint::new(12.0).unwrap());

        let mut bp = BidPortfolio::new(AgentId(2));
        bp.add_bid(Bid::new(rid(0, 0), mat(&mut ids, 10.0))).unwrap();
        bp.add_bid(Bid::new(rid(0, 1), mat(&mut ids, 10.0))).unwrap();

        let mut graph = ExchangeGraph::build(vec![rp], vec![bp]);
        let trades = GreedySolver::new().solve(&mut graph);
        let total: f64 = trades.iter().map(|t| t.qty).sum();
        assert_relative_eq!(total, 12.0, epsilon = EPS_RSRC);
    }

    #[test]
    fn mutual_clique_is_all_or_nothing() {
        let mut ids = ResourceIds::new();
        // Two requests of 30 in one clique against 40 of supply: nothing
        // trades and the supply is untouched.
        let mut rp = RequestPortfolio::new(AgentId(1));
        let a = rp
            .add_request(Request::new("c", mat(&mut ids, 30.0)))
            .unwrap();
        let b = rp
            .add_request(Request::new("c", mat(&mut ids, 30.0)))
            .unwrap();
        rp.add_mutual_group(&[a, b]).unwrap();

        let mut bp = BidPortfolio::new(AgentId(2));
        bp.add_bid(Bid::new(rid(0, 0), mat(&mut ids, 40.0))).unwrap();
        bp.add_bid(Bid::new(rid(0, 1), mat(&mut ids, 40.0))).unwrap();
        bp.add_constraint(CapacityConstraint::new(40.0).unwrap());

        let mut graph = ExchangeGraph::build(vec![rp], vec![bp]);
        let trades = GreedySolver::new().solve(&mut graph);
        assert!(trades.is_empty());
        for node in &graph.groups[0].nodes {
            assert_eq!(node.state, NodeState::Unmatched);
        }
    }

    #[test]
    fn mutual_clique_commits_when_satisfiable() {
        let mut ids = ResourceIds::new();
        let mut rp = RequestPortfolio::new(AgentId(1));
        let a = rp
            .add_request(Request::new("c", mat(&mut ids, 30.0)))
            .unwrap();
        let b = rp
            .add_request(Request::new("c", mat(&mut ids, 30.0)))
            .unwrap();
        rp.add_mutual_group(&[a, b]).unwrap();

        let mut bp = BidPortfolio::new(AgentId(2));
        bp.add_bid(Bid::new(rid(0, 0), mat(&mut ids, 30.0))).unwrap();
        bp.add_bid(Bid::new(rid(0, 1), mat(&mut ids, 30.0))).unwrap();

        let mut graph = ExchangeGraph::build(vec![rp], vec![bp]);
        let trades = GreedySolver::new().solve(&mut graph);
        assert_eq!(trades.len(), 2);
        let total: f64 = trades.iter().map(|t| t.qty).sum();
        assert_relative_eq!(total, 60.0, epsilon = EPS_RSRC);
    }

    #[test]
    fn split_across_multiple_bids() {
        let mut ids = ResourceIds::new();
        let mut rp = RequestPortfolio::new(AgentId(1));
        rp.add_request(Request::new("c", mat(&mut ids, 10.0))).unwrap();

        let mut b1 = BidPortfolio::new(AgentId(2));
        b1.add_bid(Bid::new(rid(0, 0), mat(&mut ids, 6.0))).unwrap();
        let mut b2 = BidPortfolio::new(AgentId(3));
        b2.add_bid(Bid::new(rid(0, 0), mat(&mut ids, 6.0))).unwrap();

        let mut graph = ExchangeGraph::build(vec![rp], vec![b1, b2]);
        let trades = GreedySolver::new().solve(&mut graph);
        assert_eq!(trades.len(), 2);
        assert_relative_eq!(trades[0].qty, 6.0);
        assert_relative_eq!(trades[1].qty, 4.0);
        assert_eq!(graph.groups[0].nodes[0].state, NodeState::Matched(10.0));
    }
}
