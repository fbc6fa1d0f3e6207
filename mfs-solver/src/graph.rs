use mfs_core::models::{BidId, BidPortfolio, Commodity, RequestId, RequestPortfolio};

/// A request-bid pairing the solver may turn into a trade.
#[derive(Clone, Debug)]
pub struct ExchangeArc {
    /// The request side.
    pub request: RequestId,
    /// The bid side.
    pub bid: BidId,
    /// The most this arc can carry: `min(target, offer)`.
    pub capacity: f64,
    /// The request's preference for this pairing; higher is better.
    pub pref: f64,
    /// Set when either endpoint is all-or-nothing.
    pub exclusive: bool,
}

impl ExchangeArc {
    /// Matching cost; the solver prefers cheaper arcs. Monotone decreasing
    /// in preference.
    pub fn cost(&self) -> f64 {
        1.0 / (1.0 + self.pref)
    }
}

/// The terminal disposition of a request node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeState {
    /// Not yet visited by a solver.
    Pending,
    /// Matched to this total quantity.
    Matched(f64),
    /// Visited and left without a match.
    Unmatched,
}

/// One request, as the solver sees it.
#[derive(Clone, Debug)]
pub struct RequestNode {
    /// Handle back into the round's portfolios.
    pub request: RequestId,
    /// The commodity the request is on.
    pub commodity: Commodity,
    /// Arc indices into [`ExchangeGraph::arcs`], in bid insertion order.
    pub arcs: Vec<usize>,
    /// Terminal state, written by the solver.
    pub state: NodeState,
}

/// All requests of one portfolio, ordered by the preconditioner.
#[derive(Clone, Debug)]
pub struct RequestGroup {
    /// Index of the backing portfolio in [`ExchangeGraph::request_portfolios`].
    pub portfolio: u32,
    /// The member nodes. The preconditioner reorders these in place.
    pub nodes: Vec<RequestNode>,
}

/// The per-time-step bipartite view of all open requests and bids.
///
/// Built fresh from the round's collected portfolios, consumed by a solver,
/// then dropped. Request groups are one-to-one with request portfolios
/// (portfolios are per-trader-per-commodity by construction), so
/// portfolio-level capacity constraints and mutual groups attach unchanged.
#[derive(Debug)]
pub struct ExchangeGraph {
    request_portfolios: Vec<RequestPortfolio>,
    bid_portfolios: Vec<BidPortfolio>,
    /// The solver's work list, reordered by the preconditioner.
    pub groups: Vec<RequestGroup>,
    /// Arc storage; nodes refer to arcs by index.
    pub arcs: Vec<ExchangeArc>,
}

impl ExchangeGraph {
    /// Pair every bid with its referenced request, keeping only
    /// resource-compatible arcs.
    ///
    /// Bids referencing requests that do not exist, or offering a resource
    /// the target cannot accept, contribute no arc and are silently inert,
    /// exactly as an unmatched request is.
    pub fn build(
        request_portfolios: Vec<RequestPortfolio>,
        bid_portfolios: Vec<BidPortfolio>,
    ) -> Self {
        let mut graph = Self {
            groups: request_portfolios
                .iter()
                .enumerate()
                .map(|(p, portfolio)| RequestGroup {
                    portfolio: p as u32,
                    nodes: portfolio
                        .requests()
                        .iter()
                        .enumerate()
                        .map(|(i, request)| RequestNode {
                            request: RequestId {
                                portfolio: p as u32,
                                index: i as u32,
                            },
                            commodity: request.commodity.clone(),
                            arcs: Vec::new(),
                            state: NodeState::Pending,
                        })
                        .collect(),
                })
                .collect(),
            arcs: Vec::new(),
            request_portfolios,
            bid_portfolios,
        };

        for (p, portfolio) in graph.bid_portfolios.iter().enumerate() {
            for (i, bid) in portfolio.bids().iter().enumerate() {
                let Some(request) = graph
                    .request_portfolios
                    .get(bid.request.portfolio as usize)
                    .and_then(|rp| rp.requests().get(bid.request.index as usize))
                else {
                    tracing::warn!(bid = i, portfolio = p, "bid references unknown request");
                    continue;
                };
                if !request.target.accepts_offer(&bid.offer) {
                    continue;
                }
                let arc = ExchangeArc {
                    request: bid.request,
                    bid: BidId {
                        portfolio: p as u32,
                        index: i as u32,
                    },
                    capacity: request.target.quantity().min(bid.offer.quantity()),
                    pref: request.preference,
                    exclusive: request.exclusive || bid.exclusive,
                };
                graph.arcs.push(arc);
                let node = &mut graph.groups[bid.request.portfolio as usize].nodes
                    [bid.request.index as usize];
                node.arcs.push(graph.arcs.len() - 1);
            }
        }

        graph
    }

    /// The round's request portfolios, in collection order.
    pub fn request_portfolios(&self) -> &[RequestPortfolio] {
        &self.request_portfolios
    }

    /// The round's bid portfolios, in collection order.
    pub fn bid_portfolios(&self) -> &[BidPortfolio] {
        &self.bid_portfolios
    }

    /// Resolve a request handle.
    pub fn request(&self, id: RequestId) -> &mfs_core::models::Request {
        &self.request_portfolios[id.portfolio as usize].requests()[id.index as usize]
    }

    /// Resolve a bid handle.
    pub fn bid(&self, id: BidId) -> &mfs_core::models::Bid {
        &self.bid_portfolios[id.portfolio as usize].bids()[id.index as usize]
    }

    /// Total number of request nodes.
    pub fn node_count(&self) -> usize {
        self.groups.iter().map(|g| g.nodes.len()).sum()
    }
}
