#![warn(missing_docs)]
//! Exchange graph construction, preconditioning, and trade matching.
//!
//! Once per time step the kernel collects every trader's request and bid
//! portfolios and hands them here. The graph pairs requests with compatible
//! bids, the preconditioner orders the work so scarce, highly-valued
//! commodities clear first, and the solver walks the ordered graph emitting
//! [`Trade`](mfs_core::models::Trade)s. The graph is discarded after the
//! solve; nothing here survives across time steps.

mod graph;
pub use graph::*;

mod precondition;
pub use precondition::*;

mod greedy;
pub use greedy::*;

/// The interface every trade matcher implements.
///
/// The solver consumes a built (and usually preconditioned) graph and
/// resolves it into a set of trades honoring node exclusivity, portfolio
/// capacity constraints, and mutual-request groups. Node states are left
/// terminal: matched or unmatched.
pub trait ExchangeSolver {
    /// Match the graph into trades.
    fn solve(&self, graph: &mut ExchangeGraph) -> Vec<mfs_core::models::Trade>;
}
