//! The trading capability.
//!
//! Trading is a capability an agent opts into, not a kind of agent: a
//! facility that trades registers itself with the context and exposes this
//! surface from [`Agent::trader`](crate::agent::Agent::trader). The driver
//! calls these hooks in a fixed order each time step: requests are collected
//! from every trader, then bids against the collected requests, then matched
//! trades are executed against the two ends.

use crate::context::Context;
use mfs_core::models::{
    AgentId, BidPortfolio, Commodity, RequestBook, RequestPortfolio, Resource,
};
use mfs_core::{Error, Result};

/// A resolved trade as the two trading parties see it.
#[derive(Clone, Debug)]
pub struct TradeInfo {
    /// The commodity traded.
    pub commodity: Commodity,
    /// Matched quantity.
    pub qty: f64,
    /// The receiving trader.
    pub requester: AgentId,
    /// The supplying trader.
    pub bidder: AgentId,
    /// What the requester asked for (composition/quality context for the
    /// supplier).
    pub target: Resource,
}

/// The exchange-facing surface of a trading agent.
///
/// All methods default to "does not participate"; a pure buyer implements
/// the request side, a pure seller the bid side.
pub trait Trader {
    /// Emit this round's request portfolios. May be empty.
    fn get_requests(&mut self, _ctx: &mut Context) -> Vec<RequestPortfolio> {
        Vec::new()
    }

    /// Emit this round's bid portfolios against the collected requests.
    fn get_bids(&mut self, _ctx: &mut Context, _book: &RequestBook<'_>) -> Vec<BidPortfolio> {
        Vec::new()
    }

    /// Surrender the traded resource from storage. The returned resource
    /// must match the trade quantity within tolerance.
    ///
    /// An error here fails only this trade; the executor records it and the
    /// time step continues.
    fn remove_resource(&mut self, _ctx: &mut Context, trade: &TradeInfo) -> Result<Resource> {
        Err(Error::State(format!(
            "agent {} bid but cannot supply resources",
            trade.bidder
        )))
    }

    /// Receive the resources matched to this trader's requests, in trade
    /// order.
    fn accept_trades(&mut self, _ctx: &mut Context, _deliveries: Vec<(TradeInfo, Resource)>) {}
}
