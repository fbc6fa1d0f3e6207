//! Per-time-step exchange orchestration and trade execution.
//!
//! This module runs phase 3 of a time step: collect request portfolios from
//! every registered trader, collect bids against them, build and precondition
//! the exchange graph, solve it into trades, and execute each trade by moving
//! a concrete resource from supplier to requester. Resources change hands
//! nowhere else in the kernel.

use crate::agent::AgentArena;
use crate::context::Context;
use crate::trader::TradeInfo;
use mfs_core::models::{
    AgentId, BidPortfolio, RequestBook, RequestPortfolio, Resource, Trade, EPS_RSRC,
};
use mfs_core::Map;
use mfs_solver::{ExchangeGraph, ExchangeSolver, GreedyPreconditioner};

/// Collect portfolios, solve, and execute the matched trades.
///
/// Returns the number of trades actually executed (a failed resource
/// extraction skips that trade without aborting the step).
pub fn run_exchange(
    ctx: &mut Context,
    arena: &mut AgentArena,
    preconditioner: &GreedyPreconditioner,
    solver: &dyn ExchangeSolver,
) -> usize {
    let request_portfolios = collect_requests(ctx, arena);
    let bid_portfolios = collect_bids(ctx, arena, &request_portfolios);

    let mut graph = ExchangeGraph::build(request_portfolios, bid_portfolios);
    preconditioner.condition(&mut graph);
    let trades = solver.solve(&mut graph);
    tracing::debug!(
        time = ctx.time(),
        trades = trades.len(),
        "exchange solved"
    );

    execute_trades(ctx, arena, &graph, &trades)
}

fn collect_requests(ctx: &mut Context, arena: &mut AgentArena) -> Vec<RequestPortfolio> {
    let mut portfolios = Vec::new();
    for id in ctx.traders() {
        let Some(mut agent) = arena.lend(id) else {
            continue;
        };
        if let Some(trader) = agent.trader() {
            portfolios.extend(trader.get_requests(ctx));
        }
        arena.give_back(id, agent);
    }
    portfolios
}

fn collect_bids(
    ctx: &mut Context,
    arena: &mut AgentArena,
    request_portfolios: &[RequestPortfolio],
) -> Vec<BidPortfolio> {
    let book = RequestBook::new(request_portfolios);
    let mut portfolios = Vec::new();
    for id in ctx.traders() {
        let Some(mut agent) = arena.lend(id) else {
            continue;
        };
        if let Some(trader) = agent.trader() {
            portfolios.extend(trader.get_bids(ctx, &book));
        }
        arena.give_back(id, agent);
    }
    portfolios
}

fn trade_info(graph: &ExchangeGraph, trade: &Trade) -> TradeInfo {
    let request = graph.request(trade.request);
    TradeInfo {
        commodity: request.commodity.clone(),
        qty: trade.qty,
        requester: graph.request_portfolios()[trade.request.portfolio as usize].requester(),
        bidder: graph.bid_portfolios()[trade.bid.portfolio as usize].bidder(),
        target: request.target.clone(),
    }
}

fn execute_trades(
    ctx: &mut Context,
    arena: &mut AgentArena,
    graph: &ExchangeGraph,
    trades: &[Trade],
) -> usize {
    let mut deliveries: Map<AgentId, Vec<(TradeInfo, Resource)>> = Map::default();
    let mut executed = 0;

    for trade in trades {
        let info = trade_info(graph, trade);
        let Some(resource) = remove_from_supplier(ctx, arena, &info) else {
            continue;
        };

        // Conservation across the transfer is an invariant, not an error
        // branch: a supplier that "succeeds" with the wrong quantity has
        // corrupted the books.
        assert!(
            (resource.quantity() - info.qty).abs() <= EPS_RSRC + info.qty * 1e-12,
            "supplier {} returned {} for a trade of {}",
            info.bidder,
            resource.quantity(),
            info.qty
        );

        let row = ctx.record_resource(&resource);
        let trans = ctx.next_trans_id();
        let time = ctx.time();
        let _ = ctx
            .new_datum("Transactions")
            .add_val("TransactionId", trans.0 as i64)
            .add_val("SenderId", info.bidder.0 as i64)
            .add_val("ReceiverId", info.requester.0 as i64)
            .add_val("Commodity", info.commodity.as_str())
            .add_val("Price", 0.0f64)
            .add_val("Time", time)
            .record();
        let _ = ctx
            .new_datum("TransactedResources")
            .add_val("TransactionId", trans.0 as i64)
            .add_val("Position", 0i32)
            .add_val("ResourceId", row)
            .add_val("Quantity", resource.quantity())
            .record();

        executed += 1;
        deliveries
            .entry(info.requester)
            .or_default()
            .push((info, resource));
    }

    for (requester, batch) in deliveries {
        let Some(mut agent) = arena.lend(requester) else {
            tracing::warn!(agent = %requester, "requester vanished before delivery");
            continue;
        };
        if let Some(trader) = agent.trader() {
            trader.accept_trades(ctx, batch);
        }
        arena.give_back(requester, agent);
    }

    executed
}

/// Ask the supplier for the traded resource. Any failure records a
/// `FailedTrade` row and skips the trade; the requester simply never sees a
/// delivery.
fn remove_from_supplier(
    ctx: &mut Context,
    arena: &mut AgentArena,
    info: &TradeInfo,
) -> Option<Resource> {
    let Some(mut agent) = arena.lend(info.bidder) else {
        record_failed(ctx, info, "supplier not live");
        return None;
    };
    let outcome = match agent.trader() {
        Some(trader) => trader.remove_resource(ctx, info),
        None => Err(mfs_core::Error::State(format!(
            "agent {} is not a trader",
            info.bidder
        ))),
    };
    arena.give_back(info.bidder, agent);

    match outcome {
        Ok(resource) => Some(resource),
        Err(err) => {
            // Stamp the supplier's identity and the time onto the error
            // before it reaches the log and the FailedTrade row.
            let err = match ctx.agent(info.bidder) {
                Some(meta) => {
                    err.in_agent(&meta.prototype, &meta.spec, info.bidder.0, ctx.time())
                }
                None => err,
            };
            tracing::warn!(
                supplier = %info.bidder,
                commodity = %info.commodity,
                qty = info.qty,
                %err,
                "trade failed at resource extraction"
            );
            record_failed(ctx, info, &err.to_string());
            None
        }
    }
}

fn record_failed(ctx: &mut Context, info: &TradeInfo, reason: &str) {
    let time = ctx.time();
    let _ = ctx
        .new_datum("FailedTrade")
        .add_val("SenderId", info.bidder.0 as i64)
        .add_val("ReceiverId", info.requester.0 as i64)
        .add_val("Commodity", info.commodity.as_str())
        .add_val("Quantity", info.qty)
        .add_val("Reason", reason)
        .add_val("Time", time)
        .record();
}
