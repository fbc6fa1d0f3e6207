//! Minimal source/sink agents shared by the integration tests.
//!
//! `Source` mints material on demand up to a per-step throughput; `Sink`
//! requests up to a per-step cap into a bounded inventory. Both expose
//! shared handles so tests can inspect state after the simulation ran.

use mfs_core::models::{
    AgentId, Bid, BidPortfolio, CapacityConstraint, CompPtr, Commodity, Material, Request,
    RequestBook, RequestPortfolio, ResBuf, Resource,
};
use mfs_core::Result;
use mfs_kernel::agent::Agent;
use mfs_kernel::context::Context;
use mfs_kernel::trader::{TradeInfo, Trader};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A facility that can mint `throughput` of its recipe per time step.
pub struct Source {
    pub id: AgentId,
    pub commod: Commodity,
    pub recipe: CompPtr,
    pub throughput: f64,
    pub exclusive: bool,
    /// Total quantity minted, shared with the test.
    pub produced: Rc<Cell<f64>>,
}

impl Agent for Source {
    fn enter_notify(&mut self, ctx: &mut Context) {
        ctx.register_trader(self.id);
        ctx.register_time_listener(self.id);
    }

    fn trader(&mut self) -> Option<&mut dyn Trader> {
        Some(self)
    }
}

impl Trader for Source {
    fn get_bids(&mut self, ctx: &mut Context, book: &RequestBook<'_>) -> Vec<BidPortfolio> {
        let mut port = BidPortfolio::new(self.id);
        if let Ok(constraint) = CapacityConstraint::new(self.throughput) {
            port.add_constraint(constraint);
        }
        for (rid, request) in book.requests_for(&self.commod) {
            let qty = request.target.quantity().min(self.throughput);
            let Ok(offer) = Material::new(ctx.resource_ids(), qty, self.recipe.clone()) else {
                continue;
            };
            let mut bid = Bid::new(rid, Resource::Material(offer));
            if self.exclusive {
                bid = bid.exclusive();
            }
            let _ = port.add_bid(bid);
        }
        if port.is_empty() {
            Vec::new()
        } else {
            vec![port]
        }
    }

    fn remove_resource(&mut self, ctx: &mut Context, trade: &TradeInfo) -> Result<Resource> {
        self.produced.set(self.produced.get() + trade.qty);
        Ok(Resource::Material(Material::new(
            ctx.resource_ids(),
            trade.qty,
            self.recipe.clone(),
        )?))
    }
}

/// A facility that requests up to `throughput` per step into a bounded
/// inventory.
pub struct Sink {
    pub id: AgentId,
    pub commod: Commodity,
    pub throughput: f64,
    pub preference: f64,
    pub exclusive: bool,
    /// The inventory buffer, shared with the test.
    pub inventory: Rc<RefCell<ResBuf>>,
}

impl Agent for Sink {
    fn enter_notify(&mut self, ctx: &mut Context) {
        ctx.register_trader(self.id);
        ctx.register_time_listener(self.id);
    }

    fn trader(&mut self) -> Option<&mut dyn Trader> {
        Some(self)
    }
}

impl Trader for Sink {
    fn get_requests(&mut self, ctx: &mut Context) -> Vec<RequestPortfolio> {
        let space = self.inventory.borrow().space();
        let amt = self.throughput.min(space);
        if amt <= 0.0 {
            return Vec::new();
        }
        let Ok(target) = Material::new(
            ctx.resource_ids(),
            amt,
            std::sync::Arc::new(mfs_core::models::Composition::vacuum()),
        ) else {
            return Vec::new();
        };
        let mut port = RequestPortfolio::new(self.id);
        let mut request = Request::new(self.commod.clone(), Resource::Material(target))
            .with_preference(self.preference);
        if self.exclusive {
            request = request.exclusive();
        }
        let _ = port.add_request(request);
        vec![port]
    }

    fn accept_trades(&mut self, _ctx: &mut Context, deliveries: Vec<(TradeInfo, Resource)>) {
        let mut inventory = self.inventory.borrow_mut();
        for (_, resource) in deliveries {
            inventory.push(resource).expect("delivery fits the inventory");
        }
    }
}
