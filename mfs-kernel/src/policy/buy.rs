use crate::context::Context;
use crate::random::{DoubleDist, IntDist};
use crate::trader::TradeInfo;
use mfs_core::models::{
    AgentId, CapacityConstraint, CompPtr, Commodity, Composition, Material, Request,
    RequestPortfolio, ResBuf, Resource, EPS_RSRC,
};
use mfs_core::{Error, Result};
use std::sync::Arc;

struct BuyCommod {
    commodity: Commodity,
    comp: Option<CompPtr>,
    pref: f64,
}

/// A policy that keeps a buffer stocked by requesting material on one or
/// more commodities.
///
/// Each time step the policy is either *active* (emitting requests sized by
/// the size distribution against the buffer's free space) or *dormant*
/// (silent). Cycle lengths are drawn once per cycle from the configured
/// distributions. A reorder point turns the policy into an (s,S) or, with a
/// reorder quantity, an (R,Q) inventory policy; a cumulative cap ends the
/// active portion early once enough material has been received.
pub struct BuyPolicy {
    name: String,
    agent: AgentId,
    commods: Vec<BuyCommod>,
    active_dist: IntDist,
    dormant_dist: IntDist,
    size_dist: DoubleDist,
    reorder_point: Option<f64>,
    reorder_quantity: Option<f64>,
    cumulative_cap: Option<f64>,

    active_end: i32,
    dormant_end: i32,
    cycle_receipts: f64,
}

impl BuyPolicy {
    /// A policy for `agent` that is always active, requesting the full free
    /// space each step. Commodities are added with
    /// [`add_commodity`](Self::add_commodity).
    pub fn new(agent: AgentId, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent,
            commods: Vec::new(),
            active_dist: IntDist::fixed(1),
            dormant_dist: IntDist::fixed(-1),
            size_dist: DoubleDist::Fixed(1.0),
            reorder_point: None,
            reorder_quantity: None,
            cumulative_cap: None,
            active_end: 0,
            dormant_end: 0,
            cycle_receipts: 0.0,
        }
    }

    /// Request on a commodity, optionally pinning a composition, with a
    /// preference.
    pub fn add_commodity(
        mut self,
        commodity: impl Into<Commodity>,
        comp: Option<CompPtr>,
        pref: f64,
    ) -> Self {
        self.commods.push(BuyCommod {
            commodity: commodity.into(),
            comp,
            pref,
        });
        self
    }

    /// The active-cycle length distribution.
    pub fn active(mut self, dist: IntDist) -> Self {
        self.active_dist = dist;
        self
    }

    /// The dormant-cycle length distribution. Negative draws mean no
    /// dormancy.
    pub fn dormant(mut self, dist: IntDist) -> Self {
        self.dormant_dist = dist;
        self
    }

    /// The request-size distribution, as a fraction of free space.
    pub fn size(mut self, dist: DoubleDist) -> Self {
        self.size_dist = dist;
        self
    }

    /// Request only at or below `point`. With `quantity`, requests become
    /// exclusive lots of exactly that size ((R,Q) policy); without, the
    /// request refills toward capacity ((s,S) policy).
    pub fn reorder(mut self, point: f64, quantity: Option<f64>) -> Result<Self> {
        if !point.is_finite() || point < 0.0 {
            return Err(Error::Value(format!("invalid reorder point {point}")));
        }
        if let Some(qty) = quantity {
            if !qty.is_finite() || qty <= 0.0 {
                return Err(Error::Value(format!("invalid reorder quantity {qty}")));
            }
        }
        self.reorder_point = Some(point);
        self.reorder_quantity = quantity;
        Ok(self)
    }

    /// Cap receipts per active cycle; reaching the cap forces an early
    /// transition to dormant.
    pub fn cumulative_cap(mut self, cap: f64) -> Result<Self> {
        if !cap.is_finite() || cap <= 0.0 {
            return Err(Error::Value(format!("invalid cumulative cap {cap}")));
        }
        self.cumulative_cap = Some(cap);
        Ok(self)
    }

    /// The policy name, for logging.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True while the current cycle is in its active portion.
    pub fn is_active(&self, t: i32) -> bool {
        t < self.active_end
    }

    fn update_cycle(&mut self, ctx: &mut Context, t: i32) {
        if self.dormant_end > t {
            return;
        }
        let active = self.active_dist.sample(ctx.rng()).max(0);
        let dormant = self.dormant_dist.sample(ctx.rng()).max(0);
        self.active_end = t + active;
        self.dormant_end = (self.active_end + dormant).max(t + 1);
        self.cycle_receipts = 0.0;
        tracing::info!(
            policy = %self.name,
            agent = %self.agent,
            time = t,
            active,
            dormant,
            "starting a new buy cycle"
        );
    }

    fn force_dormant(&mut self, t: i32) {
        let dormant_len = (self.dormant_end - self.active_end).max(0);
        self.active_end = t;
        self.dormant_end = (t + dormant_len).max(t + 1);
        tracing::info!(
            policy = %self.name,
            agent = %self.agent,
            time = t,
            "cumulative cap reached; going dormant early"
        );
    }

    /// Emit this step's request portfolio (possibly none).
    pub fn get_requests(&mut self, ctx: &mut Context, buf: &ResBuf) -> Vec<RequestPortfolio> {
        let t = ctx.time();
        self.update_cycle(ctx, t);
        if !self.is_active(t) {
            return Vec::new();
        }
        if let Some(cap) = self.cumulative_cap {
            if self.cycle_receipts >= cap - EPS_RSRC {
                self.force_dormant(t);
                return Vec::new();
            }
        }
        if let Some(point) = self.reorder_point {
            if buf.quantity() > point {
                return Vec::new();
            }
        }

        let frac = self.size_dist.sample(ctx.rng()).clamp(0.0, 1.0);
        let mut amt = frac * buf.space();
        let exclusive = self.reorder_quantity.is_some();
        if let Some(qty) = self.reorder_quantity {
            amt = qty;
        }
        if let Some(cap) = self.cumulative_cap {
            amt = amt.min(cap - self.cycle_receipts);
        }
        if amt <= EPS_RSRC {
            return Vec::new();
        }

        let mut port = RequestPortfolio::new(self.agent);
        for commod in &self.commods {
            let comp = commod
                .comp
                .clone()
                .unwrap_or_else(|| Arc::new(Composition::vacuum()));
            let target = match Material::new(ctx.resource_ids(), amt, comp) {
                Ok(m) => Resource::Material(m),
                Err(err) => {
                    tracing::error!(policy = %self.name, %err, "could not form request target");
                    continue;
                }
            };
            let mut request = Request::new(commod.commodity.clone(), target)
                .with_preference(commod.pref);
            if exclusive {
                request = request.exclusive();
            }
            if let Err(err) = port.add_request(request) {
                tracing::error!(policy = %self.name, %err, "dropping invalid request");
            }
        }
        if port.is_empty() {
            return Vec::new();
        }
        // Substitute commodities share one portfolio; the constraint caps
        // the total fill at the requested amount.
        if let Ok(constraint) = CapacityConstraint::new(amt) {
            port.add_constraint(constraint);
        }
        tracing::debug!(
            policy = %self.name,
            agent = %self.agent,
            time = t,
            amt,
            "requesting material"
        );
        vec![port]
    }

    /// Bank the matched deliveries into the buffer.
    pub fn accept_trades(
        &mut self,
        _ctx: &mut Context,
        buf: &mut ResBuf,
        deliveries: Vec<(TradeInfo, Resource)>,
    ) {
        for (info, resource) in deliveries {
            let qty = resource.quantity();
            match buf.push(resource) {
                Ok(()) => {
                    self.cycle_receipts += qty;
                    tracing::debug!(
                        policy = %self.name,
                        commodity = %info.commodity,
                        qty,
                        "received material"
                    );
                }
                Err(err) => {
                    tracing::error!(
                        policy = %self.name,
                        commodity = %info.commodity,
                        qty,
                        %err,
                        "delivery does not fit; dropping"
                    );
                }
            }
        }
    }
}
