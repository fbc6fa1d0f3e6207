use crate::context::Context;
use crate::trader::TradeInfo;
use mfs_core::models::{
    AgentId, Bid, BidPortfolio, CapacityConstraint, Commodity, Material, Product, RequestBook,
    ResBuf, Resource, EPS_RSRC,
};
use mfs_core::{Error, Result};

/// A policy that offers a buffer's contents on one or more commodities.
///
/// Every step it bids up to the buffer quantity against each open request,
/// optionally quantized into exclusive fixed-size lots. The offered
/// composition (or quality) mirrors whatever sits at the front of the
/// buffer.
pub struct SellPolicy {
    name: String,
    agent: AgentId,
    commods: Vec<Commodity>,
    quantize: Option<f64>,
}

impl SellPolicy {
    /// A policy for `agent` selling nothing yet.
    pub fn new(agent: AgentId, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent,
            commods: Vec::new(),
            quantize: None,
        }
    }

    /// Offer on a commodity.
    pub fn add_commodity(mut self, commodity: impl Into<Commodity>) -> Self {
        self.commods.push(commodity.into());
        self
    }

    /// Sell in exclusive lots of exactly `lot` each.
    pub fn quantize(mut self, lot: f64) -> Result<Self> {
        if !lot.is_finite() || lot <= 0.0 {
            return Err(Error::Value(format!("invalid quantize lot {lot}")));
        }
        self.quantize = Some(lot);
        Ok(self)
    }

    /// The policy name, for logging.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Emit this step's bid portfolio against the open requests.
    pub fn get_bids(
        &mut self,
        ctx: &mut Context,
        buf: &ResBuf,
        book: &RequestBook<'_>,
    ) -> Vec<BidPortfolio> {
        if buf.is_empty() || buf.quantity() < EPS_RSRC {
            return Vec::new();
        }
        let bcap = buf.quantity();
        let limit = match self.quantize {
            Some(lot) => lot * (bcap / lot).floor(),
            None => bcap,
        };
        if limit <= EPS_RSRC {
            return Vec::new();
        }

        // The offer mirrors the material at the front of the buffer.
        enum Offer {
            Comp(mfs_core::models::CompPtr),
            Quality(String),
        }
        let offer_shape = match buf.iter().next() {
            Some(Resource::Material(m)) => Offer::Comp(m.comp().clone()),
            Some(Resource::Product(p)) => Offer::Quality(p.quality().to_string()),
            None => return Vec::new(),
        };
        let make_offer = |ctx: &mut Context, qty: f64| -> Result<Resource> {
            Ok(match &offer_shape {
                Offer::Comp(comp) => {
                    Resource::Material(Material::new(ctx.resource_ids(), qty, comp.clone())?)
                }
                Offer::Quality(quality) => {
                    Resource::Product(Product::new(ctx.resource_ids(), qty, quality.clone())?)
                }
            })
        };

        let mut port = BidPortfolio::new(self.agent);
        if let Ok(constraint) = CapacityConstraint::new(limit) {
            port.add_constraint(constraint);
        }
        tracing::info!(policy = %self.name, agent = %self.agent, limit, "bidding out material");

        for commod in &self.commods {
            for (rid, request) in book.requests_for(commod) {
                let qty = request.target.quantity().min(bcap);
                match self.quantize {
                    Some(lot) => {
                        let nbids = (qty / lot).floor() as usize;
                        for _ in 0..nbids {
                            if let Ok(offer) = make_offer(ctx, lot) {
                                let _ = port.add_bid(Bid::new(rid, offer).exclusive());
                            }
                        }
                    }
                    None => {
                        if let Ok(offer) = make_offer(ctx, qty) {
                            let _ = port.add_bid(Bid::new(rid, offer));
                        }
                    }
                }
            }
        }
        if port.is_empty() {
            return Vec::new();
        }
        vec![port]
    }

    /// Surrender the traded quantity from the buffer, merging the drawn
    /// pieces into a single resource.
    pub fn remove_resource(
        &mut self,
        ctx: &mut Context,
        buf: &mut ResBuf,
        trade: &TradeInfo,
    ) -> Result<Resource> {
        tracing::debug!(
            policy = %self.name,
            commodity = %trade.commodity,
            qty = trade.qty,
            "sending material"
        );
        let slack = buf.quantity() * 1e-12;
        let mut manifest = buf.pop_qty_slack(trade.qty, slack, ctx.resource_ids())?;
        if manifest.is_empty() {
            return Err(Error::Value(format!(
                "no material available for a trade of {}",
                trade.qty
            )));
        }
        let mut merged = manifest.remove(0);
        for mut piece in manifest {
            merged.absorb(&mut piece)?;
        }
        Ok(merged)
    }
}
