use crate::JsonBackend;
use mfs_core::models::{
    AgentId, Bid, BidPortfolio, CapacityConstraint, CompPtr, Commodity, Composition, Material,
    RequestBook, RequestPortfolio, ResBuf, Resource,
};
use mfs_core::Result;
use mfs_kernel::agent::{Agent, AgentKind};
use mfs_kernel::context::{Context, SimInfo};
use mfs_kernel::driver::{Prototype, Simulation};
use mfs_kernel::policy::BuyPolicy;
use mfs_kernel::timeseries::record_time_series;
use mfs_kernel::trader::{TradeInfo, Trader};
use std::io::Write;
use std::sync::Arc;

/// Parameters of the built-in source/sink scenario.
#[derive(clap::Args)]
pub struct ScenarioArgs {
    /// Simulation handle recorded in the output
    #[arg(long, default_value = "source-sink")]
    pub handle: String,

    /// Number of time steps (months)
    #[arg(short, long, default_value_t = 12)]
    pub duration: i32,

    /// RNG seed
    #[arg(long, default_value_t = 20240101)]
    pub seed: u64,

    /// Source production capacity per step, kg
    #[arg(long, default_value_t = 100.0)]
    pub throughput: f64,

    /// Sink inventory capacity, kg
    #[arg(long, default_value_t = 200.0)]
    pub inventory_max: f64,
}

/// A region or institution with no behavior of its own.
struct Inert;
impl Agent for Inert {}

/// Mints low-enriched uranium on demand, up to a per-step throughput.
struct SourceFacility {
    id: AgentId,
    commod: Commodity,
    recipe: CompPtr,
    throughput: f64,
    produced: f64,
}

impl Agent for SourceFacility {
    fn enter_notify(&mut self, ctx: &mut Context) {
        ctx.register_trader(self.id);
        ctx.register_time_listener(self.id);
    }

    fn tock(&mut self, ctx: &mut Context) {
        record_time_series(ctx, "Production", self.id, self.produced);
    }

    fn trader(&mut self) -> Option<&mut dyn Trader> {
        Some(self)
    }
}

impl Trader for SourceFacility {
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
            let _ = port.add_bid(Bid::new(rid, Resource::Material(offer)));
        }
        if port.is_empty() {
            Vec::new()
        } else {
            vec![port]
        }
    }

    fn remove_resource(&mut self, ctx: &mut Context, trade: &TradeInfo) -> Result<Resource> {
        self.produced += trade.qty;
        Ok(Resource::Material(Material::new(
            ctx.resource_ids(),
            trade.qty,
            self.recipe.clone(),
        )?))
    }
}

/// Accumulates material through a buy policy until its inventory is full.
struct SinkFacility {
    id: AgentId,
    policy: BuyPolicy,
    inventory: ResBuf,
}

impl Agent for SinkFacility {
    fn enter_notify(&mut self, ctx: &mut Context) {
        ctx.register_trader(self.id);
        ctx.register_time_listener(self.id);
    }

    fn tock(&mut self, ctx: &mut Context) {
        record_time_series(ctx, "Inventory", self.id, self.inventory.quantity());
    }

    fn trader(&mut self) -> Option<&mut dyn Trader> {
        Some(self)
    }
}

impl Trader for SinkFacility {
    fn get_requests(&mut self, ctx: &mut Context) -> Vec<RequestPortfolio> {
        self.policy.get_requests(ctx, &self.inventory)
    }

    fn accept_trades(&mut self, ctx: &mut Context, deliveries: Vec<(TradeInfo, Resource)>) {
        self.policy.accept_trades(ctx, &mut self.inventory, deliveries)
    }
}

impl ScenarioArgs {
    /// Assemble the scenario: one region, one institution, a source and a
    /// policy-driven sink trading natural uranium.
    pub fn build(self, output: Box<dyn Write>) -> anyhow::Result<Simulation> {
        let mut sim = Simulation::new(SimInfo {
            handle: self.handle.clone(),
            duration: self.duration,
            seed: self.seed,
            ..SimInfo::default()
        });
        sim.add_backend(Box::new(JsonBackend::new(output)));

        let recipe = Arc::new(Composition::from_mass([
            (92235, 0.007),
            (92238, 0.993),
        ])?);
        sim.context_mut().add_recipe("natl_u", Arc::clone(&recipe))?;

        let throughput = self.throughput;
        sim.register_spec(
            ":mfsim:Inert",
            Box::new(|_ctx, _id| Box::new(Inert)),
        )?;
        sim.register_spec(
            ":mfsim:Source",
            Box::new(move |ctx, id| {
                // The recipe table is the source of truth for isotopics.
                let recipe = ctx
                    .get_recipe("natl_u")
                    .expect("recipe registered at setup");
                Box::new(SourceFacility {
                    id,
                    commod: "natl_u".into(),
                    recipe,
                    throughput,
                    produced: 0.0,
                })
            }),
        )?;

        let inventory_max = self.inventory_max;
        sim.register_spec(
            ":mfsim:Sink",
            Box::new(move |_ctx, id| {
                Box::new(SinkFacility {
                    id,
                    policy: BuyPolicy::new(id, "stock").add_commodity("natl_u", None, 0.0),
                    inventory: ResBuf::with_capacity(inventory_max),
                })
            }),
        )?;

        for (name, spec, kind) in [
            ("region", ":mfsim:Inert", AgentKind::Region),
            ("utility", ":mfsim:Inert", AgentKind::Institution),
            ("mine", ":mfsim:Source", AgentKind::Facility),
            ("stockpile", ":mfsim:Sink", AgentKind::Facility),
        ] {
            sim.register_prototype(
                name,
                Prototype {
                    spec: spec.to_string(),
                    kind,
                    lifetime: -1,
                },
            )?;
        }
        sim.schedule_build(0, "region", None, 1);
        sim.schedule_build(0, "utility", Some("region"), 1);
        sim.schedule_build(0, "mine", Some("utility"), 1);
        sim.schedule_build(0, "stockpile", Some("utility"), 1);

        Ok(sim)
    }
}
