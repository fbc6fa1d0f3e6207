//! Demand-curve-driven capacity growth: an institution compares a demand
//! curve against its built capacity each step and orders new facilities
//! through the building manager.

use mfs_core::models::{AgentId, SymFunction, Value};
use mfs_kernel::agent::{Agent, AgentKind};
use mfs_kernel::builder::{BuildingManager, ProducerOption};
use mfs_kernel::commodity::{CommodityProducer, CommodityProducerManager};
use mfs_kernel::context::{Context, SimInfo};
use mfs_kernel::driver::{Prototype, Simulation};
use mfs_kernel::recorder::{MemBackend, MemHandle};
use mfs_kernel::supply_demand::SupplyDemandManager;
use mfs_kernel::timeseries::record_time_series;

const PLANT_CAPACITY: f64 = 3.0;
const PLANT_COST: f64 = 1.0;

/// A power plant; its production capacity is bookkept by its institution.
struct Plant;
impl Agent for Plant {}

/// Orders plants whenever the demand curve outruns built capacity.
struct GrowthInstitution {
    id: AgentId,
    sdm: SupplyDemandManager,
    builder: BuildingManager,
    /// Capacity of plants built or already ordered.
    planned: f64,
}

impl GrowthInstitution {
    fn new(id: AgentId) -> Self {
        let mut sdm = SupplyDemandManager::new();
        sdm.register_commodity("power", SymFunction::linear(2.0, 5.0).unwrap())
            .unwrap();
        sdm.register_manager(CommodityProducerManager::new());
        let mut builder = BuildingManager::new();
        builder.register_builder(id).unwrap();
        Self {
            id,
            sdm,
            builder,
            planned: 0.0,
        }
    }
}

impl Agent for GrowthInstitution {
    fn enter_notify(&mut self, ctx: &mut Context) {
        ctx.register_time_listener(self.id);
    }

    fn tock(&mut self, ctx: &mut Context) {
        let commod = "power".into();
        let unmet = self.sdm.demand(&commod, ctx.time()) - self.planned;
        record_time_series(ctx, "UnmetDemand", self.id, unmet.max(0.0));
        if unmet <= 0.0 {
            return;
        }
        let options = [ProducerOption {
            builder: self.id,
            prototype: "plant".to_string(),
            capacity: PLANT_CAPACITY,
            cost: PLANT_COST,
        }];
        let orders = self
            .builder
            .make_build_decision(&options, unmet)
            .expect("plant option is always buildable");
        for order in orders {
            for _ in 0..order.count {
                ctx.sched_build(&order.prototype, Some(order.builder));
                self.planned += PLANT_CAPACITY;
            }
            // Track the ordered plants as producers of the commodity.
            let manager = &mut self.sdm.managers_mut()[0];
            let mut producer = CommodityProducer::new(AgentId(u64::MAX - manager.len() as u64));
            producer.add_commodity("power", PLANT_CAPACITY, PLANT_COST);
            manager.register_producer(producer).unwrap();
        }
    }
}

fn growth_sim(duration: i32) -> (Simulation, MemHandle) {
    let mut sim = Simulation::new(SimInfo {
        duration,
        ..SimInfo::default()
    });
    let (backend, rows) = MemBackend::new();
    sim.add_backend(Box::new(backend));

    sim.register_spec(
        ":test:GrowthInst",
        Box::new(|_ctx, id| Box::new(GrowthInstitution::new(id))),
    )
    .unwrap();
    sim.register_spec(":test:Plant", Box::new(|_ctx, _id| Box::new(Plant)))
        .unwrap();
    sim.register_prototype(
        "grower",
        Prototype {
            spec: ":test:GrowthInst".to_string(),
            kind: AgentKind::Institution,
            lifetime: -1,
        },
    )
    .unwrap();
    sim.register_prototype(
        "plant",
        Prototype {
            spec: ":test:Plant".to_string(),
            kind: AgentKind::Facility,
            lifetime: -1,
        },
    )
    .unwrap();
    sim.schedule_build(0, "grower", None, 1);
    (sim, rows)
}

#[test]
fn capacity_tracks_the_demand_curve() {
    // Demand 2t + 5: orders land one step after the shortfall appears, so
    // by t=4 the institution has built 2 + 1 + 0 + 1 = 4 plants.
    let (mut sim, _rows) = growth_sim(5);
    sim.run().unwrap();

    let inst = sim
        .context()
        .agent_ids()
        .into_iter()
        .find(|&id| sim.context().agent(id).unwrap().kind == AgentKind::Institution)
        .unwrap();
    let children = &sim.context().agent(inst).unwrap().children;
    assert_eq!(children.len(), 4);
    for &child in children {
        assert_eq!(sim.context().agent(child).unwrap().prototype, "plant");
    }
}

#[test]
fn builds_enter_on_the_following_step() {
    let (mut sim, rows) = growth_sim(2);
    sim.run().unwrap();

    // Demand at t=0 is 5 -> two plants ordered on the first tock, built at
    // t=1 per the entry phase.
    let entries = rows.rows("AgentEntry");
    let plant_entries: Vec<_> = entries
        .iter()
        .filter(|d| d.get("Prototype") == Some(&Value::Str("plant".to_string())))
        .collect();
    assert_eq!(plant_entries.len(), 2);
    for entry in plant_entries {
        assert_eq!(entry.get("EnterTime"), Some(&Value::Int(1)));
    }
}

#[test]
fn unmet_demand_series_drops_to_zero() {
    let (mut sim, rows) = growth_sim(3);
    sim.run().unwrap();

    let series = rows.rows("TimeSeriesUnmetDemand");
    assert_eq!(series.len(), 3);
    // First step sees the initial shortfall; capacity then keeps pace with
    // the curve (demand 7 at t=1 against 6 planned leaves 1, then covered).
    assert_eq!(series[0].get("Value"), Some(&Value::Double(5.0)));
    assert_eq!(series[2].get("Value"), Some(&Value::Double(0.0)));
}
