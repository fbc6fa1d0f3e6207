//! Exchange-level scenarios run through the full driver: exclusive bids and
//! mutual-request groups.

mod common;

use common::{Sink, Source};
use mfs_core::models::{
    AgentId, BidPortfolio, Composition, Material, Request, RequestBook, RequestPortfolio, ResBuf,
    Resource, Value,
};
use mfs_core::Result;
use mfs_kernel::agent::{Agent, AgentKind};
use mfs_kernel::context::{Context, SimInfo};
use mfs_kernel::driver::{Prototype, Simulation};
use mfs_kernel::policy::SellPolicy;
use mfs_kernel::recorder::{MemBackend, MemHandle};
use mfs_kernel::trader::{TradeInfo, Trader};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

fn base_sim(duration: i32) -> (Simulation, MemHandle) {
    let mut sim = Simulation::new(SimInfo {
        duration,
        ..SimInfo::default()
    });
    let (backend, rows) = MemBackend::new();
    sim.add_backend(Box::new(backend));
    (sim, rows)
}

/// Exclusive bids, two requesters: the higher-preference sink takes the full
/// 50 kg, the other gets nothing, and no split happens.
#[test]
fn exclusive_bid_goes_to_the_preferred_requester() {
    let (mut sim, rows) = base_sim(1);
    let recipe = Arc::new(Composition::from_mass([(92235, 1.0)]).unwrap());

    let produced = Rc::new(Cell::new(0.0));
    let inv1 = Rc::new(RefCell::new(ResBuf::with_capacity(1000.0)));
    let inv2 = Rc::new(RefCell::new(ResBuf::with_capacity(1000.0)));

    let produced_handle = Rc::clone(&produced);
    let recipe_handle = Arc::clone(&recipe);
    sim.register_spec(
        ":test:ExclusiveSource",
        Box::new(move |_ctx, id| {
            Box::new(Source {
                id,
                commod: "c".into(),
                recipe: recipe_handle.clone(),
                throughput: 50.0,
                exclusive: true,
                produced: Rc::clone(&produced_handle),
            })
        }),
    )
    .unwrap();

    for (spec, pref, inv) in [
        (":test:SinkHigh", 2.0, Rc::clone(&inv1)),
        (":test:SinkLow", 1.0, Rc::clone(&inv2)),
    ] {
        sim.register_spec(
            spec,
            Box::new(move |_ctx, id| {
                Box::new(Sink {
                    id,
                    commod: "c".into(),
                    throughput: 50.0,
                    preference: pref,
                    exclusive: false,
                    inventory: Rc::clone(&inv),
                })
            }),
        )
        .unwrap();
    }

    for (name, spec) in [
        ("a", ":test:ExclusiveSource"),
        ("r1", ":test:SinkHigh"),
        ("r2", ":test:SinkLow"),
    ] {
        sim.register_prototype(
            name,
            Prototype {
                spec: spec.to_string(),
                kind: AgentKind::Facility,
                lifetime: -1,
            },
        )
        .unwrap();
        sim.schedule_build(0, name, None, 1);
    }

    sim.run().unwrap();

    assert_eq!(rows.count("Transactions"), 1);
    approx::assert_relative_eq!(inv1.borrow().quantity(), 50.0);
    approx::assert_relative_eq!(inv2.borrow().quantity(), 0.0);
    approx::assert_relative_eq!(produced.get(), 50.0);
}

/// A requester whose two requests form one mutual group.
struct CliqueSink {
    id: AgentId,
    needs: Vec<f64>,
    inventory: Rc<RefCell<ResBuf>>,
}

impl Agent for CliqueSink {
    fn enter_notify(&mut self, ctx: &mut Context) {
        ctx.register_trader(self.id);
    }
    fn trader(&mut self) -> Option<&mut dyn Trader> {
        Some(self)
    }
}

impl Trader for CliqueSink {
    fn get_requests(&mut self, ctx: &mut Context) -> Vec<RequestPortfolio> {
        let mut port = RequestPortfolio::new(self.id);
        let mut members = Vec::new();
        for &need in &self.needs {
            let Ok(target) = Material::new(
                ctx.resource_ids(),
                need,
                Arc::new(Composition::vacuum()),
            ) else {
                continue;
            };
            if let Ok(idx) = port.add_request(Request::new("c", Resource::Material(target))) {
                members.push(idx);
            }
        }
        port.add_mutual_group(&members).unwrap();
        vec![port]
    }

    fn accept_trades(&mut self, _ctx: &mut Context, deliveries: Vec<(TradeInfo, Resource)>) {
        let mut inventory = self.inventory.borrow_mut();
        for (_, resource) in deliveries {
            inventory.push(resource).expect("delivery fits");
        }
    }
}

/// A storage facility selling whatever its buffer holds.
struct Storage {
    id: AgentId,
    policy: SellPolicy,
    buf: Rc<RefCell<ResBuf>>,
}

impl Agent for Storage {
    fn enter_notify(&mut self, ctx: &mut Context) {
        ctx.register_trader(self.id);
    }
    fn trader(&mut self) -> Option<&mut dyn Trader> {
        Some(self)
    }
}

impl Trader for Storage {
    fn get_bids(&mut self, ctx: &mut Context, book: &RequestBook<'_>) -> Vec<BidPortfolio> {
        let buf = self.buf.borrow();
        self.policy.get_bids(ctx, &buf, book)
    }

    fn remove_resource(&mut self, ctx: &mut Context, trade: &TradeInfo) -> Result<Resource> {
        let mut buf = self.buf.borrow_mut();
        self.policy.remove_resource(ctx, &mut buf, trade)
    }
}

/// Mutual-request group against short supply: all-or-nothing means nothing,
/// and the supplier keeps its 40 kg.
#[test]
fn unsatisfiable_clique_trades_nothing() {
    let (mut sim, rows) = base_sim(1);
    let recipe = Arc::new(Composition::from_mass([(92235, 1.0)]).unwrap());

    let supply = Rc::new(RefCell::new(ResBuf::new()));
    let inventory = Rc::new(RefCell::new(ResBuf::new()));

    let supply_handle = Rc::clone(&supply);
    let recipe_handle = Arc::clone(&recipe);
    sim.register_spec(
        ":test:Storage",
        Box::new(move |ctx, id| {
            // Seed the buffer with the supplier's 40 kg on construction.
            let m = Material::new(ctx.resource_ids(), 40.0, recipe_handle.clone()).unwrap();
            supply_handle
                .borrow_mut()
                .push(Resource::Material(m))
                .unwrap();
            Box::new(Storage {
                id,
                policy: SellPolicy::new(id, "sell").add_commodity("c"),
                buf: Rc::clone(&supply_handle),
            })
        }),
    )
    .unwrap();

    let inventory_handle = Rc::clone(&inventory);
    sim.register_spec(
        ":test:CliqueSink",
        Box::new(move |_ctx, id| {
            Box::new(CliqueSink {
                id,
                needs: vec![30.0, 30.0],
                inventory: Rc::clone(&inventory_handle),
            })
        }),
    )
    .unwrap();

    for (name, spec) in [("store", ":test:Storage"), ("want", ":test:CliqueSink")] {
        sim.register_prototype(
            name,
            Prototype {
                spec: spec.to_string(),
                kind: AgentKind::Facility,
                lifetime: -1,
            },
        )
        .unwrap();
        sim.schedule_build(0, name, None, 1);
    }

    sim.run().unwrap();

    assert_eq!(rows.count("Transactions"), 0);
    approx::assert_relative_eq!(supply.borrow().quantity(), 40.0);
    approx::assert_relative_eq!(inventory.borrow().quantity(), 0.0);
}

/// The same clique with sufficient supply commits atomically.
#[test]
fn satisfiable_clique_fills_both_requests() {
    let (mut sim, rows) = base_sim(1);
    let recipe = Arc::new(Composition::from_mass([(92235, 1.0)]).unwrap());

    let supply = Rc::new(RefCell::new(ResBuf::new()));
    let inventory = Rc::new(RefCell::new(ResBuf::new()));

    let supply_handle = Rc::clone(&supply);
    sim.register_spec(
        ":test:Storage",
        Box::new(move |ctx, id| {
            let m = Material::new(ctx.resource_ids(), 80.0, recipe.clone()).unwrap();
            supply_handle
                .borrow_mut()
                .push(Resource::Material(m))
                .unwrap();
            Box::new(Storage {
                id,
                policy: SellPolicy::new(id, "sell").add_commodity("c"),
                buf: Rc::clone(&supply_handle),
            })
        }),
    )
    .unwrap();

    let inventory_handle = Rc::clone(&inventory);
    sim.register_spec(
        ":test:CliqueSink",
        Box::new(move |_ctx, id| {
            Box::new(CliqueSink {
                id,
                needs: vec![30.0, 30.0],
                inventory: Rc::clone(&inventory_handle),
            })
        }),
    )
    .unwrap();

    for (name, spec) in [("store", ":test:Storage"), ("want", ":test:CliqueSink")] {
        sim.register_prototype(
            name,
            Prototype {
                spec: spec.to_string(),
                kind: AgentKind::Facility,
                lifetime: -1,
            },
        )
        .unwrap();
        sim.schedule_build(0, name, None, 1);
    }

    sim.run().unwrap();

    assert_eq!(rows.count("Transactions"), 2);
    for row in rows.rows("TransactedResources") {
        match row.get("Quantity") {
            Some(Value::Double(qty)) => approx::assert_relative_eq!(*qty, 30.0, epsilon = 1e-6),
            other => panic!("unexpected quantity {other:?}"),
        }
    }
    approx::assert_relative_eq!(inventory.borrow().quantity(), 60.0, epsilon = 1e-6);
    approx::assert_relative_eq!(supply.borrow().quantity(), 20.0, epsilon = 1e-6);
}
