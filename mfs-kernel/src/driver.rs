//! The time driver.
//!
//! [`Simulation`] owns the context, the agent arena, the agent factory, and
//! the solver stack, and runs the fixed per-step phase sequence:
//!
//! ```text
//! enter pending builds -> tick -> exchange -> tock -> lifetime checks ->
//! decommissions -> next step
//! ```
//!
//! All phase ordering guarantees live here: listener snapshots are taken at
//! the start of the step, every tick completes before the exchange, every
//! trade completes before any tock, and all tocks complete before any
//! decommission.

use crate::agent::{Agent, AgentArena, AgentKind};
use crate::context::{Context, SimInfo};
use crate::exchange;
use mfs_core::models::{AgentId, Commodity};
use mfs_core::ports::{Backend, DecayDynamics};
use mfs_core::{Error, Map, Result};
use mfs_solver::{ExchangeSolver, GreedyPreconditioner, GreedySolver, WeightOrder};

/// A named agent template.
#[derive(Clone, Debug)]
pub struct Prototype {
    /// The implementation spec string resolved through the factory.
    pub spec: String,
    /// The kind of agent this prototype instantiates.
    pub kind: AgentKind,
    /// Lifetime in time steps; -1 for indefinite.
    pub lifetime: i32,
}

/// Constructor for an agent implementation, registered per spec string.
pub type AgentCtor = Box<dyn Fn(&mut Context, AgentId) -> Box<dyn Agent>>;

/// The startup-registered factory mapping spec strings to constructors and
/// prototype names to templates. The kernel never loads code itself.
#[derive(Default)]
pub struct AgentFactory {
    ctors: Map<String, AgentCtor>,
    prototypes: Map<String, Prototype>,
}

impl AgentFactory {
    /// An empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under its spec string.
    pub fn register_spec(&mut self, spec: impl Into<String>, ctor: AgentCtor) -> Result<()> {
        let spec = spec.into();
        if self.ctors.contains_key(&spec) {
            return Err(Error::Key(format!("spec '{spec}' is already registered")));
        }
        self.ctors.insert(spec, ctor);
        Ok(())
    }

    /// Register a prototype template.
    pub fn register_prototype(
        &mut self,
        name: impl Into<String>,
        prototype: Prototype,
    ) -> Result<()> {
        let name = name.into();
        if self.prototypes.contains_key(&name) {
            return Err(Error::Key(format!(
                "prototype '{name}' is already registered"
            )));
        }
        self.prototypes.insert(name, prototype);
        Ok(())
    }

    /// The template registered under a prototype name.
    pub fn prototype(&self, name: &str) -> Result<&Prototype> {
        self.prototypes
            .get(name)
            .ok_or_else(|| Error::Key(format!("unknown prototype '{name}'")))
    }

    fn make(&self, ctx: &mut Context, name: &str) -> Result<(AgentId, Box<dyn Agent>)> {
        let prototype = self.prototype(name)?;
        let ctor = self
            .ctors
            .get(&prototype.spec)
            .ok_or_else(|| Error::Key(format!("unknown spec '{}'", prototype.spec)))?;
        let id = ctx.new_agent(prototype.kind, name, prototype.spec.clone(), prototype.lifetime);
        let agent = ctor(ctx, id);
        Ok((id, agent))
    }
}

/// One entry of the deployment schedule.
#[derive(Clone, Debug)]
pub struct DeployOrder {
    /// Time step at which to build.
    pub time: i32,
    /// Prototype to instantiate.
    pub prototype: String,
    /// Prototype name of the parent agent; the first live match is used.
    pub parent: Option<String>,
    /// Number of instances to build.
    pub count: u32,
}

/// The whole simulation: context, agents, solver stack, and the time loop.
pub struct Simulation {
    ctx: Context,
    arena: AgentArena,
    factory: AgentFactory,
    preconditioner: GreedyPreconditioner,
    solver: Box<dyn ExchangeSolver>,
    schedule: Vec<DeployOrder>,
}

impl Simulation {
    /// A simulation with the default greedy solver stack and no agents.
    pub fn new(info: SimInfo) -> Self {
        Self {
            ctx: Context::new(info),
            arena: AgentArena::new(),
            factory: AgentFactory::new(),
            preconditioner: GreedyPreconditioner::new(),
            solver: Box::new(GreedySolver::new()),
            schedule: Vec::new(),
        }
    }

    /// The simulation context.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Mutable access to the context, for setup and inspection.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    /// Register an output backend.
    pub fn add_backend(&mut self, backend: Box<dyn Backend>) {
        self.ctx.recorder_mut().register_backend(backend);
    }

    /// Change the recorder batch size.
    pub fn set_dump_count(&mut self, count: usize) {
        self.ctx.recorder_mut().set_dump_count(count);
    }

    /// Install the decay dynamics port.
    pub fn set_decay(&mut self, decay: Box<dyn DecayDynamics>) {
        self.ctx.set_decay(decay);
    }

    /// Supply commodity weights for the preconditioner.
    pub fn set_commod_weights(&mut self, weights: Map<Commodity, f64>, order: WeightOrder) {
        self.preconditioner = GreedyPreconditioner::with_weights(weights, order);
    }

    /// Swap the trade matcher.
    pub fn set_solver(&mut self, solver: Box<dyn ExchangeSolver>) {
        self.solver = solver;
    }

    /// Register an agent implementation under its spec string.
    pub fn register_spec(&mut self, spec: impl Into<String>, ctor: AgentCtor) -> Result<()> {
        self.factory.register_spec(spec, ctor)
    }

    /// Register a prototype template.
    pub fn register_prototype(
        &mut self,
        name: impl Into<String>,
        prototype: Prototype,
    ) -> Result<()> {
        self.factory.register_prototype(name, prototype)
    }

    /// Queue a deployment for the given time step.
    pub fn schedule_build(
        &mut self,
        time: i32,
        prototype: impl Into<String>,
        parent: Option<&str>,
        count: u32,
    ) {
        self.schedule.push(DeployOrder {
            time,
            prototype: prototype.into(),
            parent: parent.map(str::to_string),
            count,
        });
    }

    /// Instantiate and build a prototype immediately.
    pub fn spawn(&mut self, prototype: &str, parent: Option<AgentId>) -> Result<AgentId> {
        let (id, agent) = self.factory.make(&mut self.ctx, prototype)?;
        self.arena.insert(id, agent);
        if let Err(err) = self.ctx.build_agent(id, parent) {
            self.arena.remove(id);
            self.ctx.discard_unbuilt(id);
            return Err(err);
        }
        if let Some(mut agent) = self.arena.lend(id) {
            agent.enter_notify(&mut self.ctx);
            self.arena.give_back(id, agent);
        }
        Ok(id)
    }

    /// Run the configured number of time steps and close the recorder.
    pub fn run(&mut self) -> Result<()> {
        let info = self.ctx.info().clone();
        tracing::info!(
            handle = %info.handle,
            duration = info.duration,
            "beginning simulation"
        );
        let _ = self
            .ctx
            .new_datum("SimulationTimeInfo")
            .add_val("SimHandle", info.handle.as_str())
            .add_val("InitialYear", info.start_year)
            .add_val("InitialMonth", info.start_month as i32)
            .add_val("SimulationStart", 0i32)
            .add_val("Duration", info.duration)
            .record();

        for t in 0..info.duration {
            self.step(t)?;
        }

        let _ = self
            .ctx
            .new_datum("Finish")
            .add_val("EndTime", info.duration)
            .record();
        self.ctx.recorder_mut().close();
        tracing::info!(handle = %info.handle, "simulation complete");
        Ok(())
    }

    /// Run one full time step.
    pub fn step(&mut self, t: i32) -> Result<()> {
        self.ctx.set_time(t);
        tracing::debug!(time = t, "beginning time step");

        self.enter_pending(t)?;

        // Listener snapshot for the whole step: agents registered during
        // this step start listening at the next one.
        let listeners = self.ctx.time_listeners();

        for &id in &listeners {
            if !self.ctx.time_listeners().contains(&id) {
                continue;
            }
            if let Some(mut agent) = self.arena.lend(id) {
                agent.tick(&mut self.ctx);
                self.arena.give_back(id, agent);
            }
        }

        exchange::run_exchange(
            &mut self.ctx,
            &mut self.arena,
            &self.preconditioner,
            self.solver.as_ref(),
        );

        for &id in &listeners {
            if !self.ctx.time_listeners().contains(&id) {
                continue;
            }
            if let Some(mut agent) = self.arena.lend(id) {
                agent.tock(&mut self.ctx);
                self.arena.give_back(id, agent);
            }
        }

        self.check_lifetimes(t);
        self.process_decoms()?;
        Ok(())
    }

    /// Build every scheduled deployment due at or before `t`, then any
    /// builds agents queued through the context since the last step.
    fn enter_pending(&mut self, t: i32) -> Result<()> {
        let due: Vec<DeployOrder> = {
            let (due, rest): (Vec<_>, Vec<_>) =
                self.schedule.drain(..).partition(|o| o.time <= t);
            self.schedule = rest;
            due
        };
        for order in due {
            let parent = match &order.parent {
                Some(proto) => Some(self.find_by_prototype(proto)?),
                None => None,
            };
            for _ in 0..order.count {
                self.spawn(&order.prototype, parent)?;
            }
        }
        for (prototype, parent) in self.ctx.take_build_queue() {
            // A parent retired between scheduling and entry orphans the
            // build rather than failing the run.
            let parent = parent.filter(|&p| self.ctx.agent(p).is_some());
            self.spawn(&prototype, parent)?;
        }
        Ok(())
    }

    fn find_by_prototype(&self, prototype: &str) -> Result<AgentId> {
        self.ctx
            .agent_ids()
            .into_iter()
            .find(|&id| {
                self.ctx
                    .agent(id)
                    .is_some_and(|m| m.built && m.prototype == prototype)
            })
            .ok_or_else(|| Error::Key(format!("no live agent of prototype '{prototype}'")))
    }

    /// Institutions retire children whose lifetime has elapsed, subject to
    /// the child's consent. Agents with lifetime 0 are exempt.
    fn check_lifetimes(&mut self, t: i32) {
        for id in self.ctx.agent_ids() {
            let Some(meta) = self.ctx.agent(id) else {
                continue;
            };
            if meta.kind != AgentKind::Institution {
                continue;
            }
            for child in meta.children.clone() {
                let Some(cmeta) = self.ctx.agent(child) else {
                    continue;
                };
                if cmeta.lifetime <= 0 || t < cmeta.enter_time + cmeta.lifetime {
                    continue;
                }
                let consent = match self.arena.lend(child) {
                    Some(mut agent) => {
                        let consent = agent.check_decommission_condition(&mut self.ctx);
                        self.arena.give_back(child, agent);
                        consent
                    }
                    None => true,
                };
                if consent {
                    tracing::info!(agent = %child, time = t, "lifetime elapsed; scheduling decommission");
                    self.ctx.sched_decom(child);
                }
            }
        }
    }

    /// Drain the decommission queue, letting removals cascade.
    fn process_decoms(&mut self) -> Result<()> {
        loop {
            let queue = self.ctx.take_decom_queue();
            if queue.is_empty() {
                return Ok(());
            }
            for id in queue {
                let Some(meta) = self.ctx.agent(id) else {
                    continue;
                };
                if let Some(parent) = meta.parent {
                    if let Some(mut agent) = self.arena.lend(parent) {
                        agent.decom_notify(&mut self.ctx, id);
                        self.arena.give_back(parent, agent);
                    }
                }
                self.ctx.decommission_agent(id)?;
                self.arena.remove(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inert;
    impl Agent for Inert {}

    fn sim(duration: i32) -> Simulation {
        let mut sim = Simulation::new(SimInfo {
            duration,
            ..SimInfo::default()
        });
        sim.register_spec(":test:Inert", Box::new(|_, _| Box::new(Inert)))
            .unwrap();
        for (name, kind) in [
            ("reg", AgentKind::Region),
            ("inst", AgentKind::Institution),
            ("fac", AgentKind::Facility),
        ] {
            sim.register_prototype(
                name,
                Prototype {
                    spec: ":test:Inert".to_string(),
                    kind,
                    lifetime: -1,
                },
            )
            .unwrap();
        }
        sim
    }

    #[test]
    fn deploy_schedule_resolves_parents() {
        let mut sim = sim(3);
        sim.schedule_build(0, "reg", None, 1);
        sim.schedule_build(1, "inst", Some("reg"), 2);
        sim.run().unwrap();
        assert_eq!(sim.context().agent_count(), 3);
        // Both institutions hang off the region.
        let region = sim.context().agent_ids()[0];
        assert_eq!(sim.context().agent(region).unwrap().children.len(), 2);
    }

    #[test]
    fn unknown_prototype_is_an_error() {
        let mut sim = sim(2);
        sim.schedule_build(0, "nonesuch", None, 1);
        assert!(sim.run().is_err());
    }

    #[test]
    fn lifetime_rule_retires_facilities_under_institutions() {
        let mut sim = sim(5);
        sim.register_prototype(
            "shortfac",
            Prototype {
                spec: ":test:Inert".to_string(),
                kind: AgentKind::Facility,
                lifetime: 2,
            },
        )
        .unwrap();
        let reg = sim.spawn("reg", None).unwrap();
        let inst = sim.spawn("inst", Some(reg)).unwrap();
        let fac = sim.spawn("shortfac", Some(inst)).unwrap();

        sim.run().unwrap();
        // enter 0, lifetime 2: gone at the end of t=2.
        assert!(sim.context().agent(fac).is_none());
        assert!(sim.context().agent(inst).is_some());
    }

    #[test]
    fn zero_lifetime_agents_are_never_retired() {
        let mut sim = sim(4);
        sim.register_prototype(
            "zerofac",
            Prototype {
                spec: ":test:Inert".to_string(),
                kind: AgentKind::Facility,
                lifetime: 0,
            },
        )
        .unwrap();
        let reg = sim.spawn("reg", None).unwrap();
        let inst = sim.spawn("inst", Some(reg)).unwrap();
        let fac = sim.spawn("zerofac", Some(inst)).unwrap();
        sim.run().unwrap();
        assert!(sim.context().agent(fac).is_some());
    }
}
