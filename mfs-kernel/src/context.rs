//! The process-scope registry every agent talks through.
//!
//! There is exactly one [`Context`] per simulation and it is passed
//! explicitly into every callback; nothing in the kernel reaches for global
//! state. The context owns the clock, the recipe/package tables, the
//! composition interning bank, the recorder, the RNG, and the agent
//! registries, and it is the only place agent tree edges are mutated.

use crate::agent::{AgentKind, AgentMeta};
use crate::random::SimRng;
use crate::recorder::{DatumBuilder, Recorder};
use mfs_core::models::{
    AgentId, CompId, CompPtr, ObjId, Package, FillStrategy, Resource, ResourceIds, TransId,
};
use mfs_core::ports::DecayDynamics;
use mfs_core::{Error, Map, Result, Set};
use uuid::Uuid;

/// The pre-parsed simulation parameters handed in by the loader.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SimInfo {
    /// Human-readable simulation handle, recorded in the output.
    pub handle: String,
    /// Calendar year of time step 0.
    pub start_year: i32,
    /// Calendar month (1-12) of time step 0.
    pub start_month: u32,
    /// Number of time steps (months) to run.
    pub duration: i32,
    /// Cadence of decay application in time steps; non-positive disables.
    pub decay_interval: i32,
    /// RNG seed; also determines the simulation id.
    pub seed: u64,
}

impl Default for SimInfo {
    fn default() -> Self {
        Self {
            handle: "simulation".to_string(),
            start_year: 2000,
            start_month: 1,
            duration: 12,
            decay_interval: -1,
            seed: 20240101,
        }
    }
}

/// The single object threaded through the whole simulation.
pub struct Context {
    info: SimInfo,
    time: i32,
    recorder: Recorder,
    rng: SimRng,
    resource_ids: ResourceIds,

    recipes: Map<String, CompPtr>,
    packages: Map<String, Package>,
    comp_bank: mfs_core::models::CompBank,
    qualities: Map<String, i64>,
    resource_rows: Map<(ObjId, u64), i64>,
    next_resource_row: i64,
    next_trans: u64,
    next_agent: u64,

    agents: Map<AgentId, AgentMeta>,
    traders: Set<AgentId>,
    listeners: Set<AgentId>,
    decom_queue: Vec<AgentId>,
    build_queue: Vec<(String, Option<AgentId>)>,

    decay: Option<Box<dyn DecayDynamics>>,
}

impl Context {
    /// A fresh context for the given parameters. The `"unpackaged"` package
    /// is pre-registered.
    pub fn new(info: SimInfo) -> Self {
        let recorder = Recorder::new(info.seed);
        let rng = SimRng::from_seed(info.seed);
        let mut packages = Map::default();
        packages.insert(Package::unpackaged().name().to_string(), Package::unpackaged());
        Self {
            rng,
            recorder,
            info,
            time: 0,
            resource_ids: ResourceIds::new(),
            recipes: Map::default(),
            packages,
            comp_bank: mfs_core::models::CompBank::new(),
            qualities: Map::default(),
            resource_rows: Map::default(),
            next_resource_row: 1,
            next_trans: 1,
            next_agent: 1,
            agents: Map::default(),
            traders: Set::default(),
            listeners: Set::default(),
            decom_queue: Vec::new(),
            build_queue: Vec::new(),
            decay: None,
        }
    }

    /// The simulation parameters.
    pub fn info(&self) -> &SimInfo {
        &self.info
    }

    /// The current time step.
    pub fn time(&self) -> i32 {
        self.time
    }

    /// Advance the clock. Driver-only during a simulation; exposed so test
    /// harnesses can step a bare context.
    pub fn set_time(&mut self, time: i32) {
        self.time = time;
    }

    /// The simulation id stamped on all output.
    pub fn sim_id(&self) -> Uuid {
        self.recorder.sim_id()
    }

    /// The context-scoped RNG.
    pub fn rng(&mut self) -> &mut SimRng {
        &mut self.rng
    }

    /// The resource object-id sequence.
    pub fn resource_ids(&mut self) -> &mut ResourceIds {
        &mut self.resource_ids
    }

    /// Both mutable halves needed by packaging operations.
    pub fn ids_and_rng(&mut self) -> (&mut ResourceIds, &mut SimRng) {
        (&mut self.resource_ids, &mut self.rng)
    }

    /// Install the decay dynamics port.
    pub fn set_decay(&mut self, decay: Box<dyn DecayDynamics>) {
        self.decay = Some(decay);
    }

    /// The decay dynamics, when installed and enabled for this simulation.
    pub fn decay(&self) -> Option<&dyn DecayDynamics> {
        if self.info.decay_interval > 0 {
            self.decay.as_deref()
        } else {
            None
        }
    }

    pub(crate) fn recorder_mut(&mut self) -> &mut Recorder {
        &mut self.recorder
    }

    /// Start a new output datum. The simulation id column is pre-filled;
    /// tables that carry time or agent columns add them explicitly.
    pub fn new_datum(&mut self, title: impl Into<String>) -> DatumBuilder<'_> {
        self.recorder.new_datum(title)
    }

    /// Fresh transaction id.
    pub fn next_trans_id(&mut self) -> TransId {
        let id = TransId(self.next_trans);
        self.next_trans += 1;
        id
    }

    // --- recipes, packages, compositions -------------------------------

    /// Register a named recipe. Re-registration under the same name is a key
    /// error.
    pub fn add_recipe(&mut self, name: impl Into<String>, comp: CompPtr) -> Result<()> {
        let name = name.into();
        if self.recipes.contains_key(&name) {
            return Err(Error::Key(format!("recipe '{name}' already registered")));
        }
        self.intern_comp(&comp);
        self.recipes.insert(name, comp);
        Ok(())
    }

    /// Look up a recipe by name.
    pub fn get_recipe(&self, name: &str) -> Result<CompPtr> {
        self.recipes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Key(format!("unknown recipe '{name}'")))
    }

    /// Register a package definition. Names are unique and `"unpackaged"`
    /// cannot be replaced.
    pub fn add_package(
        &mut self,
        name: impl Into<String>,
        fill_min: f64,
        fill_max: f64,
        strategy: FillStrategy,
    ) -> Result<()> {
        let name = name.into();
        if self.packages.contains_key(&name) {
            return Err(Error::Key(format!("package '{name}' already registered")));
        }
        let package = Package::new(name.clone(), fill_min, fill_max, strategy)?;
        self.packages.insert(name, package);
        Ok(())
    }

    /// Look up a package by name.
    pub fn get_package(&self, name: &str) -> Result<&Package> {
        self.packages
            .get(name)
            .ok_or_else(|| Error::Key(format!("unknown package '{name}'")))
    }

    /// Intern a composition, recording its `Compositions` rows the first
    /// time it is seen.
    pub fn intern_comp(&mut self, comp: &CompPtr) -> CompId {
        let (id, is_new) = self.comp_bank.intern(comp);
        if is_new {
            for (nuc, frac) in comp.iter() {
                // Best effort: a schema mismatch here is a kernel bug, not
                // an agent error.
                let _ = self
                    .recorder
                    .new_datum("Compositions")
                    .add_val("QualId", id.0 as i64)
                    .add_val("NucId", i64::from(nuc))
                    .add_val("Mass", frac)
                    .record();
            }
        }
        id
    }

    fn quality_id(&mut self, quality: &str) -> i64 {
        let next = self.qualities.len() as i64 + 1;
        *self.qualities.entry(quality.to_string()).or_insert(next)
    }

    /// Record a resource state into the `Resources` table, returning the row
    /// id. Re-recording the same object state reuses the existing row.
    pub fn record_resource(&mut self, resource: &Resource) -> i64 {
        let key = (resource.obj_id(), resource.state_id());
        if let Some(&row) = self.resource_rows.get(&key) {
            return row;
        }
        let row = self.next_resource_row;
        self.next_resource_row += 1;
        self.resource_rows.insert(key, row);

        let quality = match resource {
            Resource::Material(m) => self.intern_comp(m.comp()).0 as i64,
            Resource::Product(p) => self.quality_id(p.quality()),
        };
        let (parent1, parent2) = resource.parents();
        let time = self.time;
        let _ = self
            .recorder
            .new_datum("Resources")
            .add_val("ResourceId", row)
            .add_val("ObjId", resource.obj_id().0 as i64)
            .add_val("Type", resource.kind().to_string())
            .add_val("TimeCreated", time)
            .add_val("Quantity", resource.quantity())
            .add_val("Units", resource.units().to_string())
            .add_val("Quality", quality)
            .add_val("Parent1", parent1 as i64)
            .add_val("Parent2", parent2 as i64)
            .record();
        row
    }

    // --- agent registry and tree ---------------------------------------

    /// Allocate an id and registry row for a new, not-yet-built agent.
    pub fn new_agent(
        &mut self,
        kind: AgentKind,
        prototype: impl Into<String>,
        spec: impl Into<String>,
        lifetime: i32,
    ) -> AgentId {
        let id = AgentId(self.next_agent);
        self.next_agent += 1;
        self.agents.insert(
            id,
            AgentMeta {
                prototype: prototype.into(),
                spec: spec.into(),
                kind,
                parent: None,
                children: Vec::new(),
                enter_time: -1,
                lifetime,
                built: false,
            },
        );
        id
    }

    /// The registry row for a live agent.
    pub fn agent(&self, id: AgentId) -> Option<&AgentMeta> {
        self.agents.get(&id)
    }

    /// All live agent ids, in registration order.
    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents.keys().copied().collect()
    }

    /// Number of live agents.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Link an agent into the tree and mark it entered.
    ///
    /// Fails when the agent is unknown or already built, when the parent is
    /// missing or of a later kind in the containment order, or when the link
    /// would create a cycle.
    pub fn build_agent(&mut self, id: AgentId, parent: Option<AgentId>) -> Result<()> {
        let meta = self
            .agents
            .get(&id)
            .ok_or_else(|| Error::State(format!("cannot build unknown agent {id}")))?;
        if meta.built {
            return Err(Error::State(format!("agent {id} is already built")));
        }
        let kind_rank = meta.kind.rank();

        if let Some(pid) = parent {
            if pid == id {
                return Err(Error::State("agent cannot parent itself".to_string()));
            }
            if self.in_chain(id, pid) {
                return Err(Error::State(format!(
                    "building {id} under {pid} would create a cycle"
                )));
            }
            let pmeta = self
                .agents
                .get(&pid)
                .ok_or_else(|| Error::State(format!("parent agent {pid} is not live")))?;
            if pmeta.kind.rank() > kind_rank {
                return Err(Error::State(format!(
                    "a {} cannot contain a {}",
                    pmeta.kind,
                    meta.kind
                )));
            }
        }

        let time = self.time;
        let meta = self.agents.get_mut(&id).expect("checked above");
        meta.parent = parent;
        meta.enter_time = time;
        meta.built = true;
        let (kind, spec, prototype, lifetime) = (
            meta.kind,
            meta.spec.clone(),
            meta.prototype.clone(),
            meta.lifetime,
        );
        if let Some(pid) = parent {
            self.agents
                .get_mut(&pid)
                .expect("checked above")
                .children
                .push(id);
        }

        tracing::debug!(agent = %id, prototype = %prototype, "agent entering the simulation");
        let _ = self
            .recorder
            .new_datum("AgentEntry")
            .add_val("AgentId", id.0 as i64)
            .add_val("Kind", kind.to_string())
            .add_val("Spec", spec)
            .add_val("Prototype", prototype)
            .add_val("ParentId", parent.map_or(-1, |p| p.0 as i64))
            .add_val("Lifetime", lifetime)
            .add_val("EnterTime", time)
            .record();
        Ok(())
    }

    /// Unlink an agent and drop it from every registry.
    ///
    /// Children are orphaned (their parent becomes `None`), not removed.
    pub fn decommission_agent(&mut self, id: AgentId) -> Result<()> {
        let meta = self
            .agents
            .get(&id)
            .ok_or_else(|| Error::State(format!("cannot decommission unknown agent {id}")))?;
        if !meta.built {
            return Err(Error::State(format!(
                "agent {id} cannot be decommissioned before build"
            )));
        }
        let parent = meta.parent;
        let children = meta.children.clone();

        if let Some(pid) = parent {
            if let Some(pmeta) = self.agents.get_mut(&pid) {
                pmeta.children.retain(|&c| c != id);
            }
        }
        for child in children {
            if let Some(cmeta) = self.agents.get_mut(&child) {
                cmeta.parent = None;
            }
        }
        self.traders.shift_remove(&id);
        self.listeners.shift_remove(&id);
        self.decom_queue.retain(|&d| d != id);
        self.agents.shift_remove(&id);

        let time = self.time;
        tracing::debug!(agent = %id, "agent exiting the simulation");
        let _ = self
            .recorder
            .new_datum("AgentExit")
            .add_val("AgentId", id.0 as i64)
            .add_val("ExitTime", time)
            .record();
        Ok(())
    }

    /// Walk ancestors of `id`, returning the `layer`-th nearest of the given
    /// kind.
    ///
    /// `layer = 1` is the nearest matching ancestor, `layer = -1` the
    /// farthest (root-most); `layer = 0` or `layer <= -2` is `None`, as is a
    /// missing match.
    pub fn ancestor_of_kind(&self, id: AgentId, kind: AgentKind, layer: i32) -> Option<AgentId> {
        if layer == 0 || layer <= -2 {
            return None;
        }
        let mut matches = Vec::new();
        let mut cursor = self.agents.get(&id)?.parent;
        while let Some(pid) = cursor {
            let meta = self.agents.get(&pid)?;
            if meta.kind == kind {
                matches.push(pid);
            }
            cursor = meta.parent;
        }
        if layer == -1 {
            matches.last().copied()
        } else {
            matches.get(layer as usize - 1).copied()
        }
    }

    /// True when `ancestor` is a strict ancestor of `descendant`.
    pub fn in_chain(&self, ancestor: AgentId, descendant: AgentId) -> bool {
        let mut cursor = self.agents.get(&descendant).and_then(|m| m.parent);
        while let Some(pid) = cursor {
            if pid == ancestor {
                return true;
            }
            cursor = self.agents.get(&pid).and_then(|m| m.parent);
        }
        false
    }

    // --- service registries --------------------------------------------

    /// Register an agent as a trader. Idempotent.
    pub fn register_trader(&mut self, id: AgentId) {
        self.traders.insert(id);
    }

    /// Remove an agent from the trader registry.
    pub fn unregister_trader(&mut self, id: AgentId) {
        self.traders.shift_remove(&id);
    }

    /// Snapshot of registered traders, in registration order.
    pub fn traders(&self) -> Vec<AgentId> {
        self.traders.iter().copied().collect()
    }

    /// Register an agent for tick/tock broadcasts. Idempotent. Takes effect
    /// from the next time step's snapshot.
    pub fn register_time_listener(&mut self, id: AgentId) {
        self.listeners.insert(id);
    }

    /// Remove an agent from the time-listener registry.
    pub fn unregister_time_listener(&mut self, id: AgentId) {
        self.listeners.shift_remove(&id);
    }

    /// Snapshot of time listeners, in registration order.
    pub fn time_listeners(&self) -> Vec<AgentId> {
        self.listeners.iter().copied().collect()
    }

    /// Queue an agent for decommissioning at the end of the current time
    /// step.
    pub fn sched_decom(&mut self, id: AgentId) {
        if !self.decom_queue.contains(&id) {
            self.decom_queue.push(id);
        }
    }

    /// Queue a prototype to be built under `parent` at the start of the
    /// next time step. This is how agents (growth institutions) initiate
    /// construction; the driver performs the build.
    pub fn sched_build(&mut self, prototype: impl Into<String>, parent: Option<AgentId>) {
        self.build_queue.push((prototype.into(), parent));
    }

    pub(crate) fn take_build_queue(&mut self) -> Vec<(String, Option<AgentId>)> {
        std::mem::take(&mut self.build_queue)
    }

    pub(crate) fn take_decom_queue(&mut self) -> Vec<AgentId> {
        std::mem::take(&mut self.decom_queue)
    }

    /// Drop the registry row of an agent whose build failed. No-op for built
    /// agents.
    pub(crate) fn discard_unbuilt(&mut self, id: AgentId) {
        if self.agents.get(&id).is_some_and(|m| !m.built) {
            self.agents.shift_remove(&id);
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("time", &self.time)
            .field("agents", &self.agents.len())
            .field("traders", &self.traders.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
