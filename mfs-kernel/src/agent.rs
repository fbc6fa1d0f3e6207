//! Agent behavior and storage.
//!
//! An agent is two things: a row of metadata in the context's registry
//! (kind, prototype, tree edges, lifetime) and a behavior object implementing
//! [`Agent`]. The behaviors live in an [`AgentArena`] apart from the context,
//! so a callback can borrow its own state mutably while still being handed
//! `&mut Context`. Cross-references are always [`AgentId`]s; looking up a
//! decommissioned agent just returns `None`.

use crate::context::Context;
use crate::trader::Trader;
use mfs_core::models::AgentId;
use mfs_core::Map;

/// The agent kind, ordered root-most first.
///
/// The containment tree must be weakly decreasing in kind along any
/// root-to-leaf path: regions contain regions or institutions, institutions
/// contain institutions or facilities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum AgentKind {
    /// A geographic or organizational container; roots of the tree.
    Region,
    /// An owner/operator of facilities.
    Institution,
    /// A site where resources are produced, transformed, or consumed.
    Facility,
}

impl AgentKind {
    /// Position in the containment order; parents must not rank below
    /// children.
    pub fn rank(self) -> u8 {
        match self {
            AgentKind::Region => 0,
            AgentKind::Institution => 1,
            AgentKind::Facility => 2,
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Region => write!(f, "Region"),
            AgentKind::Institution => write!(f, "Institution"),
            AgentKind::Facility => write!(f, "Facility"),
        }
    }
}

/// The registry row for one agent.
#[derive(Clone, Debug)]
pub struct AgentMeta {
    /// The prototype this agent was instantiated from.
    pub prototype: String,
    /// The implementation spec string, e.g. `":agents:Source"`.
    pub spec: String,
    /// The agent kind.
    pub kind: AgentKind,
    /// Parent in the containment tree; `None` for roots and unbuilt agents.
    pub parent: Option<AgentId>,
    /// Children in build order.
    pub children: Vec<AgentId>,
    /// Time the agent entered the simulation; -1 until built.
    pub enter_time: i32,
    /// Operational lifetime in time steps; -1 for indefinite.
    pub lifetime: i32,
    /// Whether `build` has run.
    pub built: bool,
}

/// The behavior surface of an agent.
///
/// Every callback is synchronous and receives the context; the driver
/// guarantees no two callbacks run concurrently. All methods default to
/// no-ops so simple agents implement only what they use.
pub trait Agent {
    /// Called once when the agent enters the simulation, after it is linked
    /// into the tree. This is where traders and time listeners register.
    fn enter_notify(&mut self, _ctx: &mut Context) {}

    /// Called on a parent when one of its children is about to be
    /// decommissioned.
    fn decom_notify(&mut self, _ctx: &mut Context, _child: AgentId) {}

    /// Whether the agent consents to lifetime-driven decommissioning.
    fn check_decommission_condition(&mut self, _ctx: &mut Context) -> bool {
        true
    }

    /// First broadcast of a time step.
    fn tick(&mut self, _ctx: &mut Context) {}

    /// Last broadcast of a time step, after the exchange.
    fn tock(&mut self, _ctx: &mut Context) {}

    /// The trading surface, for agents that participate in the exchange.
    fn trader(&mut self) -> Option<&mut dyn Trader> {
        None
    }
}

/// Owns the behavior objects, keyed by agent id.
///
/// Behaviors are temporarily taken out of the arena while the driver runs a
/// callback on them ("lend"), then returned. A lend of a missing or already
/// lent agent yields `None` and the caller just skips it; that is the normal
/// fate of callbacks racing a decommission.
#[derive(Default)]
pub struct AgentArena {
    slots: Map<AgentId, Option<Box<dyn Agent>>>,
}

impl AgentArena {
    /// An empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly constructed behavior.
    pub fn insert(&mut self, id: AgentId, agent: Box<dyn Agent>) {
        self.slots.insert(id, Some(agent));
    }

    /// Take a behavior out for a callback.
    pub fn lend(&mut self, id: AgentId) -> Option<Box<dyn Agent>> {
        self.slots.get_mut(&id)?.take()
    }

    /// Return a lent behavior. If the agent was removed while lent, the
    /// behavior is dropped here.
    pub fn give_back(&mut self, id: AgentId, agent: Box<dyn Agent>) {
        if let Some(slot) = self.slots.get_mut(&id) {
            *slot = Some(agent);
        }
    }

    /// Drop an agent's behavior entirely.
    pub fn remove(&mut self, id: AgentId) {
        self.slots.shift_remove(&id);
    }

    /// Whether a behavior is stored (lent or not) under this id.
    pub fn contains(&self, id: AgentId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Number of stored behaviors.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
