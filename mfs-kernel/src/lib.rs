#![warn(missing_docs)]
//! The simulation kernel.
//!
//! This crate orchestrates everything `mfs-core` models and `mfs-solver`
//! matches: the [`Context`](context::Context) every agent talks through, the
//! batching [`Recorder`](recorder::Recorder), the hierarchical agent graph,
//! the per-step resource exchange and trade execution, the supply/demand
//! growth machinery, the turn-key buy/sell policies, and the
//! [`Simulation`](driver::Simulation) time driver that sequences a time step.
//!
//! Scheduling is single-threaded and cooperative: the driver owns the only
//! call stack during a time step, and every agent callback returns before the
//! next begins. Determinism comes from insertion-ordered registries and a
//! context-scoped, seeded RNG.

pub mod agent;
pub mod builder;
pub mod commodity;
pub mod context;
pub mod driver;
pub mod exchange;
pub mod policy;
pub mod random;
pub mod recorder;
pub mod supply_demand;
pub mod timeseries;
pub mod trader;
