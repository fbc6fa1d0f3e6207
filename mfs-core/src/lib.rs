#![warn(missing_docs)]
//! Domain models and ports for the material flow simulation kernel.
//!
//! This crate is the bottom of the workspace: it defines the resource types
//! that get transacted, the portfolio types that traders emit each time step,
//! and the interface traits ("ports") the kernel uses to talk to external
//! collaborators without knowing their implementations.

/// Core domain models.
///
/// The models in this module are primarily data structures with minimal
/// coupling to the rest of the system: resources and their compositions,
/// buffers, exchange portfolios, recorder datums, and demand curves. They
/// carry their own validation but defer orchestration to `mfs-kernel`.
pub mod models;

/// Interface traits for external collaborators.
///
/// These traits define the contract between the simulation kernel and the
/// pieces deliberately left outside of it: output sinks for recorded data and
/// the domain physics agents may consult. Implementations can be swapped
/// without touching the core.
pub mod ports;

mod error;
pub use error::{Error, Result};

// We use non-std collections for their ordering semantics: iteration order is
// insertion order, which keeps repeated runs byte-identical.
/// Deterministic ordered map used throughout the workspace.
pub type Map<K, V> = indexmap::IndexMap<K, V, rustc_hash::FxBuildHasher>;
/// Deterministic ordered set used throughout the workspace.
pub type Set<T> = indexmap::IndexSet<T, rustc_hash::FxBuildHasher>;
