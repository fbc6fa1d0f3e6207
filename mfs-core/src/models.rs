//! Core domain models.
//!
//! Everything here is deterministic and context-free: identity sequences are
//! passed in explicitly by the owner (the kernel's context), never pulled
//! from process-global state.

mod ids;
pub use ids::*;

mod composition;
pub use composition::*;

mod material;
pub use material::*;

mod product;
pub use product::*;

mod resource;
pub use resource::*;

mod package;
pub use package::*;

mod buffer;
pub use buffer::*;

mod datum;
pub use datum::*;

mod trade;
pub use trade::*;

mod function;
pub use function::*;
