use serde::{Deserialize, Serialize};

macro_rules! id_wrapper {
    ($name:ident, $inner:ty) => {
        /// A typed integer id. Cross-references between entities are always
        /// expressed with these, never with references into an arena, so a
        /// stale id resolves to `None` instead of dangling.
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }
    };
}

id_wrapper!(AgentId, u64);
id_wrapper!(ObjId, u64);
id_wrapper!(CompId, u64);
id_wrapper!(TransId, u64);

/// The allocator for resource object ids.
///
/// Owned by the simulation context and threaded explicitly into every
/// operation that mints a new resource object (extraction, splitting,
/// packaging). Object ids are never reused within a simulation.
#[derive(Debug, Default)]
pub struct ResourceIds {
    next: u64,
}

impl ResourceIds {
    /// Create a fresh sequence starting at object id 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Mint the next object id.
    pub fn next_obj(&mut self) -> ObjId {
        let id = self.next.max(1);
        self.next = id + 1;
        ObjId(id)
    }
}
