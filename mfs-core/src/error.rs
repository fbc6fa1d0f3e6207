use thiserror::Error;

/// The behavioral error kinds shared across the workspace.
///
/// The variants deliberately mirror how callers are expected to react rather
/// than where the error came from: `Value` and `Key` are recoverable and
/// propagate to the caller, `State` indicates a lifecycle misuse, and `Io` is
/// surfaced from external collaborators such as recorder backends. Invariant
/// violations (broken conservation, tree cycles) are not represented here;
/// those are bugs and fail via assertions.
#[derive(Debug, Error)]
pub enum Error {
    /// A numeric constraint was violated: negative quantity, over-capacity
    /// push, extraction beyond what is present, invalid distribution
    /// parameter.
    #[error("value error: {0}")]
    Value(String),

    /// A lookup missed: unknown recipe or package, duplicate resource push,
    /// unregistered producer.
    #[error("key error: {0}")]
    Key(String),

    /// An invalid lifecycle transition: building an already-built agent,
    /// decommissioning before build, dereferencing a freed agent id.
    #[error("state error: {0}")]
    State(String),

    /// A failure surfaced from an external collaborator (backend, loader).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Attach the throwing agent's identity and the simulation time to the
    /// message, preserving the error kind. The kernel calls this on every
    /// error escaping an agent callback.
    pub fn in_agent(self, prototype: &str, spec: &str, id: u64, time: i32) -> Self {
        let tag = |msg: String| {
            format!("agent {prototype} (spec {spec}, id {id}) at t={time}: {msg}")
        };
        match self {
            Error::Value(msg) => Error::Value(tag(msg)),
            Error::Key(msg) => Error::Key(tag(msg)),
            Error::State(msg) => Error::State(tag(msg)),
            Error::Io(err) => Error::State(tag(err.to_string())),
        }
    }
}

/// Convenience alias used by all fallible operations in the workspace.
pub type Result<T> = std::result::Result<T, Error>;
