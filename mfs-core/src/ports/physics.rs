use crate::models::Composition;

/// Radioactive decay dynamics, supplied from outside the kernel.
///
/// The kernel treats decay as a pure composition transform: quantity is
/// untouched and no bookkeeping happens here. Agents that hold materials
/// across time apply this through
/// [`Material::apply_decay`](crate::models::Material::apply_decay) at the
/// cadence configured by the simulation's decay interval.
pub trait DecayDynamics {
    /// The composition after `dt` time steps of decay.
    fn decay(&self, comp: &Composition, dt: i32) -> Composition;
}

/// A decay implementation that leaves compositions untouched, for
/// simulations that opt out of decay entirely.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDecay;

impl DecayDynamics for NoDecay {
    fn decay(&self, comp: &Composition, _dt: i32) -> Composition {
        comp.clone()
    }
}
