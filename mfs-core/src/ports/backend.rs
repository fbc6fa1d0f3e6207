use crate::models::Datum;
use crate::Result;

/// An output sink for recorded datums.
///
/// The recorder hands each full batch to every registered backend in
/// registration order, and a final partial batch on close. Backends may rely
/// on the recorder's schema discipline: all datums sharing a title have the
/// same field names and types within a run.
///
/// Errors returned from a backend are logged by the recorder and never abort
/// the simulation.
pub trait Backend {
    /// Ingest a batch of datums.
    fn notify(&mut self, batch: &[Datum]) -> Result<()>;

    /// A stable name for log messages.
    fn name(&self) -> &str;

    /// Flush and release any held resources. Called exactly once.
    fn close(&mut self) -> Result<()>;
}
