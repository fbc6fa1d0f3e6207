//! The batching fact recorder.
//!
//! Every subsystem funnels its output here as typed [`Datum`]s. The recorder
//! buffers them up to `dump_count` rows, then hands the full batch to each
//! registered [`Backend`] in registration order. Backend failures are logged
//! and swallowed; recording never aborts a simulation.

use mfs_core::models::{Datum, Value, ValueKind};
use mfs_core::ports::Backend;
use mfs_core::{Error, Map, Result};
use std::cell::RefCell;
use std::rc::Rc;
use uuid::Uuid;

/// Default number of datums buffered between backend notifications.
pub const DEFAULT_DUMP_COUNT: usize = 10_000;

/// The process-scope service accepting datums and flushing them in batches.
pub struct Recorder {
    sim_id: Uuid,
    dump_count: usize,
    batch: Vec<Datum>,
    backends: Vec<Box<dyn Backend>>,
    schemas: Map<String, Vec<(&'static str, ValueKind)>>,
    closed: bool,
}

impl Recorder {
    /// A recorder whose simulation id is derived deterministically from the
    /// RNG seed, so identical runs emit identical streams.
    pub fn new(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..].copy_from_slice(&seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).to_le_bytes());
        Self {
            sim_id: uuid::Builder::from_random_bytes(bytes).into_uuid(),
            dump_count: DEFAULT_DUMP_COUNT,
            batch: Vec::with_capacity(DEFAULT_DUMP_COUNT),
            backends: Vec::new(),
            schemas: Map::default(),
            closed: false,
        }
    }

    /// Change the batch size. Flushes anything already buffered.
    pub fn set_dump_count(&mut self, count: usize) {
        self.flush();
        self.dump_count = count.max(1);
        self.batch = Vec::with_capacity(self.dump_count);
    }

    /// The simulation id stamped on every datum.
    pub fn sim_id(&self) -> Uuid {
        self.sim_id
    }

    /// Register an output sink. Backends are notified in registration order.
    pub fn register_backend(&mut self, backend: Box<dyn Backend>) {
        self.backends.push(backend);
    }

    /// Start a new datum for the given table. The simulation id column is
    /// pre-filled.
    pub fn new_datum(&mut self, title: impl Into<String>) -> DatumBuilder<'_> {
        let mut datum = Datum::new(title);
        datum.vals.push(("SimId", Value::Uuid(self.sim_id)));
        DatumBuilder {
            recorder: self,
            datum,
        }
    }

    fn record(&mut self, datum: Datum) -> Result<()> {
        let schema = datum.schema();
        match self.schemas.get(&datum.title) {
            Some(expected) if *expected != schema => {
                return Err(Error::Value(format!(
                    "datum schema mismatch for table '{}'",
                    datum.title
                )));
            }
            Some(_) => {}
            None => {
                self.schemas.insert(datum.title.clone(), schema);
            }
        }
        self.batch.push(datum);
        if self.batch.len() >= self.dump_count {
            self.flush();
        }
        Ok(())
    }

    /// Hand the buffered batch to every backend and reset the buffer.
    pub fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        for backend in &mut self.backends {
            if let Err(err) = backend.notify(&self.batch) {
                tracing::error!(backend = backend.name(), %err, "backend failed write");
            }
        }
        self.batch.clear();
    }

    /// Flush the partial batch and close every backend. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.flush();
        for backend in &mut self.backends {
            if let Err(err) = backend.close() {
                tracing::error!(backend = backend.name(), %err, "backend failed to close");
            }
        }
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("sim_id", &self.sim_id)
            .field("dump_count", &self.dump_count)
            .field("buffered", &self.batch.len())
            .field("backends", &self.backends.len())
            .finish()
    }
}

/// A builder handle for one datum, produced by
/// [`Recorder::new_datum`].
pub struct DatumBuilder<'a> {
    recorder: &'a mut Recorder,
    datum: Datum,
}

impl DatumBuilder<'_> {
    /// Append a typed field.
    pub fn add_val(mut self, name: &'static str, value: impl Into<Value>) -> Self {
        self.datum.vals.push((name, value.into()));
        self
    }

    /// Commit the datum to the batch.
    ///
    /// The first datum recorded for a title fixes that table's schema; a
    /// later datum with different fields or types is a value error.
    pub fn record(self) -> Result<()> {
        self.recorder.record(self.datum)
    }
}

/// Shared view into a [`MemBackend`]'s received datums.
#[derive(Clone, Default)]
pub struct MemHandle(Rc<RefCell<Vec<Datum>>>);

impl MemHandle {
    /// All datums received so far, in order.
    pub fn all(&self) -> Vec<Datum> {
        self.0.borrow().clone()
    }

    /// The datums recorded under one title.
    pub fn rows(&self, title: &str) -> Vec<Datum> {
        self.0
            .borrow()
            .iter()
            .filter(|d| d.title == title)
            .cloned()
            .collect()
    }

    /// Number of datums recorded under one title.
    pub fn count(&self, title: &str) -> usize {
        self.0.borrow().iter().filter(|d| d.title == title).count()
    }
}

/// An in-memory backend, the reference sink for tests and small runs.
#[derive(Default)]
pub struct MemBackend {
    rows: MemHandle,
}

impl MemBackend {
    /// A backend plus a handle for inspecting what it received.
    pub fn new() -> (Self, MemHandle) {
        let rows = MemHandle::default();
        (
            Self { rows: rows.clone() },
            rows,
        )
    }
}

impl Backend for MemBackend {
    fn notify(&mut self, batch: &[Datum]) -> Result<()> {
        self.rows.0.borrow_mut().extend_from_slice(batch);
        Ok(())
    }

    fn name(&self) -> &str {
        "mem"
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_flush_on_wrap_and_close() {
        let mut rec = Recorder::new(1);
        rec.set_dump_count(3);
        let (backend, rows) = MemBackend::new();
        rec.register_backend(Box::new(backend));

        for i in 0..4 {
            rec.new_datum("T").add_val("I", i as i32).record().unwrap();
        }
        // Three flushed at wrap, one still buffered.
        assert_eq!(rows.count("T"), 3);
        rec.close();
        assert_eq!(rows.count("T"), 4);
    }

    #[test]
    fn every_datum_carries_the_sim_id() {
        let mut rec = Recorder::new(99);
        let (backend, rows) = MemBackend::new();
        let sim_id = rec.sim_id();
        rec.register_backend(Box::new(backend));
        rec.new_datum("T").add_val("X", 1i32).record().unwrap();
        rec.close();
        assert_eq!(rows.all()[0].get("SimId"), Some(&Value::Uuid(sim_id)));
    }

    #[test]
    fn sim_id_is_seed_deterministic() {
        assert_eq!(Recorder::new(5).sim_id(), Recorder::new(5).sim_id());
        assert_ne!(Recorder::new(5).sim_id(), Recorder::new(6).sim_id());
    }

    #[test]
    fn schema_is_fixed_by_first_datum() {
        let mut rec = Recorder::new(1);
        rec.new_datum("T").add_val("A", 1i32).record().unwrap();
        // Same shape: fine.
        rec.new_datum("T").add_val("A", 2i32).record().unwrap();
        // Different type for the same field: rejected.
        assert!(rec.new_datum("T").add_val("A", 2.0f64).record().is_err());
        // Different field name: rejected.
        assert!(rec.new_datum("T").add_val("B", 3i32).record().is_err());
        // Other titles are unaffected.
        rec.new_datum("U").add_val("B", 3i32).record().unwrap();
    }

    #[test]
    fn backend_errors_do_not_abort() {
        struct Failing;
        impl Backend for Failing {
            fn notify(&mut self, _batch: &[Datum]) -> Result<()> {
                Err(Error::Value("disk full".to_string()))
            }
            fn name(&self) -> &str {
                "failing"
            }
            fn close(&mut self) -> Result<()> {
                Err(Error::Value("still broken".to_string()))
            }
        }
        let mut rec = Recorder::new(1);
        rec.register_backend(Box::new(Failing));
        rec.new_datum("T").add_val("A", 1i32).record().unwrap();
        rec.close();
    }
}
