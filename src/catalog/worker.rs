//! Background loading and scanning.
//!
//! A job takes the catalog by value onto its own thread and hands it back
//! over a channel when done, so at most one load or scan can ever be in
//! flight for a given catalog. The caller blocks on [`Pending::wait`].
//!
//! ```rust,ignore
//! let pending = worker::scan(catalog);
//! let (catalog, report) = pending.wait()?;
//! let report = report?;
//! ```

use super::{Catalog, CatalogError, ScanReport};
use crate::context::Context;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use tracing::debug;

/// A job running on the worker thread.
pub struct Pending<T> {
    done: Receiver<T>,
    handle: JoinHandle<()>,
}

impl<T: Send + 'static> Pending<T> {
    fn spawn(name: &str, job: impl FnOnce() -> T + Send + 'static) -> Result<Self, CatalogError> {
        let (tx, done) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(format!("catalog-{name}"))
            .spawn(move || {
                // The receiver only disappears if the caller gave up waiting.
                let _ = tx.send(job());
            })
            .map_err(|_| CatalogError::WorkerLost)?;
        debug!(job = name, "started catalog worker");
        Ok(Self { done, handle })
    }

    /// Block until the job reports back.
    pub fn wait(self) -> Result<T, CatalogError> {
        let outcome = self.done.recv().map_err(|_| CatalogError::WorkerLost);
        if self.handle.join().is_err() {
            return Err(CatalogError::WorkerLost);
        }
        outcome
    }
}

/// Load `library.xml` in the background.
pub fn load(context: Arc<Context>) -> Result<Pending<Result<Catalog, CatalogError>>, CatalogError> {
    Pending::spawn("load", move || Catalog::load(context))
}

/// Load then scan in the background.
pub fn open(
    context: Arc<Context>,
) -> Result<Pending<Result<(Catalog, ScanReport), CatalogError>>, CatalogError> {
    Pending::spawn("open", move || Catalog::open(context))
}

/// Reconcile `catalog` with the roots in the background. The catalog comes
/// back whether or not the scan succeeded.
pub fn scan(
    mut catalog: Catalog,
) -> Result<Pending<(Catalog, Result<ScanReport, CatalogError>)>, CatalogError> {
    Pending::spawn("scan", move || {
        let report = catalog.scan();
        (catalog, report)
    })
}
