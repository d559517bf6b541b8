//! # Backfill Catalog
//!
//! Maps each backfill's declared name to a constructor that builds a fresh
//! operator for a run. The catalog is assembled once at process startup via
//! [`CatalogBuilder`] and frozen into an immutable [`Catalog`]; it is the
//! only process-wide registry state, safe for unsynchronized concurrent
//! reads, with no removal and no hot-reload.
//!
//! This is the single place where the textual catalog (sent to the
//! coordinator in the startup handshake) and live operator instances are
//! connected.

use crate::backfill::Backfill;
use crate::error::{BackfillError, Result};
use crate::operator::{BackfillOperator, RunConfig, RunHandle, RunIdentity};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

type OperatorConstructor =
    Box<dyn Fn(RunIdentity, RunConfig) -> BoxFuture<'static, Result<Arc<dyn RunHandle>>> + Send + Sync>;

/// Builder for the process-wide backfill catalog.
#[derive(Default)]
pub struct CatalogBuilder {
    constructors: HashMap<String, OperatorConstructor>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backfill type under its declared [`Backfill::NAME`].
    ///
    /// `factory` produces a fresh capability instance per run. Name
    /// collisions are rejected; the original registration stays usable.
    pub fn register<B, F>(&mut self, factory: F) -> Result<&mut Self>
    where
        B: Backfill + 'static,
        F: Fn() -> B + Send + Sync + 'static,
    {
        let name = B::NAME;
        if self.constructors.contains_key(name) {
            return Err(BackfillError::duplicate_backfill_name(name));
        }

        let constructor: OperatorConstructor = Box::new(move |identity, config| {
            let backfill = factory();
            BackfillOperator::prepare_handle(identity, config, backfill).boxed()
        });
        self.constructors.insert(name.to_string(), constructor);

        info!(backfill = name, "Registered backfill");
        Ok(self)
    }

    /// Freeze the catalog. Read-only from here on.
    pub fn build(self) -> Catalog {
        let mut names: Vec<_> = self.constructors.keys().cloned().collect();
        names.sort();
        info!(backfills = names.len(), "Backfill catalog built");
        Catalog {
            inner: Arc::new(CatalogInner {
                constructors: self.constructors,
                names,
            }),
        }
    }
}

struct CatalogInner {
    constructors: HashMap<String, OperatorConstructor>,
    names: Vec<String>,
}

/// Immutable catalog of the backfill types known to this process.
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<CatalogInner>,
}

impl Catalog {
    /// Sorted backfill names, as advertised in the startup handshake.
    pub fn names(&self) -> &[String] {
        &self.inner.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.constructors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.constructors.is_empty()
    }

    /// Build a fresh operator for a new run of `name`.
    pub async fn create(
        &self,
        name: &str,
        run_id: u64,
        config: RunConfig,
    ) -> Result<Arc<dyn RunHandle>> {
        let constructor = self
            .inner
            .constructors
            .get(name)
            .ok_or_else(|| BackfillError::unknown_backfill(name))?;

        constructor(RunIdentity::new(name, run_id), config).await
    }
}
