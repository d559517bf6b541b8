#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Backfill Core
//!
//! Client-side execution engine for coordinator-driven, resumable backfill
//! runs: long-lived batch jobs that walk a totally-ordered key range of a
//! dataset, applying a user-supplied transformation batch by batch, while a
//! remote coordinator tracks progress, hands out ranges, and enforces
//! dry-run/wet-run semantics and pause/resume control.
//!
//! ## Architecture
//!
//! The coordinator decides *what* range to work on and *when*; the operator
//! decides *how* to execute it; the executor does the work:
//!
//! - [`cursor`]: immutable key-range boundaries and the monotone progress
//!   cursor; planning is pure, advancement happens only on batch success
//! - [`backfill`]: the user-supplied capability: select records in a
//!   range, apply the transformation to a record set
//! - [`executor`]: executes one batch in dry-run or wet-run mode; the
//!   enforcement point for dry-run isolation
//! - [`operator`]: lifecycle of one run: identity, config, cursor, and the
//!   serialized batch-processing path with single-in-flight enforcement
//! - [`registry`]: the process-wide catalog mapping backfill names to
//!   operator constructors, frozen at startup
//! - [`client`]: the coordinator protocol: wire shapes, the three request
//!   handlers (prepare / next-batch-range / run-batch), the HTTP stub, and
//!   the best-effort startup handshake
//! - [`embedded`]: an in-process substitute coordinator for tests and
//!   development mode
//!
//! ## Key invariants
//!
//! - Cursor starts are monotonically non-decreasing within a run; a batch
//!   never overlaps a previously completed range
//! - At most one batch is in flight per run; concurrent attempts are
//!   rejected, never queued
//! - Planning the next range is idempotent; only a successful batch moves
//!   the cursor
//! - Dry runs never reach the capability's mutating step
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use backfill_core::embedded::EmbeddedCoordinator;
//! use backfill_core::client::{CoordinatorApi, StartupConfigurator};
//! use backfill_core::config::BackfillClientConfig;
//! use backfill_core::registry::CatalogBuilder;
//! # use backfill_core::operator::RunHandle;
//! # use backfill_core::backfill::{Backfill, BackfillContext};
//! # use backfill_core::cursor::BatchRange;
//! # use backfill_core::error::Result;
//! # struct MyBackfill;
//! # #[async_trait::async_trait]
//! # impl Backfill for MyBackfill {
//! #     const NAME: &'static str = "MyBackfill";
//! #     type Record = String;
//! #     async fn key_bounds(&self, _: &BackfillContext) -> Result<BatchRange> {
//! #         Ok(BatchRange::new("a", "z"))
//! #     }
//! #     async fn select(&self, _: &BatchRange, _: &BackfillContext) -> Result<Vec<String>> {
//! #         Ok(vec![])
//! #     }
//! #     async fn apply(&self, _: Vec<String>, _: &BackfillContext) -> Result<()> {
//! #         Ok(())
//! #     }
//! # }
//!
//! # tokio_test::block_on(async {
//! let mut builder = CatalogBuilder::new();
//! builder.register(|| MyBackfill).unwrap();
//! let catalog = builder.build();
//!
//! let coordinator = EmbeddedCoordinator::new(catalog.clone());
//! let configurator = StartupConfigurator::new(BackfillClientConfig::default(), catalog);
//! configurator.configure(&coordinator).await.unwrap();
//!
//! let run = coordinator
//!     .create_dry_run("MyBackfill", Default::default(), Some("a"), Some("z"))
//!     .await
//!     .unwrap();
//! let records = run.run_to_completion().await.unwrap();
//! println!("would affect {records} records");
//! # });
//! ```

pub mod backfill;
pub mod client;
pub mod config;
pub mod cursor;
pub mod embedded;
pub mod error;
pub mod executor;
pub mod logging;
pub mod operator;
pub mod registry;

pub use backfill::{Backfill, BackfillContext};
pub use client::{BackfillService, CoordinatorApi, RemoteCoordinator, StartupConfigurator};
pub use config::BackfillClientConfig;
pub use cursor::{BatchRange, Cursor};
pub use embedded::{EmbeddedCoordinator, FIRST_EMBEDDED_RUN_ID};
pub use error::{BackfillError, Result};
pub use executor::{BatchExecutor, BatchResult};
pub use operator::{BackfillOperator, RunConfig, RunHandle, RunIdentity, RunState};
pub use registry::{Catalog, CatalogBuilder};
