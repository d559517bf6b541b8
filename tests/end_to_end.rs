//! End-to-end protocol tests: a registered backfill driven through the
//! embedded coordinator, exercising the full prepare / plan / run cycle and
//! the protocol's safety rejections.

use async_trait::async_trait;
use backfill_core::client::protocol::{
    BackfillData, ConfigureServiceRequest, GetNextBatchRangeRequest, RunBatchRequest,
    CONNECTOR_TYPE_HTTP,
};
use backfill_core::client::CoordinatorApi;
use backfill_core::config::BackfillClientConfig;
use backfill_core::cursor::BatchRange;
use backfill_core::embedded::{EmbeddedCoordinator, FIRST_EMBEDDED_RUN_ID};
use backfill_core::error::{BackfillError, Result};
use backfill_core::operator::{RunConfig, RunHandle, RunState};
use backfill_core::registry::CatalogBuilder;
use backfill_core::{Backfill, BackfillContext, StartupConfigurator};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// "Foo" from the coordinator's point of view: five records below 'm',
/// three above, with an observable mutation counter.
struct FooBackfill {
    shared: Arc<FooState>,
}

#[derive(Default)]
struct FooState {
    applied: AtomicU64,
    block_apply: Option<Arc<Notify>>,
}

impl FooBackfill {
    fn keys() -> Vec<String> {
        ["b", "c", "d", "e", "f", "n", "o", "p"]
            .iter()
            .map(|k| k.to_string())
            .collect()
    }
}

#[async_trait]
impl Backfill for FooBackfill {
    const NAME: &'static str = "Foo";
    type Record = String;

    async fn key_bounds(&self, _ctx: &BackfillContext) -> Result<BatchRange> {
        Ok(BatchRange::new("a", "z"))
    }

    async fn select(&self, range: &BatchRange, _ctx: &BackfillContext) -> Result<Vec<String>> {
        Ok(Self::keys()
            .into_iter()
            .filter(|k| *k >= range.start && *k < range.end)
            .collect())
    }

    async fn apply(&self, records: Vec<String>, _ctx: &BackfillContext) -> Result<()> {
        if let Some(notify) = &self.shared.block_apply {
            notify.notified().await;
        }
        self.shared
            .applied
            .fetch_add(records.len() as u64, Ordering::SeqCst);
        Ok(())
    }
}

fn coordinator_with_foo(shared: Arc<FooState>) -> EmbeddedCoordinator {
    let mut builder = CatalogBuilder::new();
    builder
        .register(move || FooBackfill {
            shared: shared.clone(),
        })
        .unwrap();
    EmbeddedCoordinator::new(builder.build())
}

async fn configured_coordinator(shared: Arc<FooState>) -> EmbeddedCoordinator {
    let coordinator = coordinator_with_foo(shared);
    let configurator = StartupConfigurator::new(
        BackfillClientConfig::default(),
        coordinator.service().catalog().clone(),
    );
    configurator.configure(&coordinator).await.unwrap();
    coordinator
}

#[tokio::test]
async fn full_wet_run_through_the_protocol() {
    let shared = Arc::new(FooState::default());
    let coordinator = configured_coordinator(shared.clone()).await;
    let service = coordinator.service();

    // Prepare "Foo" over [a, z), wet.
    let prepared = service
        .prepare_backfill(backfill_core::client::PrepareBackfillRequest {
            backfill_name: "Foo".to_string(),
            run_id: FIRST_EMBEDDED_RUN_ID,
            config: RunConfig::wet_run().with_range(Some("a"), Some("z")),
        })
        .await
        .unwrap();
    assert_eq!(prepared.identity.run_id, 10);
    assert_eq!(prepared.cursor.next_start, "a");
    assert_eq!(prepared.cursor.overall_end, "z");

    let plan = GetNextBatchRangeRequest {
        backfill_name: "Foo".to_string(),
        run_id: 10,
    };

    // First plan: midpoint batch [a, m).
    let first = service.get_next_batch_range(plan.clone()).unwrap();
    assert_eq!(first.batch_range, Some(BatchRange::new("a", "m")));
    assert!(!first.done);

    // Idempotent planning: replanning without running returns the same range.
    let replanned = service.get_next_batch_range(plan.clone()).unwrap();
    assert_eq!(replanned, first);

    // Run [a, m): the five records below 'm'.
    let response = service
        .run_batch(RunBatchRequest {
            backfill_name: "Foo".to_string(),
            run_id: 10,
            batch_range: first.batch_range.unwrap(),
        })
        .await
        .unwrap();
    assert!(response.result.succeeded);
    assert_eq!(response.result.records_processed, 5);
    assert_eq!(response.cursor.next_start, "m");

    // Second plan: the remainder [m, z).
    let second = service.get_next_batch_range(plan.clone()).unwrap();
    assert_eq!(second.batch_range, Some(BatchRange::new("m", "z")));

    let response = service
        .run_batch(RunBatchRequest {
            backfill_name: "Foo".to_string(),
            run_id: 10,
            batch_range: second.batch_range.unwrap(),
        })
        .await
        .unwrap();
    assert!(response.result.succeeded);
    assert_eq!(response.result.records_processed, 3);
    assert_eq!(response.state, RunState::Done);

    // Exhausted: planning signals completion.
    let done = service.get_next_batch_range(plan).unwrap();
    assert!(done.done);
    assert!(done.batch_range.is_none());

    // Every record was actually applied exactly once.
    assert_eq!(shared.applied.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn dry_run_counts_records_without_mutating() {
    let shared = Arc::new(FooState::default());
    let coordinator = configured_coordinator(shared.clone()).await;

    let run = coordinator
        .create_dry_run("Foo", HashMap::new(), Some("a"), Some("z"))
        .await
        .unwrap();

    let counted = run.run_to_completion().await.unwrap();
    assert_eq!(counted, 8);
    assert_eq!(run.state(), RunState::Done);
    // The mutating step never ran.
    assert_eq!(shared.applied.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn out_of_order_batch_is_rejected_and_cursor_unchanged() {
    let shared = Arc::new(FooState::default());
    let coordinator = configured_coordinator(shared).await;
    let service = coordinator.service();

    let run = coordinator
        .create_wet_run("Foo", HashMap::new(), Some("a"), Some("z"))
        .await
        .unwrap();
    let run_id = run.identity().run_id;

    let err = service
        .run_batch(RunBatchRequest {
            backfill_name: "Foo".to_string(),
            run_id,
            batch_range: BatchRange::new("m", "z"),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BackfillError::OutOfOrderRange { .. }));
    assert_eq!(run.cursor().next_start, "a");

    // A coordinator that desyncs re-queries and gets the true next range.
    let next = service
        .get_next_batch_range(GetNextBatchRangeRequest {
            backfill_name: "Foo".to_string(),
            run_id,
        })
        .unwrap();
    assert_eq!(next.batch_range, Some(BatchRange::new("a", "m")));
}

#[tokio::test]
async fn second_batch_in_flight_is_rejected() {
    let notify = Arc::new(Notify::new());
    let shared = Arc::new(FooState {
        applied: AtomicU64::new(0),
        block_apply: Some(notify.clone()),
    });
    let coordinator = Arc::new(configured_coordinator(shared).await);

    let run = coordinator
        .create_wet_run("Foo", HashMap::new(), Some("a"), Some("z"))
        .await
        .unwrap();
    let run_id = run.identity().run_id;
    let range = run.next_batch_range().unwrap().unwrap();

    let first = {
        let coordinator = coordinator.clone();
        let range = range.clone();
        tokio::spawn(async move {
            coordinator
                .service()
                .run_batch(RunBatchRequest {
                    backfill_name: "Foo".to_string(),
                    run_id,
                    batch_range: range,
                })
                .await
        })
    };

    // Wait for the first batch to park inside apply, then collide with it.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let err = coordinator
        .service()
        .run_batch(RunBatchRequest {
            backfill_name: "Foo".to_string(),
            run_id,
            batch_range: range,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BackfillError::BatchAlreadyInFlight { .. }));

    notify.notify_one();
    let response = first.await.unwrap().unwrap();
    assert!(response.result.succeeded);
}

#[tokio::test]
async fn duplicate_backfill_name_rejected_original_usable() {
    struct OtherFoo;

    #[async_trait]
    impl Backfill for OtherFoo {
        const NAME: &'static str = "Foo";
        type Record = ();

        async fn key_bounds(&self, _ctx: &BackfillContext) -> Result<BatchRange> {
            Ok(BatchRange::new("a", "z"))
        }

        async fn select(&self, _range: &BatchRange, _ctx: &BackfillContext) -> Result<Vec<()>> {
            Ok(vec![])
        }

        async fn apply(&self, _records: Vec<()>, _ctx: &BackfillContext) -> Result<()> {
            Ok(())
        }
    }

    let shared = Arc::new(FooState::default());
    let mut builder = CatalogBuilder::new();
    builder
        .register(move || FooBackfill {
            shared: shared.clone(),
        })
        .unwrap();

    let err = builder.register(|| OtherFoo).err();
    assert!(matches!(
        err,
        Some(BackfillError::DuplicateBackfillName { ref name }) if name == "Foo"
    ));

    // The original registration is still usable.
    let catalog = builder.build();
    assert!(catalog
        .create("Foo", 10, RunConfig::dry_run())
        .await
        .is_ok());
}

#[tokio::test]
async fn pause_and_resume_preserve_the_cursor() {
    let shared = Arc::new(FooState::default());
    let coordinator = configured_coordinator(shared).await;
    let service = coordinator.service();

    let run = coordinator
        .create_wet_run("Foo", HashMap::new(), Some("a"), Some("z"))
        .await
        .unwrap();
    let identity = run.identity().clone();

    let range = run.next_batch_range().unwrap().unwrap();
    run.run_batch(&range).await.unwrap();
    let paused_cursor = run.cursor();

    service.pause_run(&identity).unwrap();
    assert_eq!(run.state(), RunState::Paused);
    assert!(matches!(
        run.run_batch(&BatchRange::new("m", "z")).await.unwrap_err(),
        BackfillError::InvalidState { .. }
    ));

    service.resume_run(&identity).unwrap();
    assert_eq!(run.cursor(), paused_cursor);
    let next = run.next_batch_range().unwrap().unwrap();
    assert_eq!(next.start, paused_cursor.next_start);
}

#[tokio::test]
async fn embedded_coordinator_accepts_one_registration() {
    let shared = Arc::new(FooState::default());
    let coordinator = coordinator_with_foo(shared);

    let request = ConfigureServiceRequest {
        backfills: vec![BackfillData {
            name: "Foo".to_string(),
        }],
        connector_type: CONNECTOR_TYPE_HTTP.to_string(),
        connector_extra_data: None,
        slack_channel: None,
    };

    coordinator.configure_service(request.clone()).await.unwrap();
    assert!(coordinator.configured_at().is_some());

    let err = coordinator.configure_service(request).await.unwrap_err();
    assert!(matches!(err, BackfillError::ServiceAlreadyConfigured));
}
