//! End-to-end tests of the check pipeline
//!
//! Scheduler → trigger channel → runner → executor (scripted browser)
//! → ingestion → store + live event bus.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use synthetic_monitoring::{
    actors::{
        runner::{RunnerHandle, StoreDirectory},
        scheduler::{SchedulerHandle, SchedulerOptions, TriggerChannel},
    },
    browser::{
        ResourceType,
        scripted::{PageScript, ScriptedEngine},
    },
    ingest::IngestPipeline,
    live::{LiveEvent, RunCompletedEvent},
    model::{FailureType, RunStatus, Severity},
    monitors::{CheckExecutor, ExecutorOptions},
    storage::RunStore,
};

use crate::helpers::{SHOP_URL, create_bus, create_store, create_test_site};

struct Pipeline {
    store: Arc<dyn RunStore>,
    scheduler: SchedulerHandle,
    runner: RunnerHandle,
}

fn spawn_pipeline(
    store: Arc<dyn RunStore>,
    engine: ScriptedEngine,
    bus: synthetic_monitoring::live::LiveEventBus,
) -> Pipeline {
    let (triggers, trigger_rx) = TriggerChannel::new(16);
    let executor = CheckExecutor::new(Arc::new(engine), ExecutorOptions::default());
    let ingest = IngestPipeline::new(store.clone(), bus);

    let runner = RunnerHandle::spawn(
        trigger_rx,
        Arc::new(StoreDirectory::new(store.clone())),
        executor,
        Arc::new(ingest),
        2,
    );
    let scheduler = SchedulerHandle::spawn(
        store.clone(),
        Arc::new(triggers),
        SchedulerOptions {
            // Only explicit ticks in these tests
            tick: Duration::from_secs(3600),
            default_frequency_secs: 300,
        },
    );

    Pipeline {
        store,
        scheduler,
        runner,
    }
}

#[tokio::test]
async fn test_failing_request_produces_one_failed_run_and_one_event() {
    let site = create_test_site(1, Some(300));
    let store = create_store(vec![site.clone()]).await;
    let bus = create_bus();

    let home = format!("{SHOP_URL}/");
    let checkout = format!("{SHOP_URL}/checkout");
    let engine = ScriptedEngine::new()
        .with_page(&home, PageScript::ok(&home).timing(80.0, 300.0, 600.0))
        .with_page(
            &checkout,
            PageScript::ok(&checkout)
                .asset(&format!("{SHOP_URL}/api/cart"), 500, ResourceType::Xhr, 64)
                .timing(90.0, 350.0, 700.0),
        );

    let mut subscription = bus.subscribe(site.id);
    assert_eq!(
        subscription.recv().await,
        Some(LiveEvent::Connected { site_id: site.id })
    );

    let pipeline = spawn_pipeline(store, engine.clone(), bus.clone());

    let report = pipeline.scheduler.tick_now().await.unwrap();
    assert_eq!(report.triggered, 1);

    let event = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("no run_completed event")
        .unwrap();

    let LiveEvent::RunCompleted(RunCompletedEvent {
        run_id,
        status,
        critical,
        major,
        minor,
    }) = event
    else {
        panic!("expected run_completed, got {event:?}");
    };
    assert_eq!((status, critical, major, minor), (RunStatus::Failed, 1, 0, 0));

    // Exactly one event
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(subscription.try_recv().is_none());

    let record = pipeline.store.get_run(run_id).await.unwrap().unwrap();
    assert_eq!(record.run.status, RunStatus::Failed);
    assert_eq!(record.page_results.len(), 2);
    assert_eq!(record.failures.len(), 1);

    let failure = &record.failures[0];
    assert_eq!(failure.severity, Severity::Critical);
    assert_eq!(failure.failure_type, FailureType::Xhr5xx);
    assert_eq!(failure.page_id, Some(site.pages[1].id));
    assert_eq!(record.request_errors.len(), 1);
    assert_eq!(record.request_errors[0].status, Some(500));

    let checkout_result = record
        .page_results
        .iter()
        .find(|result| result.page_id == site.pages[1].id)
        .unwrap();
    assert_eq!(checkout_result.load_ms, Some(700));
    assert_eq!(checkout_result.requests_count, 2);

    assert_eq!(engine.navigations(), vec![home, checkout]);
    assert_eq!(engine.open_sessions(), 0);

    pipeline.scheduler.shutdown().await.unwrap();
    pipeline.runner.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_site_is_not_due_again_after_run() {
    let site = create_test_site(2, Some(300));
    let store = create_store(vec![site.clone()]).await;
    let bus = create_bus();

    let home = format!("{SHOP_URL}/");
    let checkout = format!("{SHOP_URL}/checkout");
    let engine = ScriptedEngine::new()
        .with_page(&home, PageScript::ok(&home))
        .with_page(&checkout, PageScript::ok(&checkout));

    let mut subscription = bus.subscribe(site.id);
    subscription.recv().await.unwrap();

    let pipeline = spawn_pipeline(store, engine, bus.clone());

    assert_eq!(pipeline.scheduler.tick_now().await.unwrap().triggered, 1);
    let event = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.name(), "run_completed");

    // The run just started, a 300s frequency keeps the site quiet
    assert_eq!(pipeline.scheduler.tick_now().await.unwrap().triggered, 0);

    let latest = pipeline.store.latest_run(site.id).await.unwrap().unwrap();
    assert_eq!(latest.status, RunStatus::Success);
    assert_eq!(
        latest.summary.as_deref(),
        Some("Completed 2 pages, 0 critical, 0 major, 0 minor issues")
    );

    pipeline.scheduler.shutdown().await.unwrap();
    pipeline.runner.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_browser_launch_failure_stores_error_run() {
    let site = create_test_site(3, None);
    let store = create_store(vec![site.clone()]).await;
    let bus = create_bus();
    let engine = ScriptedEngine::new().failing_launch("chromium not installed");

    let mut subscription = bus.subscribe(site.id);
    subscription.recv().await.unwrap();

    let pipeline = spawn_pipeline(store, engine, bus.clone());
    pipeline.scheduler.tick_now().await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .unwrap()
        .unwrap();
    let LiveEvent::RunCompleted(completed) = event else {
        panic!("expected run_completed");
    };
    assert_eq!(completed.status, RunStatus::Error);

    let record = pipeline
        .store
        .get_run(completed.run_id)
        .await
        .unwrap()
        .unwrap();
    assert!(record.page_results.is_empty());
    assert!(
        record
            .run
            .summary
            .as_deref()
            .is_some_and(|summary| summary.starts_with("Fatal error:"))
    );

    pipeline.scheduler.shutdown().await.unwrap();
    pipeline.runner.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_page_is_isolated() {
    let site = create_test_site(4, None);
    let store = create_store(vec![site.clone()]).await;
    let bus = create_bus();

    // Only the home page is scripted; checkout fails to resolve
    let home = format!("{SHOP_URL}/");
    let engine = ScriptedEngine::new().with_page(&home, PageScript::ok(&home));

    let mut subscription = bus.subscribe(site.id);
    subscription.recv().await.unwrap();

    let pipeline = spawn_pipeline(store, engine, bus.clone());
    pipeline.scheduler.tick_now().await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .unwrap()
        .unwrap();
    let LiveEvent::RunCompleted(completed) = event else {
        panic!("expected run_completed");
    };
    assert_eq!(completed.status, RunStatus::Failed);

    let record = pipeline
        .store
        .get_run(completed.run_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.page_results.len(), 1);
    assert_eq!(record.failures.len(), 1);
    assert_eq!(record.failures[0].failure_type, FailureType::NavigationFailed);
    assert_eq!(record.failures[0].page_id, Some(site.pages[1].id));

    pipeline.scheduler.shutdown().await.unwrap();
    pipeline.runner.shutdown().await.unwrap();
}
