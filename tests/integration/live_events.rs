//! Live event delivery through ingestion
//!
//! Subscribers only see completions of their own site, each subscriber sees
//! each completion once, and disconnected or idle subscribers are forgotten.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use synthetic_monitoring::{
    ingest::IngestPipeline,
    live::{LiveEvent, LiveEventBus},
    model::{Failure, FailureType, Run, RunStatus, Severity},
};

use crate::helpers::{create_bus, create_store, create_submission, create_test_site};

#[tokio::test]
async fn test_events_are_routed_per_site() {
    let shop = create_test_site(1, None);
    let blog = create_test_site(2, None);
    let store = create_store(vec![shop.clone(), blog.clone()]).await;
    let bus = create_bus();
    let ingest = IngestPipeline::new(store, bus.clone());

    let mut shop_sub = bus.subscribe(shop.id);
    let mut blog_sub = bus.subscribe(blog.id);
    shop_sub.recv().await.unwrap();
    blog_sub.recv().await.unwrap();

    let failure = Failure::new(Severity::Major, FailureType::Img404, "404 Not Found: image");
    let receipt = ingest
        .ingest(create_submission(&shop, Utc::now(), vec![failure]))
        .await
        .unwrap();
    assert_eq!(receipt.status, RunStatus::Failed);

    let LiveEvent::RunCompleted(event) = shop_sub.recv().await.unwrap() else {
        panic!("expected run_completed");
    };
    assert_eq!(event.run_id, receipt.run_id);
    assert_eq!((event.critical, event.major, event.minor), (0, 1, 0));

    assert!(blog_sub.try_recv().is_none());
}

#[tokio::test]
async fn test_every_subscriber_gets_each_completion_once() {
    let site = create_test_site(3, None);
    let store = create_store(vec![site.clone()]).await;
    let bus = create_bus();
    let ingest = IngestPipeline::new(store, bus.clone());

    let mut subscriptions = Vec::new();
    for _ in 0..5 {
        let mut subscription = bus.subscribe(site.id);
        subscription.recv().await.unwrap();
        subscriptions.push(subscription);
    }
    assert_eq!(bus.subscriber_count(site.id), 5);

    let started_at = Utc::now();
    let mut handles = Vec::new();
    for offset in 0..3 {
        let ingest = ingest.clone();
        let submission = create_submission(
            &site,
            started_at + chrono::Duration::seconds(offset),
            vec![],
        );
        handles.push(tokio::spawn(async move { ingest.ingest(submission).await }));
    }

    let mut run_ids = Vec::new();
    for handle in handles {
        run_ids.push(handle.await.unwrap().unwrap().run_id);
    }
    run_ids.sort_unstable();

    for subscription in &mut subscriptions {
        let mut seen = Vec::new();
        while let Some(event) = subscription.try_recv() {
            let LiveEvent::RunCompleted(event) = event else {
                panic!("unexpected {event:?}");
            };
            seen.push(event.run_id);
        }
        seen.sort_unstable();
        assert_eq!(seen, run_ids);
    }
}

#[tokio::test]
async fn test_dropped_subscriber_is_forgotten() {
    let site = create_test_site(4, None);
    let store = create_store(vec![site.clone()]).await;
    let bus = create_bus();
    let ingest = IngestPipeline::new(store, bus.clone());

    let first = bus.subscribe(site.id);
    let mut second = bus.subscribe(site.id);
    second.recv().await.unwrap();
    assert_eq!(bus.total_subscribers(), 2);

    drop(first);
    assert_eq!(bus.subscriber_count(site.id), 1);

    ingest
        .ingest(create_submission(&site, Utc::now(), vec![]))
        .await
        .unwrap();
    assert_eq!(second.recv().await.unwrap().name(), "run_completed");

    drop(second);
    assert_eq!(bus.site_count(), 0);
}

#[tokio::test]
async fn test_idle_stream_ends() {
    let bus = LiveEventBus::new(Duration::from_millis(50));
    let stream = bus.subscribe(9).into_stream();

    let events: Vec<LiveEvent> = tokio::time::timeout(Duration::from_secs(5), stream.collect())
        .await
        .expect("idle stream never ended");

    assert_eq!(events, vec![LiveEvent::Connected { site_id: 9 }]);
    assert_eq!(bus.subscriber_count(9), 0);
}

fn completed_run(id: i64, site_id: i64) -> Run {
    Run {
        id,
        site_id,
        started_at: Utc::now(),
        ended_at: Utc::now(),
        status: RunStatus::Success,
        critical_count: 0,
        major_count: 0,
        minor_count: 0,
        summary: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscribe_during_publish_storm() {
    let bus = create_bus();
    let publishing = Arc::new(AtomicBool::new(true));

    let publisher = {
        let bus = bus.clone();
        let publishing = publishing.clone();
        tokio::spawn(async move {
            let mut id = 0;
            while publishing.load(Ordering::Relaxed) {
                id += 1;
                bus.publish(&completed_run(id, 1));
                tokio::task::yield_now().await;
            }
        })
    };

    let mut joins = Vec::new();
    for _ in 0..20 {
        let bus = bus.clone();
        joins.push(tokio::spawn(async move { bus.subscribe(1) }));
    }
    let mut subscriptions = Vec::new();
    for join in joins {
        subscriptions.push(join.await.unwrap());
    }

    publishing.store(false, Ordering::Relaxed);
    publisher.await.unwrap();
    assert_eq!(bus.subscriber_count(1), 20);

    // The next publish reaches every subscriber
    assert_eq!(bus.publish(&completed_run(-1, 1)), 20);

    for subscription in &mut subscriptions {
        assert_eq!(subscription.recv().await, Some(LiveEvent::Connected { site_id: 1 }));

        let mut last = None;
        while let Some(event) = subscription.try_recv() {
            last = Some(event);
        }
        let Some(LiveEvent::RunCompleted(event)) = last else {
            panic!("subscriber missed the final publish");
        };
        assert_eq!(event.run_id, -1);
    }
}
