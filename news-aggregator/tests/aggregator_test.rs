mod common;

use common::{fake_registry, init_tracing, provider, store_with, FlakyBus, FAKE_TYPE};
use news_aggregator::{
    build_jobs, Aggregator, AggregatorConfig, AggregatorError, AggregatorState, LocalBus, MemoryStore,
    NotificationBus, ProviderRepository, NEW_PROVIDER_TOPIC,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

async fn aggregator_for(
    store: Arc<MemoryStore>,
    bus: Arc<dyn NotificationBus>,
    pulls: Arc<AtomicUsize>,
    config: AggregatorConfig,
) -> Aggregator {
    let registry = Arc::new(fake_registry(pulls));
    let jobs = build_jobs(store.as_ref(), store.clone(), &registry).await.unwrap();
    Aggregator::new(jobs, config, bus, store.clone(), store, registry)
}

async fn wait_for_jobs(aggregator: &Aggregator, expected: &[&str]) -> Vec<String> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let running = aggregator.running_jobs().await;
        if running == expected || tokio::time::Instant::now() >= deadline {
            return running;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_new_provider_event_starts_a_job() {
    init_tracing();

    let store = store_with(&[provider("a", FAKE_TYPE, "A"), provider("b", "unsupported", "B")]).await;
    let bus = Arc::new(LocalBus::new());
    let pulls = Arc::new(AtomicUsize::new(0));
    let mut aggregator = aggregator_for(store.clone(), bus.clone(), pulls.clone(), AggregatorConfig::default()).await;

    aggregator.start().await.unwrap();
    assert_eq!(aggregator.state(), AggregatorState::Running);
    assert_eq!(wait_for_jobs(&aggregator, &["A"]).await, vec!["A"]);

    info!("Registering provider C while running");
    store.insert_providers(&[provider("c", FAKE_TYPE, "C")]).await.unwrap();
    bus.publish(NEW_PROVIDER_TOPIC, b"c").await.unwrap();

    assert_eq!(wait_for_jobs(&aggregator, &["A", "C"]).await, vec!["A", "C"]);

    aggregator.stop().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), aggregator.wait())
        .await
        .expect("jobs should stop");

    assert_eq!(aggregator.state(), AggregatorState::Stopped);
    assert!(aggregator.running_jobs().await.is_empty());
    assert_eq!(bus.subscription_count().await, 0);
    assert!(pulls.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_unknown_provider_event_starts_nothing() {
    init_tracing();

    let store = store_with(&[provider("a", FAKE_TYPE, "A")]).await;
    let bus = Arc::new(LocalBus::new());
    let mut aggregator =
        aggregator_for(store, bus.clone(), Arc::new(AtomicUsize::new(0)), AggregatorConfig::default()).await;

    aggregator.start().await.unwrap();
    bus.publish(NEW_PROVIDER_TOPIC, b"does-not-exist").await.unwrap();
    bus.publish(NEW_PROVIDER_TOPIC, b"   ").await.unwrap();
    bus.publish(NEW_PROVIDER_TOPIC, &[0xff, 0xfe]).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(aggregator.running_jobs().await, vec!["A"]);

    aggregator.stop().await.unwrap();
    aggregator.wait().await;
}

#[tokio::test]
async fn test_unsupported_provider_event_starts_nothing() {
    init_tracing();

    let store = store_with(&[provider("a", FAKE_TYPE, "A")]).await;
    let bus = Arc::new(LocalBus::new());
    let mut aggregator = aggregator_for(
        store.clone(),
        bus.clone(),
        Arc::new(AtomicUsize::new(0)),
        AggregatorConfig::default(),
    )
    .await;

    aggregator.start().await.unwrap();
    store.insert_providers(&[provider("d", "unsupported", "D")]).await.unwrap();
    bus.publish(NEW_PROVIDER_TOPIC, b"d").await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(aggregator.running_jobs().await, vec!["A"]);

    aggregator.stop().await.unwrap();
    aggregator.wait().await;
}

#[tokio::test]
async fn test_stop_halts_initial_and_discovered_jobs() {
    init_tracing();

    let store = store_with(&[provider("a", FAKE_TYPE, "A"), provider("b", FAKE_TYPE, "B")]).await;
    let bus = Arc::new(FlakyBus::default());
    let pulls = Arc::new(AtomicUsize::new(0));
    let mut aggregator = aggregator_for(store.clone(), bus.clone(), pulls.clone(), AggregatorConfig::default()).await;

    aggregator.start().await.unwrap();
    store.insert_providers(&[provider("c", FAKE_TYPE, "C")]).await.unwrap();
    bus.publish(NEW_PROVIDER_TOPIC, b"c").await.unwrap();
    assert_eq!(wait_for_jobs(&aggregator, &["A", "B", "C"]).await, vec!["A", "B", "C"]);

    aggregator.stop().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), aggregator.wait())
        .await
        .expect("every job should stop, including discovered ones");

    let after_stop = pulls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(pulls.load(Ordering::SeqCst), after_stop);
    assert_eq!(bus.unsubscribe_calls(), 1);

    // Events published after stop are not picked up
    store.insert_providers(&[provider("e", FAKE_TYPE, "E")]).await.unwrap();
    bus.publish(NEW_PROVIDER_TOPIC, b"e").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(aggregator.running_jobs().await.is_empty());
}

#[tokio::test]
async fn test_subscribe_failure_is_fatal() {
    init_tracing();

    let store = store_with(&[provider("a", FAKE_TYPE, "A")]).await;
    let bus = Arc::new(FlakyBus::default());
    bus.fail_subscribe.store(true, Ordering::SeqCst);
    let pulls = Arc::new(AtomicUsize::new(0));
    let mut aggregator = aggregator_for(store, bus, pulls.clone(), AggregatorConfig::default()).await;

    let result = aggregator.start().await;
    assert!(matches!(result, Err(AggregatorError::Subscribe { .. })));
    assert_eq!(aggregator.state(), AggregatorState::Created);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pulls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unsubscribe_failure_still_stops_jobs() {
    init_tracing();

    let store = store_with(&[provider("a", FAKE_TYPE, "A")]).await;
    let bus = Arc::new(FlakyBus::default());
    bus.fail_unsubscribe.store(true, Ordering::SeqCst);
    let mut aggregator =
        aggregator_for(store, bus.clone(), Arc::new(AtomicUsize::new(0)), AggregatorConfig::default()).await;

    aggregator.start().await.unwrap();
    assert_eq!(wait_for_jobs(&aggregator, &["A"]).await, vec!["A"]);

    aggregator.stop().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), aggregator.wait())
        .await
        .expect("jobs should stop despite the unsubscribe error");

    assert_eq!(bus.unsubscribe_calls(), 1);
    assert_eq!(aggregator.state(), AggregatorState::Stopped);
}

#[tokio::test]
async fn test_lifecycle_is_enforced() {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(LocalBus::new());
    let mut aggregator =
        aggregator_for(store, bus, Arc::new(AtomicUsize::new(0)), AggregatorConfig::default()).await;

    assert!(matches!(aggregator.stop().await, Err(AggregatorError::InvalidState { .. })));

    aggregator.start().await.unwrap();
    assert!(matches!(aggregator.start().await, Err(AggregatorError::InvalidState { .. })));

    aggregator.stop().await.unwrap();
    assert!(matches!(aggregator.stop().await, Err(AggregatorError::InvalidState { .. })));
    assert!(matches!(aggregator.start().await, Err(AggregatorError::InvalidState { .. })));

    aggregator.wait().await;
}

#[tokio::test(start_paused = true)]
async fn test_delayed_starts_stay_within_window() {
    init_tracing();

    let store = store_with(&[provider("a", FAKE_TYPE, "A"), provider("b", FAKE_TYPE, "B")]).await;
    let bus = Arc::new(LocalBus::new());
    let config = AggregatorConfig {
        delay_starts: true,
        max_start_delay: Duration::from_secs(60),
    };
    let mut aggregator = aggregator_for(store, bus, Arc::new(AtomicUsize::new(0)), config).await;

    let begin = tokio::time::Instant::now();
    aggregator.start().await.unwrap();

    // one delay per job, each under the window
    assert!(begin.elapsed() < Duration::from_secs(120));
    assert_eq!(aggregator.running_jobs().await, vec!["A", "B"]);

    aggregator.stop().await.unwrap();
    aggregator.wait().await;
}

#[tokio::test]
async fn test_zero_delay_window_starts_immediately() {
    init_tracing();

    let store = store_with(&[provider("a", FAKE_TYPE, "A")]).await;
    let bus = Arc::new(LocalBus::new());
    let config = AggregatorConfig {
        delay_starts: true,
        max_start_delay: Duration::ZERO,
    };
    let mut aggregator = aggregator_for(store, bus, Arc::new(AtomicUsize::new(0)), config).await;

    tokio::time::timeout(Duration::from_secs(1), aggregator.start())
        .await
        .expect("no delay expected")
        .unwrap();

    aggregator.stop().await.unwrap();
    aggregator.wait().await;
}
