use std::sync::Arc;
use std::time::Duration;

use context::{CONTEXT_CACHE_KEY, ContextResolver, ResolverOptions};
use errors::{GatewayError, ResolutionError};
use metrics_util::CompositeKey;
use metrics_util::debugging::DebuggingRecorder;
use pos_core::{
    ChangeOrigin, ManualClock, OperationalContext, ResolutionSource, SetContextResponse,
    StampedContext,
};
use storage::{CacheStore, DisabledStorage, MemoryStorage, StorageBackend};
use testing::{
    ScriptedGateway, active_response, cashier_downtown, no_access_response,
    selection_required_response, single_profile_response, waiter_north,
};
use tracing_test::traced_test;

const START_MILLIS: i64 = 1_700_000_000_000;

struct Tab {
    gateway: Arc<ScriptedGateway>,
    resolver: ContextResolver,
    storage: MemoryStorage,
}

fn tab_with(gateway: ScriptedGateway) -> Tab {
    let storage = MemoryStorage::new();
    let clock = Arc::new(ManualClock::new(START_MILLIS));
    tab_on(Arc::new(gateway), storage, clock)
}

fn tab_on(gateway: Arc<ScriptedGateway>, storage: MemoryStorage, clock: Arc<ManualClock>) -> Tab {
    let cache = CacheStore::new(Arc::new(storage.clone())).with_clock(clock.clone());
    let options = ResolverOptions {
        context_ttl_seconds: Some(1),
        metrics_enabled: true,
    };
    let resolver = ContextResolver::new(gateway.clone(), cache, options);
    Tab {
        gateway,
        resolver,
        storage,
    }
}

#[tokio::test]
async fn test_set_context_then_resolve_returns_memory() {
    let tab = tab_with(ScriptedGateway::new());

    let selected = tab.resolver.set_context("cashier", "downtown").await.unwrap();
    let resolution = tab.resolver.resolve().await.unwrap();

    assert_eq!(selected, cashier_downtown());
    assert_eq!(resolution.context, cashier_downtown());
    assert_eq!(resolution.source, ResolutionSource::Memory);
    assert_eq!(tab.gateway.select_calls(), 1);
    assert_eq!(tab.gateway.context_calls(), 0);
}

#[tokio::test]
#[traced_test]
async fn test_entry_points_are_traced_in_spans() {
    let tab = tab_with(ScriptedGateway::new());

    tab.resolver.set_context("cashier", "downtown").await.unwrap();
    tab.resolver.resolve().await.unwrap();

    assert!(logs_contain(r#"set_context{profile="cashier" branch="downtown"}"#));
    assert!(logs_contain("resolve: "));
}

#[tokio::test]
async fn test_cached_context_is_adopted_without_server_call() {
    let gateway = Arc::new(ScriptedGateway::new());
    let storage = MemoryStorage::new();
    let clock = Arc::new(ManualClock::new(START_MILLIS));

    let first = tab_on(gateway.clone(), storage.clone(), clock.clone());
    first.resolver.set_context("waiter", "north").await.unwrap();

    let second = tab_on(gateway.clone(), storage.handle(), clock);
    let resolution = second.resolver.resolve().await.unwrap();

    assert_eq!(resolution.source, ResolutionSource::Cache);
    assert_eq!(resolution.context, waiter_north());
    assert_eq!(second.resolver.current(), Some(waiter_north()));
    assert_eq!(gateway.context_calls(), 0);

    let again = second.resolver.resolve().await.unwrap();
    assert_eq!(again.source, ResolutionSource::Memory);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_resolves_share_one_fetch_after_expiry() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .then_context_after(Duration::from_millis(100), active_response(&cashier_downtown())),
    );
    let storage = MemoryStorage::new();
    let clock = Arc::new(ManualClock::new(START_MILLIS));

    let before = tab_on(gateway.clone(), storage.clone(), clock.clone());
    before.resolver.set_context("waiter", "north").await.unwrap();

    // Fresh memory and an expired cache entry.
    clock.advance(Duration::from_millis(1_500));
    let tab = tab_on(gateway.clone(), storage, clock);

    let (a, b, c) = tokio::join!(
        tab.resolver.resolve(),
        tab.resolver.resolve(),
        tab.resolver.resolve()
    );

    assert_eq!(gateway.context_calls(), 1);
    for resolution in [a.unwrap(), b.unwrap(), c.unwrap()] {
        assert_eq!(resolution.context, cashier_downtown());
        assert_eq!(resolution.source, ResolutionSource::ServerActive);
    }
    assert_eq!(tab.resolver.current(), Some(cashier_downtown()));
}

#[tokio::test]
async fn test_single_profile_is_auto_selected_with_one_write_back() {
    let tab = tab_with(
        ScriptedGateway::new().with_context(single_profile_response("kitchen", "central")),
    );

    let first = tab.resolver.resolve().await.unwrap();
    let second = tab.resolver.resolve().await.unwrap();

    let expected = OperationalContext::new("kitchen", "central");
    assert_eq!(first.source, ResolutionSource::ServerAutoSelected);
    assert_eq!(first.context, expected);
    assert_eq!(second.source, ResolutionSource::Memory);
    assert_eq!(tab.gateway.select_calls(), 1);
    assert_eq!(
        tab.gateway.selections(),
        vec![("kitchen".to_string(), "central".to_string())]
    );
    assert!(tab.storage.get_item("pos:operational-context").unwrap().is_some());
}

#[tokio::test]
async fn test_failed_auto_select_write_back_is_transient() {
    let tab = tab_with(
        ScriptedGateway::new()
            .with_context(single_profile_response("kitchen", "central"))
            .then_select(Err(GatewayError::Transient {
                reason: "connection reset".to_string(),
            })),
    );

    let err = tab.resolver.resolve().await.unwrap_err();

    assert!(matches!(err, ResolutionError::Transient { .. }));
    assert_eq!(tab.resolver.current(), None);
}

#[tokio::test(start_paused = true)]
async fn test_later_fetch_wins_when_it_completes_first() {
    let tab = tab_with(
        ScriptedGateway::new()
            .then_context_after(Duration::from_millis(500), active_response(&cashier_downtown()))
            .then_context_after(Duration::from_millis(10), active_response(&waiter_north())),
    );

    let slow = tokio::spawn({
        let resolver = tab.resolver.clone();
        async move { resolver.resolve().await }
    });
    tokio::time::sleep(Duration::from_millis(1)).await;

    tab.resolver.invalidate();
    let fast = tab.resolver.resolve().await.unwrap();
    assert_eq!(fast.context, waiter_north());
    assert_eq!(fast.source, ResolutionSource::ServerActive);

    let late = slow.await.unwrap().unwrap();
    assert_eq!(late.context, waiter_north());
    assert_eq!(late.source, ResolutionSource::Memory);

    assert_eq!(tab.gateway.context_calls(), 2);
    assert_eq!(tab.resolver.current(), Some(waiter_north()));
    assert_eq!(
        tab.resolver.cache().get::<OperationalContext>(CONTEXT_CACHE_KEY),
        Some(waiter_north())
    );
}

#[tokio::test(start_paused = true)]
async fn test_selection_is_not_overwritten_by_earlier_fetch() {
    let tab = tab_with(
        ScriptedGateway::new()
            .then_context_after(Duration::from_millis(300), active_response(&cashier_downtown())),
    );

    let pending = tokio::spawn({
        let resolver = tab.resolver.clone();
        async move { resolver.resolve().await }
    });
    tokio::time::sleep(Duration::from_millis(1)).await;

    tab.resolver.set_context("waiter", "north").await.unwrap();
    let late = pending.await.unwrap().unwrap();

    assert_eq!(late.context, waiter_north());
    assert_eq!(tab.resolver.current(), Some(waiter_north()));
}

#[tokio::test(start_paused = true)]
async fn test_superseded_selection_keeps_later_selection() {
    let tab = tab_with(
        ScriptedGateway::new()
            .then_select_after(
                Duration::from_millis(200),
                Ok(SetContextResponse {
                    success: true,
                    context: None,
                    message: None,
                }),
            ),
    );

    let slow = tokio::spawn({
        let resolver = tab.resolver.clone();
        async move { resolver.set_context("cashier", "downtown").await }
    });
    tokio::time::sleep(Duration::from_millis(1)).await;

    tab.resolver.set_context("waiter", "north").await.unwrap();
    let returned = slow.await.unwrap().unwrap();

    assert_eq!(returned, waiter_north());
    assert_eq!(tab.resolver.current(), Some(waiter_north()));
}

#[tokio::test]
async fn test_refused_selection_is_malformed() {
    let tab = tab_with(ScriptedGateway::new().then_select(Ok(SetContextResponse {
        success: false,
        context: None,
        message: Some("branch closed".to_string()),
    })));

    let err = tab.resolver.set_context("cashier", "downtown").await.unwrap_err();

    assert_eq!(err, ResolutionError::malformed("branch closed"));
    assert_eq!(tab.resolver.current(), None);
}

#[tokio::test]
async fn test_empty_selection_is_rejected_locally() {
    let tab = tab_with(ScriptedGateway::new());

    let err = tab.resolver.set_context("cashier", "  ").await.unwrap_err();

    assert_eq!(
        err,
        ResolutionError::InvalidInput {
            field: "branch".to_string(),
        }
    );
    assert_eq!(tab.gateway.select_calls(), 0);
}

#[tokio::test]
async fn test_server_failures_are_categorised() {
    let no_access = tab_with(ScriptedGateway::new().with_context(no_access_response()));
    assert_eq!(no_access.resolver.resolve().await.unwrap_err(), ResolutionError::NoAccess);

    let selection = tab_with(
        ScriptedGateway::new().with_context(selection_required_response(&["a", "b", "c"])),
    );
    assert_eq!(
        selection.resolver.resolve().await.unwrap_err(),
        ResolutionError::SelectionRequired { eligible: 3 }
    );

    let malformed = tab_with(ScriptedGateway::new().with_context_error(GatewayError::Malformed {
        endpoint: "/api/operational-context".to_string(),
        reason: "expected value".to_string(),
    }));
    assert!(matches!(
        malformed.resolver.resolve().await.unwrap_err(),
        ResolutionError::Malformed { .. }
    ));

    let down = tab_with(ScriptedGateway::new());
    assert!(matches!(
        down.resolver.resolve().await.unwrap_err(),
        ResolutionError::Transient { .. }
    ));
}

#[tokio::test]
async fn test_invalidate_clears_memory_and_cache() {
    let tab = tab_with(ScriptedGateway::new());
    tab.resolver.set_context("cashier", "downtown").await.unwrap();
    let mut changes = tab.resolver.subscribe();

    tab.resolver.invalidate();

    assert_eq!(tab.resolver.current(), None);
    assert!(tab.storage.get_item("pos:operational-context").unwrap().is_none());
    let change = changes.recv().await.unwrap();
    assert_eq!(change.context, None);
    assert_eq!(change.origin, ChangeOrigin::Local);
}

fn remote(context: OperationalContext, after_start: u64) -> StampedContext {
    StampedContext::new(context, START_MILLIS as u64 + after_start)
}

#[tokio::test]
async fn test_apply_remote_is_idempotent() {
    let tab = tab_with(ScriptedGateway::new());
    let mut changes = tab.resolver.subscribe();
    let announced = remote(waiter_north(), 10);

    assert!(tab.resolver.apply_remote(announced.clone()));
    assert!(!tab.resolver.apply_remote(announced.clone()));
    assert!(!tab.resolver.apply_remote(remote(OperationalContext::new("waiter", ""), 20)));

    let change = changes.recv().await.unwrap();
    assert_eq!(change.context, Some(waiter_north()));
    assert_eq!(change.origin, ChangeOrigin::Remote);
    assert_eq!(change.stamp, announced.stamp);
    assert!(changes.try_recv().is_err());

    assert_eq!(tab.resolver.current(), Some(waiter_north()));
    assert_eq!(
        tab.resolver.cache().get::<StampedContext>(CONTEXT_CACHE_KEY),
        Some(announced)
    );
}

#[tokio::test]
async fn test_late_remote_change_does_not_undo_a_newer_one() {
    let tab = tab_with(ScriptedGateway::new());
    let mut changes = tab.resolver.subscribe();

    assert!(tab.resolver.apply_remote(remote(waiter_north(), 1)));
    assert!(tab.resolver.apply_remote(remote(cashier_downtown(), 2)));
    assert!(!tab.resolver.apply_remote(remote(waiter_north(), 1)));
    assert!(!tab.resolver.apply_remote(remote(cashier_downtown(), 2)));

    assert_eq!(tab.resolver.current(), Some(cashier_downtown()));
    assert_eq!(changes.recv().await.unwrap().context, Some(waiter_north()));
    assert_eq!(changes.recv().await.unwrap().context, Some(cashier_downtown()));
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn test_remote_change_older_than_local_selection_is_dropped() {
    let tab = tab_with(ScriptedGateway::new());
    tab.resolver.set_context("cashier", "downtown").await.unwrap();

    let before_selection = StampedContext::new(waiter_north(), START_MILLIS as u64 - 1);
    assert!(!tab.resolver.apply_remote(before_selection));
    assert_eq!(tab.resolver.current(), Some(cashier_downtown()));

    assert!(tab.resolver.apply_remote(remote(waiter_north(), 1)));
    assert_eq!(tab.resolver.current(), Some(waiter_north()));
}

#[tokio::test]
async fn test_equal_stamps_settle_the_same_way_everywhere() {
    let tab = tab_with(ScriptedGateway::new());

    assert!(tab.resolver.apply_remote(remote(waiter_north(), 5)));
    assert!(!tab.resolver.apply_remote(remote(cashier_downtown(), 5)));
    assert_eq!(tab.resolver.current(), Some(waiter_north()));
}

#[tokio::test]
async fn test_remote_adoption_keeps_newer_cache_entry() {
    let tab = tab_with(ScriptedGateway::new());
    let newest = remote(cashier_downtown(), 2);
    tab.resolver.cache().set(CONTEXT_CACHE_KEY, &newest, None);
    let mut other_tab_events = tab.storage.handle().subscribe().unwrap();

    assert!(tab.resolver.apply_remote(remote(waiter_north(), 1)));

    assert_eq!(tab.resolver.current(), Some(waiter_north()));
    assert_eq!(
        tab.resolver.cache().get::<StampedContext>(CONTEXT_CACHE_KEY),
        Some(newest)
    );
    let rewrite = tokio::time::timeout(Duration::from_millis(20), other_tab_events.recv()).await;
    assert!(rewrite.is_err());
}

#[tokio::test]
async fn test_local_change_is_stamped_after_adopted_remote_change() {
    let tab = tab_with(ScriptedGateway::new());
    let announced = remote(waiter_north(), 1_000);
    tab.resolver.apply_remote(announced.clone());
    let mut changes = tab.resolver.subscribe();

    tab.resolver.set_context("cashier", "downtown").await.unwrap();

    let change = changes.recv().await.unwrap();
    assert_eq!(change.origin, ChangeOrigin::Local);
    assert_eq!(change.stamp, announced.stamp + 1);
    assert_eq!(
        tab.resolver.cache().get::<StampedContext>(CONTEXT_CACHE_KEY),
        Some(StampedContext::new(cashier_downtown(), announced.stamp + 1))
    );
}

#[tokio::test]
async fn test_corrupt_cache_falls_back_to_server() {
    let tab = tab_with(ScriptedGateway::new().with_context(active_response(&cashier_downtown())));
    tab.storage
        .set_item("pos:operational-context", "{\"value\":{\"profile\":\"\"}")
        .unwrap();

    let resolution = tab.resolver.resolve().await.unwrap();

    assert_eq!(resolution.source, ResolutionSource::ServerActive);
    assert_eq!(tab.gateway.context_calls(), 1);
}

#[tokio::test]
async fn test_disabled_storage_still_resolves() {
    let gateway =
        Arc::new(ScriptedGateway::new().with_context(active_response(&cashier_downtown())));
    let resolver = ContextResolver::new(
        gateway.clone(),
        CacheStore::new(Arc::new(DisabledStorage)),
        ResolverOptions::default(),
    );

    let first = resolver.resolve().await.unwrap();
    let second = resolver.resolve().await.unwrap();

    assert_eq!(first.source, ResolutionSource::ServerActive);
    assert_eq!(second.source, ResolutionSource::Memory);
    assert_eq!(gateway.context_calls(), 1);
}

#[tokio::test]
async fn test_disposed_resolver_ignores_changes() {
    let tab = tab_with(ScriptedGateway::new().with_context(active_response(&cashier_downtown())));
    tab.resolver.dispose();

    assert!(!tab.resolver.apply_remote(remote(waiter_north(), 1)));
    let resolution = tab.resolver.resolve().await.unwrap();
    assert_eq!(resolution.source, ResolutionSource::ServerActive);
    assert_eq!(tab.resolver.current(), None);
}

type SnapshotVec = Vec<(
    CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    metrics_util::debugging::DebugValue,
)>;

fn has_metric_with_label(snapshot: &SnapshotVec, name: &str, label: (&str, &str)) -> bool {
    snapshot.iter().any(|(k, _, _, _)| {
        k.key().name() == name
            && k
                .key()
                .labels()
                .any(|l| l.key() == label.0 && l.value() == label.1)
    })
}

#[test]
fn test_resolution_metrics_are_recorded() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let tab = tab_with(ScriptedGateway::new().with_context(no_access_response()));
            let _ = tab.resolver.resolve().await;
            tab.resolver.apply_remote(remote(cashier_downtown(), 1));
            let _ = tab.resolver.resolve().await;
        });
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert!(has_metric_with_label(
        &snapshot,
        "pos_context_resolution_failures_total",
        ("category", "no_access"),
    ));
    assert!(has_metric_with_label(
        &snapshot,
        "pos_context_resolutions_total",
        ("source", "memory")
    ));
    assert!(
        snapshot
            .iter()
            .any(|(k, _, _, _)| k.key().name() == "pos_context_server_fetches_total")
    );
}
