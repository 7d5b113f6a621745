/// Rate poller behavior: snapshots, failures, scheduling and stale responses

use cambio_sdk::poller::RATES_ERROR_MESSAGE;
use cambio_sdk::rates::NestedRates;
use cambio_sdk::{PollState, Signal};
use cambio_test_utils::{wait_for, TestCambio};
use std::collections::BTreeMap;
use std::time::Duration;

const LONG: Duration = Duration::from_secs(3600);

fn single_rate(from: &str, to: &str, rate: f64) -> NestedRates {
    BTreeMap::from([(
        from.to_string(),
        BTreeMap::from([(to.to_string(), rate)]),
    )])
}

#[tokio::test]
async fn test_load_rates_success() {
    let fixture = TestCambio::new().await.unwrap();
    fixture.server.state.set_rates(single_rate("USD", "EUR", 0.9));
    let poller = fixture.client.rate_poller();
    assert_eq!(poller.snapshot().state, PollState::Idle);

    poller.load_rates().await;

    let snapshot = poller.snapshot();
    assert_eq!(snapshot.state, PollState::Ready);
    assert_eq!(snapshot.table.get("USD_EUR"), Some(0.9));
    assert_eq!(snapshot.table.available_currencies(), ["EUR", "USD"]);
    assert!(snapshot.last_update.is_some());
    assert_eq!(snapshot.error, None);

    let status = fixture.client.connectivity().status();
    assert!(status.online);
    assert_eq!(status.source(Signal::RatesFetch), Some(true));
}

#[tokio::test]
async fn test_failure_keeps_previous_table() {
    let fixture = TestCambio::new().await.unwrap();
    let poller = fixture.client.rate_poller();

    poller.load_rates().await;
    let before = poller.snapshot();
    assert_eq!(before.state, PollState::Ready);

    fixture.server.state.fail_rates(true);
    poller.load_rates().await;

    let after = poller.snapshot();
    assert_eq!(after.state, PollState::Errored);
    assert_eq!(after.error.as_deref(), Some(RATES_ERROR_MESSAGE));
    assert_eq!(after.table, before.table);
    assert_eq!(after.last_update, before.last_update);
    assert!(!fixture.client.connectivity().is_online());

    // Recovery clears the error
    fixture.server.state.fail_rates(false);
    poller.load_rates().await;
    let recovered = poller.snapshot();
    assert_eq!(recovered.state, PollState::Ready);
    assert_eq!(recovered.error, None);
    assert!(fixture.client.connectivity().is_online());
}

#[tokio::test]
async fn test_loading_clears_previous_error() {
    let fixture = TestCambio::new().await.unwrap();
    let state = &fixture.server.state;
    let poller = fixture.client.rate_poller();

    state.fail_rates(true);
    poller.load_rates().await;
    assert_eq!(poller.snapshot().state, PollState::Errored);

    state.fail_rates(false);
    state.set_rates_delay(Some(Duration::from_millis(200)));
    let in_flight = tokio::spawn({
        let poller = poller.clone();
        async move { poller.load_rates().await }
    });
    wait_for(|| async move { state.hits("GET /taxas") == 2 }, Duration::from_secs(2))
        .await
        .unwrap();

    let loading = poller.snapshot();
    assert_eq!(loading.state, PollState::Loading);
    assert_eq!(loading.error, None);

    in_flight.await.unwrap();
    assert_eq!(poller.snapshot().state, PollState::Ready);
}

#[tokio::test]
async fn test_liveness_probe_reports_separately() {
    let fixture = TestCambio::new().await.unwrap();
    let poller = fixture.client.rate_poller();

    poller.load_rates().await;
    fixture.server.state.fail_health(true);
    poller.check_liveness().await;

    let status = fixture.client.connectivity().status();
    assert_eq!(status.source(Signal::RatesFetch), Some(true));
    assert_eq!(status.source(Signal::LivenessProbe), Some(false));
    assert!(!status.online);
    assert!(status.is_disputed());
}

#[tokio::test]
async fn test_refresh_flag() {
    let fixture = TestCambio::new().await.unwrap();
    fixture
        .server
        .state
        .set_rates_delay(Some(Duration::from_millis(100)));
    let poller = fixture.client.rate_poller();

    let task = tokio::spawn({
        let poller = poller.clone();
        async move { poller.refresh().await }
    });
    wait_for(
        || {
            let poller = poller.clone();
            async move { poller.snapshot().refreshing }
        },
        Duration::from_secs(2),
    )
    .await
    .unwrap();

    task.await.unwrap();
    let snapshot = poller.snapshot();
    assert!(!snapshot.refreshing);
    assert_eq!(snapshot.state, PollState::Ready);
}

#[tokio::test]
async fn test_older_fetch_cannot_overwrite_newer() {
    let fixture = TestCambio::new().await.unwrap();
    let state = &fixture.server.state;
    state.set_rates(single_rate("USD", "EUR", 0.9));
    state.set_rates_delay(Some(Duration::from_millis(300)));
    let poller = fixture.client.rate_poller();

    let slow = tokio::spawn({
        let poller = poller.clone();
        async move { poller.load_rates().await }
    });
    wait_for(|| async move { state.hits("GET /taxas") == 1 }, Duration::from_secs(2))
        .await
        .unwrap();

    state.set_rates(single_rate("USD", "EUR", 0.95));
    state.set_rates_delay(None);
    poller.load_rates().await;
    assert_eq!(poller.table().get("USD_EUR"), Some(0.95));

    slow.await.unwrap();
    assert_eq!(poller.table().get("USD_EUR"), Some(0.95));
}

#[tokio::test]
async fn test_start_fires_immediately() {
    let fixture = TestCambio::with_config(|c| {
        c.with_rates_interval(LONG).with_liveness_interval(LONG)
    })
    .await
    .unwrap();
    let state = &fixture.server.state;
    let poller = fixture.client.rate_poller();
    let mut updates = poller.subscribe();

    let handle = poller.start();

    tokio::time::timeout(
        Duration::from_secs(2),
        updates.wait_for(|s| s.state == PollState::Ready),
    )
    .await
    .expect("rates never arrived")
    .unwrap();
    wait_for(
        || async move { state.hits("GET /health") == 1 },
        Duration::from_secs(2),
    )
    .await
    .unwrap();
    assert_eq!(state.hits("GET /taxas"), 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_periodic_ticks_stop_on_shutdown() {
    let fixture = TestCambio::with_config(|c| {
        c.with_rates_interval(Duration::from_millis(30))
            .with_liveness_interval(Duration::from_millis(30))
    })
    .await
    .unwrap();
    let state = &fixture.server.state;
    let handle = fixture.client.rate_poller().start();

    wait_for(
        || async move { state.hits("GET /taxas") >= 3 && state.hits("GET /health") >= 3 },
        Duration::from_secs(5),
    )
    .await
    .unwrap();

    assert!(!handle.is_stopped());
    handle.shutdown().await;

    let rates_hits = state.hits("GET /taxas");
    let health_hits = state.hits("GET /health");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(state.hits("GET /taxas"), rates_hits);
    assert_eq!(state.hits("GET /health"), health_hits);
}

#[tokio::test]
async fn test_response_after_stop_is_discarded() {
    let fixture = TestCambio::with_config(|c| {
        c.with_rates_interval(LONG).with_liveness_interval(LONG)
    })
    .await
    .unwrap();
    let state = &fixture.server.state;
    state.fail_health(true);
    state.set_rates_delay(Some(Duration::from_millis(200)));
    let poller = fixture.client.rate_poller();

    let handle = poller.start();
    wait_for(|| async move { state.hits("GET /taxas") == 1 }, Duration::from_secs(2))
        .await
        .unwrap();
    handle.stop();
    assert!(handle.is_stopped());

    // The delayed response would have arrived by now
    tokio::time::sleep(Duration::from_millis(400)).await;

    let snapshot = poller.snapshot();
    assert_eq!(snapshot.state, PollState::Idle);
    assert_eq!(snapshot.error, None);
    assert!(snapshot.table.is_empty());
    assert_eq!(
        fixture.client.connectivity().status().source(Signal::RatesFetch),
        None
    );
    drop(handle);
}

#[tokio::test]
async fn test_direct_fetch_in_flight_across_stop_is_discarded() {
    let fixture = TestCambio::with_config(|c| {
        c.with_rates_interval(LONG).with_liveness_interval(LONG)
    })
    .await
    .unwrap();
    let state = &fixture.server.state;
    let poller = fixture.client.rate_poller();

    // Let the immediate ticks finish, then stop
    let handle = poller.start();
    wait_for(
        || async move { state.hits("GET /taxas") == 1 && state.hits("GET /health") == 1 },
        Duration::from_secs(2),
    )
    .await
    .unwrap();
    let mut updates = poller.subscribe();
    tokio::time::timeout(
        Duration::from_secs(2),
        updates.wait_for(|s| s.state == PollState::Ready),
    )
    .await
    .unwrap()
    .unwrap();

    state.set_rates(single_rate("USD", "EUR", 0.5));
    state.set_rates_delay(Some(Duration::from_millis(200)));
    let in_flight = tokio::spawn({
        let poller = poller.clone();
        async move { poller.load_rates().await }
    });
    wait_for(|| async move { state.hits("GET /taxas") == 2 }, Duration::from_secs(2))
        .await
        .unwrap();

    handle.shutdown().await;
    in_flight.await.unwrap();

    let snapshot = poller.snapshot();
    assert_eq!(snapshot.state, PollState::Ready);
    assert_eq!(snapshot.table.get("USD_EUR"), Some(0.9));
}

#[tokio::test]
async fn test_stop_mid_fetch_restores_previous_error() {
    let fixture = TestCambio::with_config(|c| {
        c.with_rates_interval(LONG).with_liveness_interval(LONG)
    })
    .await
    .unwrap();
    let state = &fixture.server.state;
    let poller = fixture.client.rate_poller();

    state.fail_rates(true);
    poller.load_rates().await;
    assert_eq!(poller.snapshot().state, PollState::Errored);

    state.fail_rates(false);
    state.set_rates_delay(Some(Duration::from_millis(200)));
    let handle = poller.start();
    wait_for(|| async move { state.hits("GET /taxas") == 2 }, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(poller.snapshot().state, PollState::Loading);
    handle.shutdown().await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    let snapshot = poller.snapshot();
    assert_eq!(snapshot.state, PollState::Errored);
    assert_eq!(snapshot.error.as_deref(), Some(RATES_ERROR_MESSAGE));
    assert!(snapshot.table.is_empty());
}

#[tokio::test]
async fn test_liveness_result_after_stop_is_discarded() {
    let fixture = TestCambio::with_config(|c| {
        c.with_rates_interval(LONG).with_liveness_interval(LONG)
    })
    .await
    .unwrap();
    let state = &fixture.server.state;
    state.set_health_delay(Some(Duration::from_millis(200)));
    let poller = fixture.client.rate_poller();

    let handle = poller.start();
    wait_for(|| async move { state.hits("GET /health") == 1 }, Duration::from_secs(2))
        .await
        .unwrap();
    handle.stop();

    // The delayed probe answer would have arrived by now
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(
        fixture.client.connectivity().status().source(Signal::LivenessProbe),
        None
    );
    drop(handle);
}

#[tokio::test]
async fn test_direct_probe_in_flight_across_stop_is_discarded() {
    let fixture = TestCambio::with_config(|c| {
        c.with_rates_interval(LONG).with_liveness_interval(LONG)
    })
    .await
    .unwrap();
    let state = &fixture.server.state;
    let poller = fixture.client.rate_poller();

    let handle = poller.start();
    wait_for(
        || async move { state.hits("GET /taxas") == 1 && state.hits("GET /health") == 1 },
        Duration::from_secs(2),
    )
    .await
    .unwrap();
    wait_for(
        || {
            let connectivity = fixture.client.connectivity().clone();
            async move { connectivity.status().source(Signal::LivenessProbe).is_some() }
        },
        Duration::from_secs(2),
    )
    .await
    .unwrap();

    state.fail_health(true);
    state.set_health_delay(Some(Duration::from_millis(200)));
    let in_flight = tokio::spawn({
        let poller = poller.clone();
        async move { poller.check_liveness().await }
    });
    wait_for(|| async move { state.hits("GET /health") == 2 }, Duration::from_secs(2))
        .await
        .unwrap();

    handle.shutdown().await;
    in_flight.await.unwrap();

    assert_eq!(
        fixture.client.connectivity().status().source(Signal::LivenessProbe),
        Some(true)
    );
}
