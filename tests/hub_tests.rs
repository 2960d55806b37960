//! # Broadcast Hub and Signal Protocol Tests

use hotpage::hub::{Hub, PushConnection};
use hotpage::signal::{ReloadSignal, RETRY_MS};
use tokio::time::{timeout, Duration};

const SHORT_TIMEOUT: Duration = Duration::from_millis(200);

#[test]
fn wire_codes_are_fixed() {
    assert_eq!(ReloadSignal::Full.code(), '0');
    assert_eq!(ReloadSignal::Style.code(), '1');
    assert_eq!(RETRY_MS, 100);
    assert_eq!(ReloadSignal::Full.to_message(), "retry: 100\ndata: 0\n\n");
    assert_eq!(ReloadSignal::Style.to_string(), "style-reload");
}

#[test]
fn only_single_character_payloads_are_signals() {
    assert_eq!(ReloadSignal::from_data("0"), Some(ReloadSignal::Full));
    assert_eq!(ReloadSignal::from_data("1"), Some(ReloadSignal::Style));
    assert_eq!(ReloadSignal::from_data("2"), None);
    assert_eq!(ReloadSignal::from_data("01"), None);
    assert_eq!(ReloadSignal::from_data(""), None);
}

#[tokio::test]
async fn style_reload_reaches_the_single_connection() {
    let hub = Hub::new();
    let subscription = hub.subscribe();
    assert_eq!(hub.len(), 1);

    assert_eq!(hub.broadcast(ReloadSignal::Style), 1);
    assert!(hub.is_empty());

    let message = timeout(SHORT_TIMEOUT, subscription.recv())
        .await
        .expect("message should arrive")
        .expect("connection signalled");
    assert_eq!(message, "retry: 100\ndata: 1\n\n");
}

#[tokio::test]
async fn full_reload_reaches_every_connection_exactly_once() {
    let hub = Hub::new();
    let subscriptions: Vec<_> = (0..3).map(|_| hub.subscribe()).collect();

    assert_eq!(hub.broadcast(ReloadSignal::Full), 3);
    assert!(hub.is_empty());

    // A second broadcast has nobody left to reach.
    assert_eq!(hub.broadcast(ReloadSignal::Style), 0);

    for subscription in subscriptions {
        let message = subscription.recv().await.expect("signalled");
        assert_eq!(message, "retry: 100\ndata: 0\n\n");
        let data = message
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .unwrap();
        assert_eq!(ReloadSignal::from_data(data), Some(ReloadSignal::Full));
    }
}

#[tokio::test]
async fn late_registration_waits_for_the_next_broadcast() {
    let hub = Hub::new();
    let early = hub.subscribe();
    hub.broadcast(ReloadSignal::Full);
    let late = hub.subscribe();

    assert!(early.recv().await.is_some());
    assert_eq!(hub.len(), 1);

    let mut late = Box::pin(late.recv());
    assert!(
        timeout(SHORT_TIMEOUT, &mut late).await.is_err(),
        "late connection must not see the earlier broadcast"
    );

    hub.broadcast(ReloadSignal::Style);
    assert_eq!(late.await.as_deref(), Some("retry: 100\ndata: 1\n\n"));
}

#[test]
fn broadcast_on_empty_hub_is_a_no_op() {
    let hub = Hub::new();
    assert_eq!(hub.broadcast(ReloadSignal::Full), 0);
    assert!(hub.is_empty());
}

#[test]
fn closed_connections_are_dropped_silently() {
    let hub = Hub::new();
    let (connection, subscription) = PushConnection::new();
    hub.register(connection);
    let _alive = hub.subscribe();
    drop(subscription);

    assert_eq!(hub.broadcast(ReloadSignal::Full), 1);
    assert!(hub.is_empty());
}

#[tokio::test]
async fn disconnect_all_releases_without_signal() {
    let hub = Hub::new();
    let subscription = hub.subscribe();
    assert_eq!(hub.disconnect_all(), 1);
    assert!(hub.is_empty());
    assert_eq!(subscription.recv().await, None);
}
