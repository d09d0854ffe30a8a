//! WebSocket 종단 간 통합 테스트.
//!
//! WsTransport + StaticTokenProvider + MetricsClient cross-crate 연동을
//! 로컬 mock 허브로 검증.


use hub_server::{start_hub, HubOptions};
use metricflow_core::config::ClientConfig;
use metricflow_core::models::connection::{ConnectionState, LifecycleEvent};
use metricflow_core::models::subscription::{SubscriptionId, SubscriptionSpec};
use metricflow_core::models::wire::ClientMessage;
use metricflow_network::auth::StaticTokenProvider;
use metricflow_network::ws_client::WsTransport;
use metricflow_stream::{MetricUpdate, MetricsClient, Subscription, SubscriptionUpdate};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

const WAIT: Duration = Duration::from_secs(5);

fn client_for(base_url: &str) -> MetricsClient {
    let mut config = ClientConfig::default_config();
    config.server.base_url = base_url.to_string();
    config.reconnect.step_ms = 10;
    config.reconnect.max_delay_ms = 50;

    MetricsClient::new(
        &config,
        Arc::new(WsTransport::from_config(&config.server)),
        Arc::new(StaticTokenProvider::new("tok_e2e")),
    )
}

async fn next_metric(sub: &mut Subscription) -> MetricUpdate {
    match tokio::time::timeout(WAIT, sub.next()).await.expect("갱신 타임아웃") {
        Some(SubscriptionUpdate::Metric(update)) => update,
        other => panic!("메트릭 갱신 기대: {other:?}"),
    }
}

#[tokio::test]
async fn stream_roundtrip_over_websocket() {
    let mut hub = start_hub(HubOptions::default()).await;
    let client = client_for(&hub.base_url);

    assert_ok!(client.connect().await);
    let mut sub = client.subscribe(SubscriptionSpec::new(["orders"]));

    let update = next_metric(&mut sub).await;
    assert_eq!(update.event.metric_name, "orders");
    assert_eq!(update.event.value, 42.0);
    assert_eq!(update.event.dimension("conn"), Some("0"));
    assert_eq!(client.metric("orders").unwrap().latest.value, 42.0);

    // 원격 이력은 호출자에게만 전달
    let history = client
        .invoker()
        .get_history("orders", Duration::from_secs(300))
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(client.metric_history("orders").len(), 1);

    let (conn, first) = hub.received.recv().await.unwrap();
    assert_eq!(conn, 0);
    assert!(matches!(first, ClientMessage::Subscribe { .. }));

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(tokio::time::timeout(WAIT, sub.next()).await.unwrap().is_none());
}

#[tokio::test]
async fn reconnect_replays_subscription_over_websocket() {
    let mut hub = start_hub(HubOptions {
        close_first_after_subscribe: true,
    })
    .await;
    let client = client_for(&hub.base_url);
    let mut events = client.lifecycle();

    // 연결 전 등록 → 첫 연결에서 전송, 서버가 끊으면 재연결 후 재전송
    let mut sub = client.subscribe(SubscriptionSpec::new(["orders"]));
    assert_ok!(client.connect().await);

    let mut values = Vec::new();
    while !values.contains(&43.0) {
        values.push(next_metric(&mut sub).await.event.value);
    }
    assert_eq!(values.first(), Some(&42.0));

    let reconnected = tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(LifecycleEvent::Reconnected) = events.recv().await {
                return true;
            }
        }
    })
    .await;
    assert_eq!(reconnected, Ok(true));

    let mut subscribes: Vec<(usize, SubscriptionId)> = Vec::new();
    while let Ok((conn, message)) = hub.received.try_recv() {
        if let ClientMessage::Subscribe {
            subscription_id, ..
        } = message
        {
            subscribes.push((conn, subscription_id));
        }
    }
    assert_eq!(subscribes, vec![(0, sub.id()), (1, sub.id())]);
    assert_eq!(client.state(), ConnectionState::Connected);
}
