//! 메트릭 이벤트 라우터.
//!
//! 서버 이벤트 검증 → 저장소 일괄 갱신 → 일치하는 구독에 팬아웃.
//! 배치의 모든 상태 변경이 끝난 뒤에만 팬아웃한다.

use chrono::{DateTime, Utc};
use metricflow_core::models::metric::MetricEvent;
use metricflow_core::models::subscription::SubscriptionId;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::StreamError;
use crate::registry::SubscriptionRegistry;
use crate::store::MetricStore;
use crate::subscription::{AggregateValue, MetricUpdate, SubscriptionUpdate};

/// 느슨한 수신 형태. 필수 필드 검증은 [`decode_event`]에서 수행
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    metric_name: Option<String>,
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    dimensions: Option<HashMap<String, String>>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

/// 원본 JSON → 검증된 이벤트
///
/// 메트릭 이름이 없거나 값이 숫자가 아니면 `Protocol` 에러.
/// id/timestamp가 없으면 수신 시점에 채운다.
pub fn decode_event(raw: serde_json::Value) -> Result<MetricEvent, StreamError> {
    let raw: RawEvent = serde_json::from_value(raw)
        .map_err(|e| StreamError::Protocol(format!("메트릭 이벤트 파싱 실패: {e}")))?;

    let metric_name = raw
        .metric_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| StreamError::Protocol("metricName 누락".to_string()))?;

    let value = raw
        .value
        .as_ref()
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| StreamError::Protocol(format!("{metric_name}: 숫자가 아닌 값")))?;

    let mut event = MetricEvent::new(metric_name, value);
    if let Some(id) = raw.id {
        event.id = id;
    }
    if let Some(timestamp) = raw.timestamp {
        event.timestamp = timestamp;
    }
    event.dimensions = raw.dimensions;
    event.metadata = raw.metadata;
    Ok(event)
}

/// 수신 처리 결과
#[derive(Debug, Default)]
pub struct RouteOutcome {
    /// 저장소에 반영된 이벤트 수
    pub accepted: usize,
    /// 구독자에게 전달된 갱신 수
    pub delivered: usize,
    /// 버려진 이벤트의 프로토콜 에러
    pub rejected: Vec<StreamError>,
    /// 수신 측이 사라져 레지스트리에서 제거된 구독
    pub pruned: Vec<SubscriptionId>,
}

/// 메트릭 이벤트 라우터 (저장소의 유일한 쓰기 주체)
#[derive(Debug, Clone)]
pub struct MetricEventRouter {
    store: Arc<MetricStore>,
}

impl MetricEventRouter {
    pub fn new(store: Arc<MetricStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }

    /// 단일 이벤트 처리
    pub fn ingest_single(
        &self,
        registry: &mut SubscriptionRegistry,
        raw: serde_json::Value,
    ) -> RouteOutcome {
        self.ingest_batch(registry, vec![raw])
    }

    /// 배치 처리: 검증 → 일괄 적용 → 순서대로 팬아웃
    pub fn ingest_batch(
        &self,
        registry: &mut SubscriptionRegistry,
        raw_events: Vec<serde_json::Value>,
    ) -> RouteOutcome {
        let mut outcome = RouteOutcome::default();
        let mut events = Vec::with_capacity(raw_events.len());

        for raw in raw_events {
            match decode_event(raw) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!("잘못된 메트릭 이벤트 무시: {e}");
                    outcome.rejected.push(e);
                }
            }
        }

        self.store.apply_batch(&events);
        outcome.accepted = events.len();

        for event in &events {
            self.fan_out(registry, event, &mut outcome);
        }

        for id in &outcome.pruned {
            registry.remove(*id);
        }

        debug!(
            "메트릭 {}건 반영, 갱신 {}건 전달",
            outcome.accepted, outcome.delivered
        );
        outcome
    }

    fn fan_out(
        &self,
        registry: &SubscriptionRegistry,
        event: &MetricEvent,
        outcome: &mut RouteOutcome,
    ) {
        for (id, spec) in registry.matching(event) {
            if outcome.pruned.contains(&id) {
                continue;
            }

            let aggregate = spec.aggregation.and_then(|aggregation| {
                let values = self.store.latest_values(&spec.metric_names);
                aggregation
                    .apply(&values)
                    .map(|value| AggregateValue { aggregation, value })
            });

            let update = SubscriptionUpdate::Metric(MetricUpdate {
                subscription_id: id,
                event: event.clone(),
                aggregate,
            });

            if registry.deliver(id, update) {
                outcome.delivered += 1;
            } else {
                debug!("수신 측이 없는 구독 정리: {id}");
                outcome.pruned.push(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricflow_core::models::subscription::{Aggregation, SubscriptionSpec};
    use serde_json::json;
    use tokio::sync::mpsc;

    fn router() -> MetricEventRouter {
        MetricEventRouter::new(Arc::new(MetricStore::new(100)))
    }

    fn next_metric(rx: &mut mpsc::UnboundedReceiver<SubscriptionUpdate>) -> MetricUpdate {
        match rx.try_recv() {
            Ok(SubscriptionUpdate::Metric(update)) => update,
            other => panic!("메트릭 갱신 기대: {other:?}"),
        }
    }

    #[test]
    fn decode_fills_missing_id_and_timestamp() {
        let event = decode_event(json!({"metricName": "cpu", "value": 3})).unwrap();
        assert_eq!(event.metric_name, "cpu");
        assert_eq!(event.value, 3.0);
        assert!(!event.id.is_empty());
    }

    #[test]
    fn decode_keeps_server_fields() {
        let event = decode_event(json!({
            "id": "evt_1",
            "metricName": "cpu",
            "value": 1.5,
            "timestamp": "2026-03-01T09:00:00Z",
            "dimensions": {"region": "eu"}
        }))
        .unwrap();
        assert_eq!(event.id, "evt_1");
        assert_eq!(event.timestamp.to_rfc3339(), "2026-03-01T09:00:00+00:00");
        assert_eq!(event.dimension("region"), Some("eu"));
    }

    #[test]
    fn decode_rejects_malformed() {
        assert!(matches!(
            decode_event(json!({"value": 1})),
            Err(StreamError::Protocol(_))
        ));
        assert!(matches!(
            decode_event(json!({"metricName": "", "value": 1})),
            Err(StreamError::Protocol(_))
        ));
        assert!(matches!(
            decode_event(json!({"metricName": "cpu", "value": "high"})),
            Err(StreamError::Protocol(_))
        ));
        assert!(matches!(
            decode_event(json!("not an object")),
            Err(StreamError::Protocol(_))
        ));
    }

    #[test]
    fn fan_out_respects_names_and_filters() {
        let router = router();
        let mut registry = SubscriptionRegistry::new();
        let (eu_tx, mut eu_rx) = mpsc::unbounded_channel();
        let (all_tx, mut all_rx) = mpsc::unbounded_channel();
        registry.insert(
            SubscriptionId(1),
            SubscriptionSpec::new(["orders"]).with_filter("region", "eu"),
            eu_tx,
        );
        registry.insert(SubscriptionId(2), SubscriptionSpec::new(["orders"]), all_tx);

        let outcome = router.ingest_batch(
            &mut registry,
            vec![
                json!({"metricName": "orders", "value": 1, "dimensions": {"region": "us"}}),
                json!({"metricName": "orders", "value": 2, "dimensions": {"region": "eu"}}),
                json!({"metricName": "visits", "value": 9}),
            ],
        );

        assert_eq!(outcome.accepted, 3);
        assert_eq!(outcome.delivered, 3);
        assert_eq!(next_metric(&mut eu_rx).event.value, 2.0);
        assert!(eu_rx.try_recv().is_err());
        assert_eq!(next_metric(&mut all_rx).event.value, 1.0);
        assert_eq!(next_metric(&mut all_rx).event.value, 2.0);
    }

    #[test]
    fn malformed_events_do_not_abort_batch() {
        let router = router();
        let mut registry = SubscriptionRegistry::new();
        let outcome = router.ingest_batch(
            &mut registry,
            vec![
                json!({"metricName": "cpu", "value": 1}),
                json!({"metricName": "cpu"}),
                json!({"metricName": "cpu", "value": 2}),
            ],
        );
        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(router.store().history("cpu").len(), 2);
    }

    #[test]
    fn batch_applied_before_fan_out() {
        let router = router();
        let mut registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.insert(
            SubscriptionId(1),
            SubscriptionSpec::new(["a", "b"]).with_aggregation(Aggregation::Sum),
            tx,
        );

        router.ingest_batch(
            &mut registry,
            vec![
                json!({"metricName": "a", "value": 1}),
                json!({"metricName": "b", "value": 10}),
            ],
        );

        // 첫 갱신의 집계에도 배치의 마지막 값까지 반영되어 있다
        let first = next_metric(&mut rx);
        assert_eq!(first.event.metric_name, "a");
        assert_eq!(
            first.aggregate,
            Some(AggregateValue {
                aggregation: Aggregation::Sum,
                value: 11.0
            })
        );
    }

    #[test]
    fn aggregation_is_not_written_back() {
        let router = router();
        let mut registry = SubscriptionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.insert(
            SubscriptionId(1),
            SubscriptionSpec::new(["a"]).with_aggregation(Aggregation::Count),
            tx,
        );
        router.ingest_single(&mut registry, json!({"metricName": "a", "value": 5}));
        assert_eq!(router.store().get("a").unwrap().latest.value, 5.0);
        assert_eq!(router.store().len(), 1);
    }

    #[test]
    fn dead_subscribers_are_pruned() {
        let router = router();
        let mut registry = SubscriptionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.insert(SubscriptionId(7), SubscriptionSpec::new(["cpu"]), tx);
        drop(rx);

        let outcome = router.ingest_batch(
            &mut registry,
            vec![
                json!({"metricName": "cpu", "value": 1}),
                json!({"metricName": "cpu", "value": 2}),
            ],
        );
        assert_eq!(outcome.pruned, vec![SubscriptionId(7)]);
        assert!(registry.is_empty());
        assert_eq!(router.store().history("cpu").len(), 2);
    }
}
