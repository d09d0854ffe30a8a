//! 메트릭 이벤트 모델.
//!
//! 서버가 스트리밍하는 단일 관측값과 추세 방향을 정의.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// 단일 메트릭 관측값 (생성 후 불변)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricEvent {
    /// 이벤트 ID
    pub id: String,
    /// 메트릭 이름 (예: "orders.per_minute", "gmv.total")
    pub metric_name: String,
    /// 측정값
    pub value: f64,
    /// 측정 시각 (RFC 3339)
    pub timestamp: DateTime<Utc>,
    /// 차원 태그 (region, seller_tier 등)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<HashMap<String, String>>,
    /// 부가 메타데이터
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl MetricEvent {
    /// 현재 시각 기준 새 이벤트 생성
    pub fn new(metric_name: impl Into<String>, value: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            metric_name: metric_name.into(),
            value,
            timestamp: Utc::now(),
            dimensions: None,
            metadata: None,
        }
    }

    /// 차원 태그 추가
    pub fn with_dimension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// 측정 시각 지정
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 메타데이터 지정
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// 차원 값 조회
    pub fn dimension(&self, key: &str) -> Option<&str> {
        self.dimensions
            .as_ref()
            .and_then(|d| d.get(key))
            .map(String::as_str)
    }

    /// 필터의 모든 key=value가 차원에 존재하면 true (빈 필터는 항상 일치)
    pub fn matches_filters(&self, filters: &BTreeMap<String, String>) -> bool {
        filters
            .iter()
            .all(|(key, expected)| self.dimension(key) == Some(expected.as_str()))
    }
}

/// 최근 값의 추세 방향
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Stable,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Up => write!(f, "up"),
            Trend::Down => write!(f, "down"),
            Trend::Stable => write!(f, "stable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_is_camel_case() {
        let event = MetricEvent::new("orders.per_minute", 42.0).with_dimension("region", "eu");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["metricName"], "orders.per_minute");
        assert_eq!(json["dimensions"]["region"], "eu");
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn parses_server_event() {
        let data = r#"{
            "id": "evt_001",
            "metricName": "gmv.total",
            "value": 1250.5,
            "timestamp": "2026-03-01T09:00:00Z"
        }"#;
        let event: MetricEvent = serde_json::from_str(data).unwrap();
        assert_eq!(event.metric_name, "gmv.total");
        assert!(event.dimensions.is_none());
    }

    #[test]
    fn filters_require_every_pair() {
        let event = MetricEvent::new("cpu", 1.0)
            .with_dimension("region", "eu")
            .with_dimension("tier", "gold");

        let mut filters = BTreeMap::new();
        assert!(event.matches_filters(&filters));

        filters.insert("region".to_string(), "eu".to_string());
        assert!(event.matches_filters(&filters));

        filters.insert("tier".to_string(), "silver".to_string());
        assert!(!event.matches_filters(&filters));
    }

    #[test]
    fn filters_fail_without_dimensions() {
        let event = MetricEvent::new("cpu", 1.0);
        let mut filters = BTreeMap::new();
        filters.insert("region".to_string(), "eu".to_string());
        assert!(!event.matches_filters(&filters));
    }

    #[test]
    fn trend_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Trend::Up).unwrap(), r#""up""#);
        assert_eq!(Trend::default(), Trend::Stable);
    }
}
