//! 구독 모델.
//!
//! 호출자가 등록하는 논리적 구독(메트릭 이름 집합 + 필터 + 집계)을 정의.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::error::CoreError;
use crate::models::metric::MetricEvent;

/// 구독 식별자 (클라이언트 내에서 단조 증가)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// 다중 메트릭 집계 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl Aggregation {
    /// 값 목록에 집계 적용 (빈 목록이면 None, Count는 0)
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        match self {
            Aggregation::Count => Some(values.len() as f64),
            _ if values.is_empty() => None,
            Aggregation::Sum => Some(values.iter().sum()),
            Aggregation::Avg => Some(values.iter().sum::<f64>() / values.len() as f64),
            Aggregation::Min => Some(values.iter().copied().fold(f64::INFINITY, f64::min)),
            Aggregation::Max => Some(values.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        }
    }
}

impl FromStr for Aggregation {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(Aggregation::Sum),
            "avg" => Ok(Aggregation::Avg),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "count" => Ok(Aggregation::Count),
            other => Err(CoreError::Validation {
                field: "aggregation".to_string(),
                message: format!("알 수 없는 집계 방식: {other}"),
            }),
        }
    }
}

/// 구독 명세
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSpec {
    /// 관심 메트릭 이름 집합
    pub metric_names: BTreeSet<String>,
    /// 차원 필터 (모든 key=value가 일치해야 전달)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<BTreeMap<String, String>>,
    /// 팬아웃 시 계산할 집계
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,
    /// 서버 측 샘플링 간격 (밀리초)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_interval_ms: Option<u64>,
}

impl SubscriptionSpec {
    /// 메트릭 이름 목록으로 구독 명세 생성
    pub fn new<I, S>(metric_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metric_names: metric_names.into_iter().map(Into::into).collect(),
            filters: None,
            aggregation: None,
            sampling_interval_ms: None,
        }
    }

    /// 차원 필터 추가
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// 집계 방식 지정
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    /// 샘플링 간격 지정
    pub fn with_sampling_interval(mut self, interval_ms: u64) -> Self {
        self.sampling_interval_ms = Some(interval_ms);
        self
    }

    /// 메트릭 이름 포함 여부
    pub fn includes(&self, metric_name: &str) -> bool {
        self.metric_names.contains(metric_name)
    }

    /// 이벤트가 이 구독으로 전달되어야 하는지
    pub fn matches(&self, event: &MetricEvent) -> bool {
        if !self.includes(&event.metric_name) {
            return false;
        }
        match &self.filters {
            Some(filters) => event.matches_filters(filters),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregation_apply() {
        let values = [4.0, 1.0, 7.0];
        assert_eq!(Aggregation::Sum.apply(&values), Some(12.0));
        assert_eq!(Aggregation::Avg.apply(&values), Some(4.0));
        assert_eq!(Aggregation::Min.apply(&values), Some(1.0));
        assert_eq!(Aggregation::Max.apply(&values), Some(7.0));
        assert_eq!(Aggregation::Count.apply(&values), Some(3.0));
    }

    #[test]
    fn aggregation_on_empty() {
        assert_eq!(Aggregation::Sum.apply(&[]), None);
        assert_eq!(Aggregation::Count.apply(&[]), Some(0.0));
    }

    #[test]
    fn aggregation_from_str() {
        assert_eq!("AVG".parse::<Aggregation>().unwrap(), Aggregation::Avg);
        assert!("median".parse::<Aggregation>().is_err());
    }

    #[test]
    fn spec_matches_name_and_filters() {
        let spec = SubscriptionSpec::new(["orders", "refunds"]).with_filter("region", "eu");

        let eu = MetricEvent::new("orders", 3.0).with_dimension("region", "eu");
        let us = MetricEvent::new("orders", 3.0).with_dimension("region", "us");
        let other = MetricEvent::new("visits", 3.0).with_dimension("region", "eu");

        assert!(spec.matches(&eu));
        assert!(!spec.matches(&us));
        assert!(!spec.matches(&other));
    }

    #[test]
    fn spec_without_filters_matches_any_dimensions() {
        let spec = SubscriptionSpec::new(["orders"]);
        assert!(spec.matches(&MetricEvent::new("orders", 1.0)));
        assert!(spec.matches(&MetricEvent::new("orders", 1.0).with_dimension("a", "b")));
    }

    #[test]
    fn spec_wire_format() {
        let spec = SubscriptionSpec::new(["b", "a"])
            .with_aggregation(Aggregation::Sum)
            .with_sampling_interval(500);
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["metricNames"], serde_json::json!(["a", "b"]));
        assert_eq!(json["aggregation"], "sum");
        assert_eq!(json["samplingIntervalMs"], 500);
        assert!(json.get("filters").is_none());
    }

    #[test]
    fn subscription_id_display() {
        assert_eq!(SubscriptionId(7).to_string(), "sub-7");
    }
}
