//! 메트릭 상태 저장소.
//!
//! 메트릭 이름 → (최신 이벤트, 이력, 추세). 쓰기는 라우터만 수행하고
//! 외부에는 복사본만 노출한다. 배치는 한 번의 쓰기 잠금 안에서 적용되므로
//! 읽는 쪽은 배치의 일부만 반영된 상태를 볼 수 없다.

use metricflow_core::config::DEFAULT_HISTORY_CAPACITY;
use metricflow_core::models::metric::{MetricEvent, Trend};
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::tracker::{MetricHistory, MetricPoint, MetricStats};

/// 메트릭 하나의 현재 상태 (읽기 전용 스냅샷)
#[derive(Debug, Clone)]
pub struct MetricState {
    pub latest: MetricEvent,
    pub history: Vec<MetricPoint>,
    pub trend: Trend,
}

#[derive(Debug)]
struct Entry {
    latest: MetricEvent,
    history: MetricHistory,
}

/// 공유 메트릭 저장소
#[derive(Debug)]
pub struct MetricStore {
    entries: RwLock<HashMap<String, Entry>>,
    capacity: usize,
}

impl MetricStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// 검증된 이벤트 묶음을 한 번에 적용
    pub(crate) fn apply_batch(&self, events: &[MetricEvent]) {
        if events.is_empty() {
            return;
        }

        let mut entries = self.entries.write();
        for event in events {
            let entry = entries
                .entry(event.metric_name.clone())
                .or_insert_with(|| Entry {
                    latest: event.clone(),
                    history: MetricHistory::new(self.capacity),
                });
            entry.latest = event.clone();
            entry.history.push(MetricPoint::from(event));
        }
    }

    /// 메트릭 상태 스냅샷
    pub fn get(&self, metric_name: &str) -> Option<MetricState> {
        self.entries.read().get(metric_name).map(|entry| MetricState {
            latest: entry.latest.clone(),
            history: entry.history.to_vec(),
            trend: entry.history.trend(),
        })
    }

    /// 전체 메트릭의 최신 이벤트 (이름순)
    pub fn all(&self) -> Vec<MetricEvent> {
        let mut latest: Vec<MetricEvent> = self
            .entries
            .read()
            .values()
            .map(|entry| entry.latest.clone())
            .collect();
        latest.sort_by(|a, b| a.metric_name.cmp(&b.metric_name));
        latest
    }

    /// 이력 포인트 (오래된 순)
    pub fn history(&self, metric_name: &str) -> Vec<MetricPoint> {
        self.entries
            .read()
            .get(metric_name)
            .map(|entry| entry.history.to_vec())
            .unwrap_or_default()
    }

    pub fn stats(&self, metric_name: &str) -> Option<MetricStats> {
        self.entries
            .read()
            .get(metric_name)
            .and_then(|entry| entry.history.stats())
    }

    /// 주어진 메트릭들 중 값이 있는 것의 최신 값
    pub fn latest_values<'a>(&self, metric_names: impl IntoIterator<Item = &'a String>) -> Vec<f64> {
        let entries = self.entries.read();
        metric_names
            .into_iter()
            .filter_map(|name| entries.get(name).map(|entry| entry.latest.value))
            .collect()
    }

    /// 추적 중인 메트릭 수
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn apply_updates_latest_and_history() {
        let store = MetricStore::new(10);
        store.apply_batch(&[
            MetricEvent::new("cpu", 1.0),
            MetricEvent::new("cpu", 2.0),
            MetricEvent::new("mem", 5.0),
        ]);

        let cpu = store.get("cpu").unwrap();
        assert_eq!(cpu.latest.value, 2.0);
        assert_eq!(cpu.history.len(), 2);
        assert_eq!(cpu.trend, Trend::Stable);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn unknown_metric_is_empty() {
        let store = MetricStore::default();
        assert!(store.get("nope").is_none());
        assert!(store.history("nope").is_empty());
        assert!(store.stats("nope").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn history_is_bounded_per_metric() {
        let store = MetricStore::new(5);
        let events: Vec<MetricEvent> = (0..12).map(|i| MetricEvent::new("cpu", i as f64)).collect();
        store.apply_batch(&events);

        let history = store.history("cpu");
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].value, 7.0);
    }

    #[test]
    fn all_sorted_by_name() {
        let store = MetricStore::default();
        store.apply_batch(&[MetricEvent::new("z", 1.0), MetricEvent::new("a", 2.0)]);
        let names: Vec<String> = store.all().into_iter().map(|e| e.metric_name).collect();
        assert_eq!(names, vec!["a", "z"]);
    }

    #[test]
    fn latest_values_skips_missing() {
        let store = MetricStore::default();
        store.apply_batch(&[MetricEvent::new("a", 2.0), MetricEvent::new("b", 3.0)]);
        let names: BTreeSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(store.latest_values(&names), vec![2.0, 3.0]);
    }
}
