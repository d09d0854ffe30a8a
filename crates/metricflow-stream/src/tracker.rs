//! 메트릭 이력 추적기.
//!
//! 메트릭별 슬라이딩 윈도우 (FIFO, 최대 크기 제한)와
//! 윈도우에서 매번 다시 계산하는 추세/요약 통계.

use chrono::{DateTime, Utc};
use metricflow_core::config::DEFAULT_HISTORY_CAPACITY;
use metricflow_core::models::metric::{MetricEvent, Trend};
use serde::Serialize;
use std::collections::VecDeque;

/// 추세 비교 구간 크기 (최근 10개 vs 그 이전 10개)
const TREND_WINDOW: usize = 10;

/// 추세 판정 임계 비율 (±5%)
const TREND_THRESHOLD: f64 = 0.05;

/// 이력 포인트
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricPoint {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&MetricEvent> for MetricPoint {
    fn from(event: &MetricEvent) -> Self {
        Self {
            value: event.value,
            timestamp: event.timestamp,
        }
    }
}

/// 요약 통계 (요청 시마다 버퍼에서 재계산)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricStats {
    pub latest: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    /// 직전 포인트 대비 변화율 (%). 포인트가 하나뿐이거나 직전 값이 0이면 None
    pub percent_change: Option<f64>,
    pub count: usize,
    pub trend: Trend,
}

/// 메트릭 이력 버퍼 (FIFO, 최대 크기 제한)
#[derive(Debug, Clone)]
pub struct MetricHistory {
    points: VecDeque<MetricPoint>,
    capacity: usize,
}

impl MetricHistory {
    /// 새 이력 버퍼 생성 (용량 최소 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// 포인트 추가. 용량 초과 시 가장 오래된 포인트를 제거해 반환
    pub fn push(&mut self, point: MetricPoint) -> Option<MetricPoint> {
        let evicted = if self.points.len() >= self.capacity {
            self.points.pop_front()
        } else {
            None
        };
        self.points.push_back(point);
        evicted
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 오래된 순서의 포인트 반복자
    pub fn iter(&self) -> impl Iterator<Item = &MetricPoint> {
        self.points.iter()
    }

    /// 포인트 복사본 (오래된 순)
    pub fn to_vec(&self) -> Vec<MetricPoint> {
        self.points.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<&MetricPoint> {
        self.points.back()
    }

    /// 추세 계산
    ///
    /// 포인트가 20개 미만이면 항상 `Stable` (희소 데이터에서 거짓 신호 방지).
    /// 그 외에는 최근 10개 평균을 직전 10개 평균과 비교해 ±5%를 넘으면 상승/하락.
    pub fn trend(&self) -> Trend {
        let len = self.points.len();
        if len < TREND_WINDOW * 2 {
            return Trend::Stable;
        }

        let recent_avg = self.mean_of(len - TREND_WINDOW, len);
        let older_avg = self.mean_of(len - TREND_WINDOW * 2, len - TREND_WINDOW);

        if recent_avg > older_avg * (1.0 + TREND_THRESHOLD) {
            Trend::Up
        } else if recent_avg < older_avg * (1.0 - TREND_THRESHOLD) {
            Trend::Down
        } else {
            Trend::Stable
        }
    }

    /// 요약 통계. 비어 있으면 None
    pub fn stats(&self) -> Option<MetricStats> {
        let latest = self.latest()?.value;

        let (min, max, sum) = self.points.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), p| (min.min(p.value), max.max(p.value), sum + p.value),
        );

        let percent_change = self
            .points
            .len()
            .checked_sub(2)
            .and_then(|i| self.points.get(i))
            .filter(|prev| prev.value != 0.0)
            .map(|prev| (latest - prev.value) / prev.value.abs() * 100.0);

        Some(MetricStats {
            latest,
            min,
            max,
            avg: sum / self.points.len() as f64,
            percent_change,
            count: self.points.len(),
            trend: self.trend(),
        })
    }

    fn mean_of(&self, start: usize, end: usize) -> f64 {
        let sum: f64 = self.points.range(start..end).map(|p| p.value).sum();
        sum / (end - start) as f64
    }
}

impl Default for MetricHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
