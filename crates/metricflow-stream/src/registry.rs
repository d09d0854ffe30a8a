//! 구독 레지스트리.
//!
//! 연결 태스크만 소유하고 변경한다. 키가 생성 순서대로 증가하는 ID이므로
//! `BTreeMap` 순회 순서가 곧 재연결 시 재전송 순서다.

use metricflow_core::models::metric::MetricEvent;
use metricflow_core::models::subscription::{SubscriptionId, SubscriptionSpec};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

use crate::error::StreamError;
use crate::subscription::SubscriptionUpdate;

#[derive(Debug)]
struct Registered {
    spec: SubscriptionSpec,
    updates: mpsc::UnboundedSender<SubscriptionUpdate>,
}

/// 논리 구독 목록
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: BTreeMap<SubscriptionId, Registered>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 구독 등록 (중복 제거 없음)
    pub fn insert(
        &mut self,
        id: SubscriptionId,
        spec: SubscriptionSpec,
        updates: mpsc::UnboundedSender<SubscriptionUpdate>,
    ) {
        self.entries.insert(id, Registered { spec, updates });
    }

    /// 구독 제거. 미등록 ID면 None
    pub fn remove(&mut self, id: SubscriptionId) -> Option<SubscriptionSpec> {
        self.entries.remove(&id).map(|entry| entry.spec)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 재전송용 스냅샷 (생성 순)
    pub fn replay_list(&self) -> Vec<(SubscriptionId, SubscriptionSpec)> {
        self.entries
            .iter()
            .map(|(id, entry)| (*id, entry.spec.clone()))
            .collect()
    }

    /// 이벤트와 일치하는 구독 (생성 순)
    pub fn matching<'a>(
        &'a self,
        event: &'a MetricEvent,
    ) -> impl Iterator<Item = (SubscriptionId, &'a SubscriptionSpec)> + 'a {
        self.entries
            .iter()
            .filter(move |(_, entry)| entry.spec.matches(event))
            .map(|(id, entry)| (*id, &entry.spec))
    }

    /// 구독자에게 갱신 전달. 수신 측이 사라졌으면 false
    pub fn deliver(&self, id: SubscriptionId, update: SubscriptionUpdate) -> bool {
        match self.entries.get(&id) {
            Some(entry) => entry.updates.send(update).is_ok(),
            None => false,
        }
    }

    /// 서버 거부를 구독자에게 알리고 등록 제거 (스트림 종료)
    pub fn reject(&mut self, id: SubscriptionId, error: StreamError) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                let _ = entry.updates.send(SubscriptionUpdate::Rejected(error));
                true
            }
            None => false,
        }
    }

    /// 전체 제거. 모든 구독 스트림이 종료된다
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
