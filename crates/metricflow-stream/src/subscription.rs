//! 구독 핸들.
//!
//! `subscribe()`가 돌려주는 값 핸들. 갱신 스트림을 pull 방식으로 소비하고,
//! 명시적 `unsubscribe()` 또는 drop 시 등록이 해제된다.

use futures::Stream;
use metricflow_core::models::metric::MetricEvent;
use metricflow_core::models::subscription::{Aggregation, SubscriptionId, SubscriptionSpec};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};

use crate::connection::Command;
use crate::error::StreamError;

/// 팬아웃 시점의 집계 값
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateValue {
    pub aggregation: Aggregation,
    pub value: f64,
}

/// 구독자에게 전달되는 메트릭 갱신
#[derive(Debug, Clone, PartialEq)]
pub struct MetricUpdate {
    pub subscription_id: SubscriptionId,
    pub event: MetricEvent,
    /// 구독에 집계가 지정된 경우 멤버 메트릭 최신 값의 집계
    pub aggregate: Option<AggregateValue>,
}

/// 구독 스트림 항목
#[derive(Debug)]
pub enum SubscriptionUpdate {
    Metric(MetricUpdate),
    /// 서버가 구독을 거부함 (이후 스트림 종료)
    Rejected(StreamError),
}

/// 논리 구독 핸들
pub struct Subscription {
    id: SubscriptionId,
    spec: SubscriptionSpec,
    updates: mpsc::UnboundedReceiver<SubscriptionUpdate>,
    commands: mpsc::UnboundedSender<Command>,
    released: bool,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        spec: SubscriptionSpec,
        updates: mpsc::UnboundedReceiver<SubscriptionUpdate>,
        commands: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            id,
            spec,
            updates,
            commands,
            released: false,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn spec(&self) -> &SubscriptionSpec {
        &self.spec
    }

    /// 다음 갱신 대기. 구독이 해제되거나 클라이언트가 끊기면 None
    pub async fn next(&mut self) -> Option<SubscriptionUpdate> {
        self.updates.recv().await
    }

    /// 대기 없이 도착한 갱신 하나 꺼내기
    pub fn try_next(&mut self) -> Option<SubscriptionUpdate> {
        self.updates.try_recv().ok()
    }

    /// 구독 해제 (서버 응답까지 대기)
    pub async fn unsubscribe(mut self) -> Result<(), StreamError> {
        self.released = true;
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Unsubscribe { id: self.id, reply })
            .map_err(|_| StreamError::Closed)?;
        rx.await.unwrap_or_else(|_| Err(StreamError::Closed))
    }
}

impl Stream for Subscription {
    type Item = SubscriptionUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.updates.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.released {
            // 연결 태스크가 이미 종료됐으면 정리할 것이 없다
            let _ = self.commands.send(Command::Release { id: self.id });
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("spec", &self.spec)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn handle() -> (
        Subscription,
        mpsc::UnboundedSender<SubscriptionUpdate>,
        mpsc::UnboundedReceiver<Command>,
    ) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let sub = Subscription::new(
            SubscriptionId(1),
            SubscriptionSpec::new(["cpu"]),
            update_rx,
            command_tx,
        );
        (sub, update_tx, command_rx)
    }

    #[tokio::test]
    async fn stream_yields_updates_then_ends() {
        let (mut sub, tx, _commands) = handle();
        tx.send(SubscriptionUpdate::Metric(MetricUpdate {
            subscription_id: SubscriptionId(1),
            event: MetricEvent::new("cpu", 1.0),
            aggregate: None,
        }))
        .unwrap();
        drop(tx);

        assert!(matches!(sub.next().await, Some(SubscriptionUpdate::Metric(_))));
        assert!(StreamExt::next(&mut sub).await.is_none());
    }

    #[tokio::test]
    async fn drop_sends_release() {
        let (sub, _tx, mut commands) = handle();
        drop(sub);
        assert!(matches!(
            commands.recv().await,
            Some(Command::Release { id: SubscriptionId(1) })
        ));
    }

    #[tokio::test]
    async fn unsubscribe_does_not_release_twice() {
        let (sub, _tx, mut commands) = handle();
        let task = tokio::spawn(sub.unsubscribe());

        match commands.recv().await {
            Some(Command::Unsubscribe { id, reply }) => {
                assert_eq!(id, SubscriptionId(1));
                reply.send(Ok(())).unwrap();
            }
            _ => panic!("Unsubscribe 명령 기대"),
        }

        assert!(task.await.unwrap().is_ok());
        assert!(commands.recv().await.is_none());
    }
}
