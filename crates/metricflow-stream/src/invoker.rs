//! 원격 호출기.
//!
//! 같은 스트리밍 연결 위에서 요청 ID로 다중화되는 요청/응답 호출.
//! 연결되지 않았으면 I/O 없이 즉시 `NotConnected`를 반환하며 대기열에 쌓지 않는다.
//! 응답은 호출자에게만 전달되고 메트릭 저장소에는 반영되지 않는다.

use metricflow_core::models::connection::ConnectionState;
use metricflow_core::models::metric::MetricEvent;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::connection::{Command, RemoteRequest};
use crate::error::StreamError;

/// 원격 호출 핸들 (복제 가능)
#[derive(Clone)]
pub struct RemoteInvoker {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    timeout: Option<Duration>,
}

impl RemoteInvoker {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Command>,
        state: watch::Receiver<ConnectionState>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            commands,
            state,
            timeout,
        }
    }

    /// 호출 타임아웃 지정 (기본: 없음)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// 최근 `duration` 동안의 메트릭 이력 조회
    pub async fn get_history(
        &self,
        metric: &str,
        duration: Duration,
    ) -> Result<Vec<MetricEvent>, StreamError> {
        let result = self
            .call(RemoteRequest::History {
                metric: metric.to_string(),
                duration_ms: duration.as_millis() as u64,
            })
            .await?;

        if result.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(result)
            .map_err(|e| StreamError::Protocol(format!("이력 응답 파싱 실패: {e}")))
    }

    /// 클라이언트 측 메트릭 발행
    pub async fn send_metric(&self, event: MetricEvent) -> Result<(), StreamError> {
        self.call(RemoteRequest::SendMetric(event)).await.map(|_| ())
    }

    /// 임의 질의 (결과는 해석하지 않고 그대로 반환)
    pub async fn query(&self, expression: &str) -> Result<serde_json::Value, StreamError> {
        self.call(RemoteRequest::Query(expression.to_string())).await
    }

    async fn call(&self, request: RemoteRequest) -> Result<serde_json::Value, StreamError> {
        if !self.state.borrow().is_connected() {
            return Err(StreamError::NotConnected);
        }

        debug!("원격 호출: {request:?}");
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Invoke { request, reply })
            .map_err(|_| StreamError::Closed)?;

        let response = async { rx.await.unwrap_or_else(|_| Err(StreamError::Closed)) };
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, response)
                .await
                .map_err(|_| StreamError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })?,
            None => response.await,
        }
    }
}

impl std::fmt::Debug for RemoteInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteInvoker")
            .field("state", &*self.state.borrow())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn not_connected_fails_without_sending() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Reconnecting { attempt: 2 });
        let invoker = RemoteInvoker::new(tx, state_rx, None);

        let err = invoker.query("sum(orders)").await.unwrap_err();
        assert!(matches!(err, StreamError::NotConnected));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let invoker =
            RemoteInvoker::new(tx, state_rx, None).with_timeout(Duration::from_millis(20));

        // 응답하지 않는 연결 태스크: 명령만 붙잡고 있는다
        let holder = tokio::spawn(async move {
            let command = rx.recv().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(command);
        });

        let err = invoker.query("q").await.unwrap_err();
        assert!(matches!(err, StreamError::Timeout { timeout_ms: 20 }));
        holder.abort();
    }

    #[tokio::test]
    async fn history_null_result_is_empty() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let invoker = RemoteInvoker::new(tx, state_rx, None);

        tokio::spawn(async move {
            if let Some(Command::Invoke { reply, .. }) = rx.recv().await {
                let _ = reply.send(Ok(serde_json::Value::Null));
            }
        });

        let history = invoker
            .get_history("cpu", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn closed_client_is_reported() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let invoker = RemoteInvoker::new(tx, state_rx, None);

        assert!(matches!(
            invoker.send_metric(MetricEvent::new("cpu", 1.0)).await,
            Err(StreamError::Closed)
        ));
    }
}
