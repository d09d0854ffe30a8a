//! 메트릭 스트리밍 클라이언트.
//!
//! 명시적으로 생성하는 클라이언트 하나가 연결 하나를 소유한다.
//! 생성 시 연결 관리 태스크를 spawn하므로 tokio 런타임 안에서 호출해야 한다.

use metricflow_core::config::ClientConfig;
use metricflow_core::models::connection::{ConnectionState, LifecycleEvent};
use metricflow_core::models::metric::MetricEvent;
use metricflow_core::models::subscription::{SubscriptionId, SubscriptionSpec};
use metricflow_core::ports::token::TokenProvider;
use metricflow_core::ports::transport::StreamTransport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::debug;

use crate::backoff::ReconnectPolicy;
use crate::connection::{Command, ConnectionManager, ConnectionStats};
use crate::error::StreamError;
use crate::invoker::RemoteInvoker;
use crate::router::MetricEventRouter;
use crate::store::{MetricState, MetricStore};
use crate::subscription::Subscription;
use crate::tracker::{MetricPoint, MetricStats};

/// 라이프사이클 이벤트 버퍼 크기
const LIFECYCLE_CAPACITY: usize = 64;

/// 실시간 메트릭 스트리밍 클라이언트
#[derive(Clone)]
pub struct MetricsClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<LifecycleEvent>,
    store: Arc<MetricStore>,
    next_subscription_id: Arc<AtomicU64>,
    invoker: RemoteInvoker,
}

impl MetricsClient {
    /// 클라이언트 생성 (연결은 `connect()` 호출 시 수립)
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn StreamTransport>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(LIFECYCLE_CAPACITY);
        let store = Arc::new(MetricStore::new(config.history.capacity));

        let manager = ConnectionManager::new(
            transport,
            tokens,
            ReconnectPolicy::from_config(&config.reconnect),
            MetricEventRouter::new(store.clone()),
            state_tx,
            events.clone(),
        );
        tokio::spawn(manager.run(command_rx));

        let invoker = RemoteInvoker::new(commands.clone(), state.clone(), config.remote.timeout());
        debug!("메트릭 클라이언트 생성: {}", config.server.base_url);

        Self {
            commands,
            state,
            events,
            store,
            next_subscription_id: Arc::new(AtomicU64::new(1)),
            invoker,
        }
    }

    /// 연결 (멱등). 진행 중인 시도가 있으면 그 결과를 기다린다
    pub async fn connect(&self) -> Result<(), StreamError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect { reply })?;
        rx.await.unwrap_or_else(|_| Err(StreamError::Closed))
    }

    /// 연결 해제. 구독 레지스트리가 비워지고 구독 스트림이 종료된다
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Disconnect { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// 구독 등록. 연결 전이면 다음 연결 시 전송된다
    pub fn subscribe(&self, spec: SubscriptionSpec) -> Subscription {
        let id = SubscriptionId(self.next_subscription_id.fetch_add(1, Ordering::Relaxed));
        let (updates, update_rx) = mpsc::unbounded_channel();

        // 태스크가 종료됐으면 송신 측이 함께 버려져 스트림이 바로 끝난다
        let _ = self.commands.send(Command::Subscribe {
            id,
            spec: spec.clone(),
            updates,
        });

        Subscription::new(id, spec, update_rx, self.commands.clone())
    }

    /// ID로 구독 해제. 미등록 ID는 무시
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), StreamError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Unsubscribe { id, reply })?;
        rx.await.unwrap_or_else(|_| Err(StreamError::Closed))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// 상태 변경 감시 채널
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// 라이프사이클 이벤트 구독 (알림/배너 싱크용)
    pub fn lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn metric(&self, name: &str) -> Option<MetricState> {
        self.store.get(name)
    }

    /// 전체 메트릭 최신 값
    pub fn metrics(&self) -> Vec<MetricEvent> {
        self.store.all()
    }

    pub fn metric_history(&self, name: &str) -> Vec<MetricPoint> {
        self.store.history(name)
    }

    pub fn metric_stats(&self, name: &str) -> Option<MetricStats> {
        self.store.stats(name)
    }

    /// 원격 호출 핸들
    pub fn invoker(&self) -> RemoteInvoker {
        self.invoker.clone()
    }

    /// 연결 상태 스냅샷
    pub async fn stats(&self) -> Result<ConnectionStats, StreamError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats { reply })?;
        rx.await.map_err(|_| StreamError::Closed)
    }

    fn send(&self, command: Command) -> Result<(), StreamError> {
        self.commands.send(command).map_err(|_| StreamError::Closed)
    }
}

impl std::fmt::Debug for MetricsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsClient")
            .field("state", &*self.state.borrow())
            .field("metrics", &self.store.len())
            .finish()
    }
}
