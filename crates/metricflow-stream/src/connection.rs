//! 연결 관리자.
//!
//! 단일 태스크가 전송 연결, 구독 레지스트리, 대기 중인 요청 표, 재연결 타이머를
//! 모두 소유한다. 외부 호출은 `Command` 메시지로만 들어오므로 상태 변경은 항상 직렬화된다.
//!
//! 상태 전이:
//!
//! ```text
//! Disconnected/Failed --connect--> Connecting --성공--> Connected
//!                                       |                  |
//!                                       +--실패--> Reconnecting(n) <--연결 유실
//!                                                     |     |
//!                                           max_attempts   성공 → Connected (구독 재전송 후)
//!                                                     v
//!                                                  Failed
//! ```

use metricflow_core::models::connection::{ConnectionState, ErrorSource, LifecycleEvent};
use metricflow_core::models::metric::MetricEvent;
use metricflow_core::models::subscription::{SubscriptionId, SubscriptionSpec};
use metricflow_core::models::wire::{ClientMessage, ServerMessage, WireError};
use metricflow_core::ports::token::TokenProvider;
use metricflow_core::ports::transport::{FrameSender, InboundFrame, StreamTransport, TransportLink};
use serde::Serialize;
use std::collections::HashMap;
use std::future::pending;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backoff::ReconnectPolicy;
use crate::error::StreamError;
use crate::registry::SubscriptionRegistry;
use crate::router::{MetricEventRouter, RouteOutcome};
use crate::subscription::SubscriptionUpdate;

/// 원격 호출 종류
#[derive(Debug, Clone)]
pub(crate) enum RemoteRequest {
    History { metric: String, duration_ms: u64 },
    SendMetric(MetricEvent),
    Query(String),
}

impl RemoteRequest {
    fn into_message(self, request_id: u64) -> ClientMessage {
        match self {
            RemoteRequest::History {
                metric,
                duration_ms,
            } => ClientMessage::GetMetricHistory {
                request_id,
                metric,
                duration_ms,
            },
            RemoteRequest::SendMetric(event) => ClientMessage::SendMetric { request_id, event },
            RemoteRequest::Query(expression) => ClientMessage::QueryMetrics {
                request_id,
                expression,
            },
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, StreamError>>;

/// 연결 태스크로 보내는 명령
pub(crate) enum Command {
    Connect {
        reply: Reply<()>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Subscribe {
        id: SubscriptionId,
        spec: SubscriptionSpec,
        updates: mpsc::UnboundedSender<SubscriptionUpdate>,
    },
    Unsubscribe {
        id: SubscriptionId,
        reply: Reply<()>,
    },
    /// 핸들 drop에 의한 해제 (응답 없음)
    Release {
        id: SubscriptionId,
    },
    Invoke {
        request: RemoteRequest,
        reply: Reply<serde_json::Value>,
    },
    Stats {
        reply: oneshot::Sender<ConnectionStats>,
    },
}

/// 연결 상태 스냅샷
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStats {
    pub state: ConnectionState,
    /// 현재 재연결 주기의 시도 횟수 (연결이 안정될 때까지 유지)
    pub reconnect_attempts: u32,
    pub subscriptions: usize,
    pub metrics: usize,
    pub pending_requests: usize,
}

/// 응답 대기 중인 요청
enum PendingRequest {
    Subscribe(SubscriptionId),
    Unsubscribe {
        id: SubscriptionId,
        reply: Option<Reply<()>>,
    },
    Call(Reply<serde_json::Value>),
}

struct ActiveLink {
    sender: Arc<dyn FrameSender>,
    frames: mpsc::Receiver<InboundFrame>,
    opened_at: Instant,
}

/// 단일 연결 소유 태스크
pub(crate) struct ConnectionManager {
    transport: Arc<dyn StreamTransport>,
    tokens: Arc<dyn TokenProvider>,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<LifecycleEvent>,
    registry: SubscriptionRegistry,
    router: MetricEventRouter,
    link: Option<ActiveLink>,
    opening: Option<JoinHandle<Result<TransportLink, StreamError>>>,
    retry_at: Option<Instant>,
    attempts: u32,
    reconnect_started: Option<Instant>,
    was_connected: bool,
    connect_waiters: Vec<Reply<()>>,
    pending: HashMap<u64, PendingRequest>,
    next_request_id: u64,
}

impl ConnectionManager {
    pub(crate) fn new(
        transport: Arc<dyn StreamTransport>,
        tokens: Arc<dyn TokenProvider>,
        policy: ReconnectPolicy,
        router: MetricEventRouter,
        state_tx: watch::Sender<ConnectionState>,
        events: broadcast::Sender<LifecycleEvent>,
    ) -> Self {
        Self {
            transport,
            tokens,
            policy,
            state_tx,
            events,
            registry: SubscriptionRegistry::new(),
            router,
            link: None,
            opening: None,
            retry_at: None,
            attempts: 0,
            reconnect_started: None,
            was_connected: false,
            connect_waiters: Vec::new(),
            pending: HashMap::new(),
            next_request_id: 0,
        }
    }

    /// 명령 채널이 닫힐 때까지 실행
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!("연결 관리 태스크 시작");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                frame = recv_frame(&mut self.link) => self.handle_frame(frame).await,
                opened = wait_open(&mut self.opening) => self.handle_open_result(opened).await,
                _ = wait_retry(self.retry_at) => {
                    self.retry_at = None;
                    self.attempts += 1;
                    info!("재연결 시도 #{}", self.attempts);
                    self.start_open();
                }
            }
        }

        self.close_session().await;
        debug!("연결 관리 태스크 종료");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => self.connect(reply),
            Command::Disconnect { reply } => {
                self.close_session().await;
                let _ = reply.send(());
            }
            Command::Subscribe { id, spec, updates } => {
                self.registry.insert(id, spec.clone(), updates);
                if self.link.is_some() {
                    self.send_subscribe(id, spec).await;
                } else {
                    debug!("연결 전 구독 등록 (재연결 시 전송): {id}");
                }
            }
            Command::Unsubscribe { id, reply } => self.unsubscribe(id, Some(reply)).await,
            Command::Release { id } => self.unsubscribe(id, None).await,
            Command::Invoke { request, reply } => {
                if self.link.is_none() {
                    let _ = reply.send(Err(StreamError::NotConnected));
                    return;
                }
                let request_id = self.next_request_id();
                self.pending.insert(request_id, PendingRequest::Call(reply));
                self.send(request.into_message(request_id)).await;
            }
            Command::Stats { reply } => {
                let _ = reply.send(ConnectionStats {
                    state: *self.state_tx.borrow(),
                    reconnect_attempts: self.attempts,
                    subscriptions: self.registry.len(),
                    metrics: self.router.store().len(),
                    pending_requests: self.pending.len(),
                });
            }
        }
    }

    fn connect(&mut self, reply: Reply<()>) {
        let state = *self.state_tx.borrow();
        if state.is_connected() {
            let _ = reply.send(Ok(()));
            return;
        }

        // 진행 중인 시도가 있으면 그 결과를 함께 기다린다
        self.connect_waiters.push(reply);
        if state.is_pending() {
            return;
        }

        self.attempts = 0;
        self.reconnect_started = None;
        self.set_state(ConnectionState::Connecting);
        self.emit(LifecycleEvent::Connecting);
        self.start_open();
    }

    async fn unsubscribe(&mut self, id: SubscriptionId, reply: Option<Reply<()>>) {
        if self.registry.remove(id).is_none() {
            // 미등록 ID는 조용히 무시
            if let Some(reply) = reply {
                let _ = reply.send(Ok(()));
            }
            return;
        }

        if self.link.is_none() {
            if let Some(reply) = reply {
                let _ = reply.send(Ok(()));
            }
            return;
        }

        let request_id = self.next_request_id();
        self.pending
            .insert(request_id, PendingRequest::Unsubscribe { id, reply });
        self.send(ClientMessage::Unsubscribe {
            request_id,
            subscription_id: id,
        })
        .await;
    }

    async fn send_subscribe(&mut self, id: SubscriptionId, spec: SubscriptionSpec) -> bool {
        let request_id = self.next_request_id();
        self.pending
            .insert(request_id, PendingRequest::Subscribe(id));
        self.send(ClientMessage::Subscribe {
            request_id,
            subscription_id: id,
            subscription: spec,
        })
        .await
    }

    /// 메시지 전송. 실패하면 연결 유실로 처리하고 false
    async fn send(&mut self, message: ClientMessage) -> bool {
        let Some(sender) = self.link.as_ref().map(|link| link.sender.clone()) else {
            return false;
        };

        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                error!("메시지 직렬화 실패: {e}");
                self.fail_pending(message.request_id(), StreamError::Core(e.into()));
                return true;
            }
        };

        match sender.send_text(&text).await {
            Ok(()) => true,
            Err(e) => {
                warn!("메시지 전송 실패: {e}");
                self.on_link_lost(format!("전송 실패: {e}"));
                false
            }
        }
    }

    fn fail_pending(&mut self, request_id: u64, error: StreamError) {
        match self.pending.remove(&request_id) {
            Some(PendingRequest::Call(reply)) => {
                let _ = reply.send(Err(error));
            }
            Some(PendingRequest::Unsubscribe { reply: Some(reply), .. }) => {
                let _ = reply.send(Err(error));
            }
            _ => {}
        }
    }

    fn next_request_id(&mut self) -> u64 {
        self.next_request_id += 1;
        self.next_request_id
    }

    // ── 연결 수립 ──

    fn start_open(&mut self) {
        let transport = self.transport.clone();
        let tokens = self.tokens.clone();
        self.opening = Some(tokio::spawn(async move {
            let token = tokens.get_token().await?;
            transport
                .open(&token)
                .await
                .map_err(|e| StreamError::Connection(e.to_string()))
        }));
    }

    async fn handle_open_result(&mut self, result: Result<TransportLink, StreamError>) {
        match result {
            Ok(link) => self.on_opened(link).await,
            Err(e) => {
                let message = match e {
                    StreamError::Connection(message) => message,
                    other => other.to_string(),
                };
                warn!("연결 실패: {message}");
                self.emit(LifecycleEvent::Error {
                    source: ErrorSource::Connection,
                    message: message.clone(),
                });
                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Err(StreamError::Connection(message.clone())));
                }
                if self.reconnect_started.is_none() {
                    self.reconnect_started = Some(Instant::now());
                }
                self.schedule_retry();
            }
        }
    }

    async fn on_opened(&mut self, link: TransportLink) {
        self.link = Some(ActiveLink {
            sender: link.sender,
            frames: link.frames,
            opened_at: Instant::now(),
        });
        // 재시도 횟수는 연결이 안정된 뒤 끊길 때 초기화한다
        let retries = self.attempts;
        self.set_state(ConnectionState::Connected);

        // 다른 명령보다 먼저 전체 구독 재전송
        let replay = self.registry.replay_list();
        let count = replay.len();
        for (id, spec) in replay {
            if !self.send_subscribe(id, spec).await {
                // 재전송 중 연결 유실: 대기자는 다음 시도 결과를 기다린다
                return;
            }
        }

        if self.was_connected {
            info!("재연결 완료 (시도 {retries}회, 구독 {count}개 재전송)");
            self.emit(LifecycleEvent::Reconnected);
        } else {
            info!("연결 완료 (구독 {count}개 전송)");
            self.emit(LifecycleEvent::Connected);
        }
        self.was_connected = true;

        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
    }

    fn schedule_retry(&mut self) {
        let elapsed = self
            .reconnect_started
            .map(|started| started.elapsed())
            .unwrap_or_default();

        match self.policy.next_delay(self.attempts, elapsed) {
            Some(delay) => {
                let attempt = self.attempts + 1;
                info!("{}ms 후 재연결 시도 #{attempt}", delay.as_millis());
                self.set_state(ConnectionState::Reconnecting { attempt });
                self.emit(LifecycleEvent::Reconnecting {
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                });
                self.retry_at = Some(Instant::now() + delay);
            }
            None => {
                error!("재연결 포기: {}회 시도 실패", self.attempts);
                self.set_state(ConnectionState::Failed);
                self.emit(LifecycleEvent::Failed {
                    attempts: self.attempts,
                });
                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Err(StreamError::Connection(
                        "최대 재연결 시도 초과".to_string(),
                    )));
                }
            }
        }
    }

    // ── 수신 처리 ──

    async fn handle_frame(&mut self, frame: Option<InboundFrame>) {
        match frame {
            Some(InboundFrame::Text(text)) => self.handle_text(&text).await,
            Some(InboundFrame::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => self.handle_text(&text).await,
                Err(_) => self.report_protocol_error("UTF-8이 아닌 바이너리 프레임".to_string()),
            },
            Some(InboundFrame::Close) | None => self.on_link_lost("서버가 연결을 종료함".to_string()),
        }
    }

    async fn handle_text(&mut self, text: &str) {
        let message: ServerMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                self.report_protocol_error(format!("메시지 파싱 실패: {e}"));
                return;
            }
        };

        match message {
            ServerMessage::MetricUpdate { event } => {
                let outcome = self.router.ingest_single(&mut self.registry, event);
                self.after_route(outcome).await;
            }
            ServerMessage::MetricBatchUpdate { events } => {
                let outcome = self.router.ingest_batch(&mut self.registry, events);
                self.after_route(outcome).await;
            }
            ServerMessage::Completion {
                request_id,
                result,
                error,
            } => self.complete(request_id, result, error),
            ServerMessage::Error { message, code } => {
                warn!("서버 에러: {message} (code={code:?})");
                self.emit(LifecycleEvent::Error {
                    source: ErrorSource::Server,
                    message,
                });
            }
            ServerMessage::Ping => debug!("ping 수신"),
        }
    }

    async fn after_route(&mut self, outcome: RouteOutcome) {
        for rejected in outcome.rejected {
            self.report_protocol_error(rejected.to_string());
        }
        for id in outcome.pruned {
            if self.link.is_none() {
                break;
            }
            let request_id = self.next_request_id();
            self.pending
                .insert(request_id, PendingRequest::Unsubscribe { id, reply: None });
            if !self
                .send(ClientMessage::Unsubscribe {
                    request_id,
                    subscription_id: id,
                })
                .await
            {
                break;
            }
        }
    }

    fn complete(
        &mut self,
        request_id: u64,
        result: Option<serde_json::Value>,
        error: Option<WireError>,
    ) {
        let Some(pending) = self.pending.remove(&request_id) else {
            debug!("대기 중이 아닌 응답 무시: requestId={request_id}");
            return;
        };

        match (pending, error) {
            (PendingRequest::Subscribe(id), Some(error)) => {
                warn!("구독 거부 {id}: {}", error.message);
                self.registry.reject(
                    id,
                    StreamError::Subscription {
                        subscription_id: id,
                        message: error.message,
                        code: error.code,
                    },
                );
            }
            (PendingRequest::Subscribe(id), None) => debug!("구독 확인: {id}"),
            (PendingRequest::Unsubscribe { id, reply }, error) => {
                let result = match error {
                    Some(error) => Err(StreamError::Subscription {
                        subscription_id: id,
                        message: error.message,
                        code: error.code,
                    }),
                    None => Ok(()),
                };
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            (PendingRequest::Call(reply), Some(error)) => {
                let _ = reply.send(Err(StreamError::RemoteCall {
                    message: error.message,
                    code: error.code,
                }));
            }
            (PendingRequest::Call(reply), None) => {
                let _ = reply.send(Ok(result.unwrap_or(serde_json::Value::Null)));
            }
        }
    }

    fn report_protocol_error(&self, message: String) {
        warn!("프로토콜 에러: {message}");
        self.emit(LifecycleEvent::Error {
            source: ErrorSource::Protocol,
            message,
        });
    }

    // ── 종료 ──

    /// 대기 요청 정리: 원격 호출은 실패, 구독 해지는 이미 로컬에서 완료
    fn drain_pending(&mut self) {
        for (_, pending) in self.pending.drain() {
            match pending {
                PendingRequest::Call(reply) => {
                    let _ = reply.send(Err(StreamError::connection_lost()));
                }
                PendingRequest::Unsubscribe {
                    reply: Some(reply), ..
                } => {
                    let _ = reply.send(Ok(()));
                }
                _ => {}
            }
        }
    }

    fn on_link_lost(&mut self, reason: String) {
        let Some(link) = self.link.take() else {
            return;
        };
        let lived = link.opened_at.elapsed();
        warn!("연결 유실 ({}ms 유지): {reason}", lived.as_millis());
        self.drain_pending();
        self.emit(LifecycleEvent::Error {
            source: ErrorSource::Connection,
            message: reason,
        });

        if self.policy.is_stable(lived) {
            self.attempts = 0;
            self.reconnect_started = Some(Instant::now());
        } else {
            debug!("불안정한 연결: 재연결 주기 유지 (시도 {}회)", self.attempts);
            self.reconnect_started.get_or_insert_with(Instant::now);
        }
        self.schedule_retry();
    }

    async fn close_session(&mut self) {
        let previous = *self.state_tx.borrow();

        if let Some(opening) = self.opening.take() {
            opening.abort();
        }
        self.retry_at = None;
        self.attempts = 0;
        self.reconnect_started = None;

        if let Some(link) = self.link.take() {
            if let Err(e) = link.sender.close().await {
                debug!("연결 종료 중 에러 무시: {e}");
            }
        }

        self.drain_pending();
        self.registry.clear();
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(StreamError::Connection("연결 해제됨".to_string())));
        }
        self.was_connected = false;

        if previous != ConnectionState::Disconnected {
            info!("연결 해제");
            self.set_state(ConnectionState::Disconnected);
            self.emit(LifecycleEvent::Closed);
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: LifecycleEvent) {
        // 구독자가 없으면 버린다
        let _ = self.events.send(event);
    }
}

async fn recv_frame(link: &mut Option<ActiveLink>) -> Option<InboundFrame> {
    match link {
        Some(link) => link.frames.recv().await,
        None => pending().await,
    }
}

async fn wait_open(
    opening: &mut Option<JoinHandle<Result<TransportLink, StreamError>>>,
) -> Result<TransportLink, StreamError> {
    let Some(handle) = opening.as_mut() else {
        return pending().await;
    };
    let result = handle.await;
    *opening = None;
    match result {
        Ok(result) => result,
        Err(e) => Err(StreamError::Connection(format!("연결 태스크 실패: {e}"))),
    }
}

async fn wait_retry(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}
