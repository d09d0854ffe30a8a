//! # metricflow-stream
//!
//! 실시간 메트릭 스트리밍 코어.
//! 단일 다중화 연결 위에서 여러 논리 구독을 관리하고, 연결이 끊기면 구독 상태를
//! 재전송해 복구하며, 수신 이벤트로 메트릭별 이력과 추세를 유지한다.
//!
//! ## 구조
//!
//! - [`client`]: `MetricsClient` 퍼사드 (연결 관리 태스크 spawn)
//! - [`connection`]: 연결 상태 머신, 재연결, 구독 재전송 (단일 소유 태스크)
//! - [`registry`]: 논리 구독 목록 (생성 순서 = 재전송 순서)
//! - [`router`]: 이벤트 검증/일괄 반영/팬아웃
//! - [`tracker`]: 메트릭 이력 버퍼, 추세/통계
//! - [`store`]: 공유 메트릭 저장소 (읽기 전용 스냅샷)
//! - [`invoker`]: 같은 연결 위의 요청/응답 호출
//! - [`backoff`]: 재연결 지연 정책
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! let client = MetricsClient::new(&config, transport, tokens);
//! client.connect().await?;
//!
//! let mut sub = client.subscribe(SubscriptionSpec::new(["orders.per_minute"]));
//! while let Some(update) = sub.next().await {
//!     // ...
//! }
//! ```

pub mod backoff;
pub mod client;
pub mod connection;
pub mod error;
pub mod invoker;
pub mod registry;
pub mod router;
pub mod store;
pub mod subscription;
pub mod tracker;

pub use client::MetricsClient;
pub use connection::ConnectionStats;
pub use error::StreamError;
pub use invoker::RemoteInvoker;
pub use subscription::{AggregateValue, MetricUpdate, Subscription, SubscriptionUpdate};
