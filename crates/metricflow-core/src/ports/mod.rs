//! 포트 인터페이스 (trait).
//!
//! Hexagonal Architecture의 포트 레이어.
//! `metricflow-network`가 이 trait들을 구현하며,
//! `metricflow-stream`은 `Arc<dyn T>`로만 의존한다 (테스트에서는 mock 구현 주입).
//!
//! 모든 async trait은 `async_trait` 매크로를 사용하여 object safety를 보장한다.

pub mod token;
pub mod transport;
