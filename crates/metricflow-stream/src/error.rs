//! 스트리밍 코어 에러 타입.

use metricflow_core::error::CoreError;
use metricflow_core::models::subscription::SubscriptionId;
use thiserror::Error;

/// 스트리밍 코어 에러
///
/// - `Connection`: 재연결 루프가 복구하며 라이프사이클 이벤트로만 노출
/// - `Protocol`: 보고 후 무시 (배치 나머지는 계속 처리)
/// - `Subscription`: 해당 구독/해지를 요청한 호출자에게 전달
/// - `RemoteCall`/`NotConnected`/`Timeout`: 원격 호출자에게 즉시 반환
#[derive(Debug, Error)]
pub enum StreamError {
    /// 전송 계층 연결 실패
    #[error("연결 실패: {0}")]
    Connection(String),

    /// 잘못된 메시지/이벤트
    #[error("프로토콜 에러: {0}")]
    Protocol(String),

    /// 서버가 Subscribe/Unsubscribe를 거부
    #[error("구독 거부 ({subscription_id}): {message}")]
    Subscription {
        subscription_id: SubscriptionId,
        message: String,
        code: Option<String>,
    },

    /// 서버 측 원격 호출 실패 또는 응답 전 연결 유실
    #[error("원격 호출 실패: {message}")]
    RemoteCall {
        message: String,
        code: Option<String>,
    },

    /// 연결되지 않은 상태에서 원격 호출 시도
    #[error("연결되지 않음")]
    NotConnected,

    /// 원격 호출 타임아웃
    #[error("원격 호출 타임아웃: {timeout_ms}ms 초과")]
    Timeout { timeout_ms: u64 },

    /// 연결 관리 태스크 종료됨
    #[error("스트리밍 클라이언트 종료됨")]
    Closed,

    /// 코어 에러 (토큰, 직렬화 등)
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StreamError {
    /// 서버 응답 없이 연결이 끊긴 원격 호출
    pub(crate) fn connection_lost() -> Self {
        StreamError::RemoteCall {
            message: "응답 수신 전 연결 유실".to_string(),
            code: None,
        }
    }
}
