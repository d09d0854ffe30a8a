//! 연결 상태 모델.
//!
//! 단일 스트리밍 연결의 상태 머신과 UI/알림 계층이 구독하는 라이프사이클 이벤트.

use serde::{Deserialize, Serialize};

/// 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ConnectionState {
    /// 연결 없음 (초기 상태 또는 disconnect 이후)
    Disconnected,
    /// 최초 연결 시도 중
    Connecting,
    /// 연결됨
    Connected,
    /// 연결 유실 후 재연결 대기/시도 중
    Reconnecting {
        /// 1부터 시작하는 재연결 시도 번호
        attempt: u32,
    },
    /// 최대 재시도 소진 (종료 상태, 명시적 connect로만 재시작)
    Failed,
}

impl ConnectionState {
    /// 연결됨 여부
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// 연결 수립이 진행 중인지 (Connecting/Reconnecting)
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Reconnecting { attempt } => write!(f, "Reconnecting({attempt})"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

/// 에러 발생 위치
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSource {
    /// 전송 계층 연결 실패
    Connection,
    /// 잘못된 메시지/이벤트
    Protocol,
    /// 서버가 보낸 에러 메시지
    Server,
}

/// 라이프사이클 이벤트: 외부 알림/배너 컴포넌트가 싱크로 소비
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LifecycleEvent {
    Connecting,
    Connected,
    #[serde(rename_all = "camelCase")]
    Reconnecting {
        attempt: u32,
        delay_ms: u64,
    },
    Reconnected,
    Closed,
    Error {
        source: ErrorSource,
        message: String,
    },
    Failed {
        attempts: u32,
    },
}
