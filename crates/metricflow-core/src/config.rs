//! 클라이언트 설정 구조체.
//!
//! 서버 주소, 재연결 백오프, 이력 버퍼 용량, 원격 호출 타임아웃 등
//! 스트리밍 코어의 런타임 설정을 정의한다. `config` crate를 통해 파일/환경변수에서 로드.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CoreError;

/// 최상위 클라이언트 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// 메트릭 서버 연결 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// 재연결 정책
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// 메트릭별 이력 버퍼 설정
    #[serde(default)]
    pub history: HistoryConfig,
    /// 원격 호출(이력/쿼리/전송) 설정
    #[serde(default)]
    pub remote: RemoteConfig,
}

// ============================================================
// 서버 설정
// ============================================================

/// 메트릭 서버 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 서버 기본 URL (http/https, 전송 계층에서 ws/wss로 변환)
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 스트리밍 엔드포인트 경로
    #[serde(default = "default_hub_path")]
    pub hub_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            hub_path: default_hub_path(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_hub_path() -> String {
    "/hubs/metrics".to_string()
}

// ============================================================
// 재연결 설정
// ============================================================

/// 재연결 백오프 설정
///
/// 재연결 경과 시간이 `fast_window_ms` 미만이면
/// `min(이전 재시도 횟수 * step_ms, max_delay_ms)`, 이후에는 `slow_delay_ms` 고정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// 재시도 1회당 증가 지연 (밀리초)
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,
    /// 빠른 구간의 최대 지연 (밀리초)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// 빠른 구간 길이 (밀리초)
    #[serde(default = "default_fast_window_ms")]
    pub fast_window_ms: u64,
    /// 빠른 구간 이후 고정 지연 (밀리초)
    #[serde(default = "default_slow_delay_ms")]
    pub slow_delay_ms: u64,
    /// 최대 재시도 횟수 (None이면 무제한)
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            step_ms: default_step_ms(),
            max_delay_ms: default_max_delay_ms(),
            fast_window_ms: default_fast_window_ms(),
            slow_delay_ms: default_slow_delay_ms(),
            max_attempts: None,
        }
    }
}

fn default_step_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_fast_window_ms() -> u64 {
    60_000
}

fn default_slow_delay_ms() -> u64 {
    30_000
}

// ============================================================
// 이력 설정
// ============================================================

/// 메트릭 이력 버퍼 기본 용량
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// 메트릭별 슬라이딩 윈도우 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// 메트릭당 보관 포인트 수 (초과 시 가장 오래된 포인트 제거)
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

// ============================================================
// 원격 호출 설정
// ============================================================

/// 원격 호출 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// 호출 타임아웃 (밀리초, None이면 응답까지 무기한 대기)
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl RemoteConfig {
    /// 타임아웃을 `Duration`으로 반환
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl ClientConfig {
    /// 기본 설정값 반환
    pub fn default_config() -> Self {
        Self::default()
    }

    /// 설정값 유효성 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        let parsed = url::Url::parse(&self.server.base_url).map_err(|e| CoreError::Validation {
            field: "server.base_url".to_string(),
            message: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(CoreError::Validation {
                field: "server.base_url".to_string(),
                message: format!("지원하지 않는 스킴: {}", parsed.scheme()),
            });
        }

        if !self.server.hub_path.starts_with('/') {
            return Err(CoreError::Validation {
                field: "server.hub_path".to_string(),
                message: "'/'로 시작해야 함".to_string(),
            });
        }

        if self.history.capacity == 0 {
            return Err(CoreError::Validation {
                field: "history.capacity".to_string(),
                message: "0보다 커야 함".to_string(),
            });
        }

        if self.reconnect.max_delay_ms < self.reconnect.step_ms {
            return Err(CoreError::Validation {
                field: "reconnect.max_delay_ms".to_string(),
                message: "step_ms 이상이어야 함".to_string(),
            });
        }

        if self.remote.timeout_ms == Some(0) {
            return Err(CoreError::Validation {
                field: "remote.timeout_ms".to_string(),
                message: "0은 허용되지 않음 (무제한은 생략)".to_string(),
            });
        }

        Ok(())
    }
}
