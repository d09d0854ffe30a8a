//! 라이프사이클 알림.
//!
//! 연결 라이프사이클 이벤트를 사용자 알림(로그 배너)으로 변환한다.
//! 재연결 알림은 첫 시도와 5회마다만 내보내 로그 폭주를 막는다.

use metricflow_core::models::connection::{ErrorSource, LifecycleEvent};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

/// 재연결 알림 간격 (시도 횟수)
const RECONNECT_NOTICE_EVERY: u32 = 5;

/// 알림 심각도
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// 사용자 알림
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub severity: Severity,
    pub title: String,
    pub body: String,
}

impl Notice {
    fn new(severity: Severity, title: &str, body: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.to_string(),
            body: body.into(),
        }
    }

    fn emit(&self) {
        match self.severity {
            Severity::Info => info!("[{}] {}", self.title, self.body),
            Severity::Warning => warn!("[{}] {}", self.title, self.body),
            Severity::Critical => error!("[{}] {}", self.title, self.body),
        }
    }
}

/// 이벤트 → 알림. 알릴 필요 없는 이벤트는 None
pub fn notice_for(event: &LifecycleEvent) -> Option<Notice> {
    match event {
        LifecycleEvent::Connecting => None,
        LifecycleEvent::Connected => Some(Notice::new(
            Severity::Info,
            "연결됨",
            "메트릭 서버에 연결되었습니다",
        )),
        LifecycleEvent::Reconnecting { attempt, delay_ms } => {
            if *attempt == 1 || attempt % RECONNECT_NOTICE_EVERY == 0 {
                Some(Notice::new(
                    Severity::Warning,
                    "재연결 중",
                    format!("{}초 후 재연결 시도 #{attempt}", delay_ms / 1000),
                ))
            } else {
                None
            }
        }
        LifecycleEvent::Reconnected => Some(Notice::new(
            Severity::Info,
            "재연결됨",
            "연결이 복구되어 구독을 다시 등록했습니다",
        )),
        LifecycleEvent::Closed => Some(Notice::new(Severity::Info, "연결 종료", "연결을 닫았습니다")),
        LifecycleEvent::Error { source, message } => {
            let title = match source {
                ErrorSource::Connection => "연결 에러",
                ErrorSource::Protocol => "프로토콜 에러",
                ErrorSource::Server => "서버 에러",
            };
            Some(Notice::new(Severity::Warning, title, message.clone()))
        }
        LifecycleEvent::Failed { attempts } => Some(Notice::new(
            Severity::Critical,
            "연결 실패",
            format!("재연결 {attempts}회 실패, 재시도를 중단합니다"),
        )),
    }
}

/// 라이프사이클 이벤트 소비 루프 (종료 신호까지)
pub async fn run(
    mut events: broadcast::Receiver<LifecycleEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => match notice_for(&event) {
                    Some(notice) => notice.emit(),
                    None => debug!("라이프사이클: {event:?}"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("라이프사이클 이벤트 {skipped}건 누락");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    debug!("라이프사이클 알림 종료");
}
