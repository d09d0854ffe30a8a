//! 스트리밍 전송 포트.
//!
//! 구현: `metricflow-network` crate (tokio-tungstenite WebSocket)

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::CoreError;

/// 전송 계층에서 수신한 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// 텍스트 프레임 (JSON)
    Text(String),
    /// 바이너리 프레임
    Binary(Vec<u8>),
    /// 원격 종료
    Close,
}

/// 열린 연결의 송신 측
#[async_trait]
pub trait FrameSender: Send + Sync {
    /// 텍스트 프레임 전송
    async fn send_text(&self, text: &str) -> Result<(), CoreError>;

    /// 연결 종료
    async fn close(&self) -> Result<(), CoreError>;
}

/// 수립된 양방향 연결
///
/// 수신 채널이 닫히면 연결이 끊어진 것으로 간주한다.
pub struct TransportLink {
    pub sender: Arc<dyn FrameSender>,
    pub frames: mpsc::Receiver<InboundFrame>,
}

/// 세션당 하나의 양방향 스트리밍 엔드포인트를 여는 전송 계층
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// bearer 토큰으로 새 연결 수립
    async fn open(&self, token: &str) -> Result<TransportLink, CoreError>;
}
