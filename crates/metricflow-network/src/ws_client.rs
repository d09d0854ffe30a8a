//! WebSocket 전송 어댑터.
//!
//! `tokio-tungstenite` 기반 `StreamTransport` 포트 구현.
//! 연결마다 수신 태스크를 띄워 프레임을 채널로 넘기고, 송신은 `WsSender`가 담당한다.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metricflow_core::config::ServerConfig;
use metricflow_core::error::CoreError;
use metricflow_core::ports::transport::{FrameSender, InboundFrame, StreamTransport, TransportLink};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 수신 프레임 채널 용량
const FRAME_CHANNEL_CAPACITY: usize = 256;

/// WebSocket 전송: 메트릭 허브 엔드포인트에 연결
pub struct WsTransport {
    base_url: String,
    hub_path: String,
}

impl WsTransport {
    /// 새 WebSocket 전송 생성
    pub fn new(base_url: &str, hub_path: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            hub_path: hub_path.to_string(),
        }
    }

    /// 서버 설정으로 생성
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(&config.base_url, &config.hub_path)
    }

    /// 토큰을 포함한 ws/wss 엔드포인트 URL
    pub fn endpoint_url(&self, token: &str) -> Result<Url, CoreError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, self.hub_path))
            .map_err(|e| CoreError::Config(format!("잘못된 서버 URL: {e}")))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(CoreError::Config(format!("지원하지 않는 스킴: {other}")));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| CoreError::Config(format!("스킴 변환 실패: {scheme}")))?;
        url.query_pairs_mut().append_pair("access_token", token);
        Ok(url)
    }

    /// 수신 루프
    async fn read_loop(mut read: SplitStream<WsStream>, tx: mpsc::Sender<InboundFrame>) {
        while let Some(msg) = read.next().await {
            let frame = match msg {
                Ok(Message::Text(text)) => InboundFrame::Text(text.to_string()),
                Ok(Message::Binary(data)) => InboundFrame::Binary(data.to_vec()),
                Ok(Message::Close(_)) => {
                    let _ = tx.send(InboundFrame::Close).await;
                    break;
                }
                Ok(_) => continue, // Ping/Pong은 자동 처리
                Err(e) => {
                    warn!("WebSocket 수신 에러: {e}");
                    break;
                }
            };
            if tx.send(frame).await.is_err() {
                break;
            }
        }
        debug!("WebSocket 수신 루프 종료");
    }
}

#[async_trait]
impl StreamTransport for WsTransport {
    async fn open(&self, token: &str) -> Result<TransportLink, CoreError> {
        let url = self.endpoint_url(token)?;
        info!("WebSocket 연결: {}{}", url.origin().ascii_serialization(), url.path());

        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| CoreError::Network(format!("WebSocket 연결 실패: {e}")))?;

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);

        tokio::spawn(Self::read_loop(read, tx));

        Ok(TransportLink {
            sender: Arc::new(WsSender {
                write: Mutex::new(write),
            }),
            frames: rx,
        })
    }
}

/// WebSocket 송신기
pub struct WsSender {
    write: Mutex<SplitSink<WsStream, Message>>,
}

#[async_trait]
impl FrameSender for WsSender {
    async fn send_text(&self, text: &str) -> Result<(), CoreError> {
        let mut write = self.write.lock().await;
        write
            .send(Message::text(text.to_owned()))
            .await
            .map_err(|e| CoreError::Network(format!("WebSocket 전송 실패: {e}")))
    }

    async fn close(&self) -> Result<(), CoreError> {
        let mut write = self.write.lock().await;
        write
            .send(Message::Close(None))
            .await
            .map_err(|e| CoreError::Network(format!("WebSocket 종료 실패: {e}")))
    }
}
