//! # metricflow-network
//!
//! 전송 계층 어댑터.
//! `metricflow-core` 포트의 실제 구현을 제공한다:
//!
//! - [`ws_client::WsTransport`]: `StreamTransport` (tokio-tungstenite WebSocket)
//! - [`auth::TokenManager`]: `TokenProvider` (JWT 로그인/자동 갱신)
//! - [`auth::StaticTokenProvider`]: 외부 발급 토큰 고정 사용
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! use metricflow_network::auth::StaticTokenProvider;
//! use metricflow_network::ws_client::WsTransport;
//!
//! let transport = WsTransport::new("https://metrics.example.com", "/hubs/metrics");
//! let tokens = StaticTokenProvider::new(token);
//! ```

pub mod auth;
pub mod ws_client;
