//! 인증 토큰 공급 포트.
//!
//! 구현: `metricflow-network` crate (`TokenManager`, `StaticTokenProvider`)

use async_trait::async_trait;

use crate::error::CoreError;

/// 스트리밍 연결에 사용할 bearer 토큰 공급자
///
/// 연결 관리자는 자격증명을 직접 다루지 않고 연결 시마다 이 포트에서 토큰을 받는다.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// 유효한 액세스 토큰 반환
    async fn get_token(&self) -> Result<String, CoreError>;
}
