//! 인증 토큰 공급자.
//!
//! `TokenProvider` 포트 구현. JWT 로그인/갱신/만료 관리(`TokenManager`)와
//! 외부에서 발급받은 토큰을 그대로 쓰는 `StaticTokenProvider`를 제공한다.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metricflow_core::error::CoreError;
use metricflow_core::ports::token::TokenProvider;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// 만료 전 자동 갱신 여유 시간 (분)
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// 서버 응답: 로그인/리프레시
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// 내부 토큰 상태
#[derive(Debug, Clone)]
struct TokenState {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
}

impl TokenState {
    fn from_response(resp: TokenResponse, previous_refresh: Option<String>) -> Self {
        Self {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token.or(previous_refresh),
            expires_at: Utc::now() + Duration::seconds(resp.expires_in.unwrap_or(3600)),
        }
    }
}

/// JWT 토큰 매니저: 로그인/갱신/만료 관리
#[derive(Clone)]
pub struct TokenManager {
    base_url: String,
    client: reqwest::Client,
    state: Arc<RwLock<Option<TokenState>>>,
}

impl TokenManager {
    /// 새 토큰 매니저 생성
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            state: Arc::new(RwLock::new(None)),
        }
    }

    /// 이메일/비밀번호 로그인 → JWT 토큰 획득
    pub async fn login(&self, email: &str, password: &str) -> Result<(), CoreError> {
        let url = format!("{}/api/v1/auth/tokens", self.base_url);
        let body = serde_json::json!({
            "identifier": email,
            "password": password,
        });

        let token_resp = self.request_token(&url, &body, "로그인").await?;
        let state = TokenState::from_response(token_resp, None);
        debug!("로그인 성공, 토큰 만료: {}", state.expires_at);
        *self.state.write().await = Some(state);
        Ok(())
    }

    /// 토큰 갱신 (refresh_token 사용)
    pub async fn refresh(&self) -> Result<(), CoreError> {
        let current = self
            .state
            .read()
            .await
            .clone()
            .ok_or_else(|| CoreError::Auth("인증되지 않음".to_string()))?;
        let refresh_token = current
            .refresh_token
            .ok_or_else(|| CoreError::Auth("리프레시 토큰 없음".to_string()))?;

        let url = format!("{}/api/v1/auth/tokens/refresh", self.base_url);
        let body = serde_json::json!({ "refresh_token": refresh_token });

        let token_resp = self.request_token(&url, &body, "토큰 갱신").await?;
        let state = TokenState::from_response(token_resp, Some(refresh_token));
        debug!("토큰 갱신 성공, 새 만료: {}", state.expires_at);
        *self.state.write().await = Some(state);
        Ok(())
    }

    async fn request_token(
        &self,
        url: &str,
        body: &serde_json::Value,
        action: &str,
    ) -> Result<TokenResponse, CoreError> {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| CoreError::Auth(format!("{action} 요청 실패: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CoreError::Auth(format!("{action} 실패 ({status}): {text}")));
        }

        resp.json()
            .await
            .map_err(|e| CoreError::Auth(format!("{action} 응답 파싱 실패: {e}")))
    }

    /// 로그아웃 (로컬 토큰 폐기)
    pub async fn logout(&self) {
        *self.state.write().await = None;
        debug!("로그아웃 완료");
    }

    /// 현재 인증 상태 확인
    pub async fn is_authenticated(&self) -> bool {
        let state = self.state.read().await;
        state.as_ref().is_some_and(|s| Utc::now() < s.expires_at)
    }
}

#[async_trait]
impl TokenProvider for TokenManager {
    /// 유효한 액세스 토큰 반환 (만료 임박 시 자동 갱신)
    async fn get_token(&self) -> Result<String, CoreError> {
        let needs_refresh = {
            let state = self.state.read().await;
            match &*state {
                Some(s) => Utc::now() + Duration::minutes(REFRESH_MARGIN_MINUTES) >= s.expires_at,
                None => return Err(CoreError::Auth("인증되지 않음".to_string())),
            }
        };

        if needs_refresh {
            if let Err(e) = self.refresh().await {
                warn!("자동 토큰 갱신 실패: {e}");
            }
        }

        let state = self.state.read().await;
        state
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or_else(|| CoreError::Auth("인증되지 않음".to_string()))
    }
}

/// 고정 토큰 공급자 (외부 인증 컴포넌트가 발급한 토큰 사용)
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self) -> Result<String, CoreError> {
        if self.token.is_empty() {
            return Err(CoreError::Auth("빈 토큰".to_string()));
        }
        Ok(self.token.clone())
    }
}
