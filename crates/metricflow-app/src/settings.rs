//! 설정 계층 로드.
//!
//! 우선순위: CLI 인자 > 환경변수 (`METRICFLOW_*`) > 설정 파일 > 기본값.
//! 환경변수는 섹션 구분에 `__`를 쓴다 (예: `METRICFLOW_SERVER__BASE_URL`).

use config::{Config, Environment, File, FileFormat};
use metricflow_core::config::ClientConfig;
use metricflow_core::error::CoreError;
use std::path::Path;
use tracing::debug;

/// 환경변수 접두사
pub const ENV_PREFIX: &str = "METRICFLOW";

/// CLI로 덮어쓰는 설정 값
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub server: Option<String>,
    pub hub_path: Option<String>,
    pub max_attempts: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub history_capacity: Option<usize>,
}

impl Overrides {
    pub fn apply(&self, config: &mut ClientConfig) {
        if let Some(server) = &self.server {
            config.server.base_url = server.clone();
        }
        if let Some(hub_path) = &self.hub_path {
            config.server.hub_path = hub_path.clone();
        }
        if let Some(max_attempts) = self.max_attempts {
            config.reconnect.max_attempts = Some(max_attempts);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.remote.timeout_ms = Some(timeout_ms);
        }
        if let Some(capacity) = self.history_capacity {
            config.history.capacity = capacity;
        }
    }
}

/// 설정 파일 + 프로세스 환경변수로 설정 로드
pub fn load(path: &Path) -> Result<ClientConfig, CoreError> {
    load_layered(path, environment())
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn load_layered(path: &Path, env: Environment) -> Result<ClientConfig, CoreError> {
    debug!("설정 로드: {}", path.display());
    let settings = Config::builder()
        .add_source(File::from(path).format(FileFormat::Json).required(false))
        .add_source(env)
        .build()
        .map_err(|e| CoreError::Config(format!("설정 로드 실패: {e}")))?;

    settings
        .try_deserialize()
        .map_err(|e| CoreError::Config(format!("설정 해석 실패: {e}")))
}

/// `key=value` 형식의 차원 필터 파싱
pub fn parse_filter(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("'key=value' 형식이 아님: {raw}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("빈 필터 키: {raw}"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
