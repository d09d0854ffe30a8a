//! # metricflow-app
//!
//! METRICFLOW 스트리밍 클라이언트 바이너리 진입점.
//! 설정 계층 로드, 어댑터 DI 와이어링, 구독 출력, 라이프사이클 알림.

mod notifier;
mod report;
mod settings;
mod shutdown;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use metricflow_core::config::ClientConfig;
use metricflow_core::config_manager::ConfigManager;
use metricflow_core::models::subscription::{Aggregation, SubscriptionSpec};
use metricflow_core::ports::token::TokenProvider;
use metricflow_network::auth::{StaticTokenProvider, TokenManager};
use metricflow_network::ws_client::WsTransport;
use metricflow_stream::{MetricsClient, SubscriptionUpdate};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::settings::Overrides;
use crate::shutdown::Shutdown;

/// METRICFLOW 실시간 메트릭 스트리밍 클라이언트
///
/// 메트릭 서버에 단일 연결을 열고 지정한 메트릭을 구독해 출력한다
#[derive(Parser, Debug)]
#[command(name = "metricflow")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 서버 URL (기본: 설정 파일 값)
    #[arg(long, short = 's')]
    server: Option<String>,

    /// 스트리밍 엔드포인트 경로
    #[arg(long)]
    hub_path: Option<String>,

    /// 액세스 토큰 (없으면 METRICFLOW_TOKEN 환경변수)
    #[arg(long, short = 't')]
    token: Option<String>,

    /// 로그인 이메일 (없으면 METRICFLOW_EMAIL 환경변수)
    #[arg(long)]
    email: Option<String>,

    /// 로그인 비밀번호 (없으면 METRICFLOW_PASSWORD 환경변수)
    #[arg(long)]
    password: Option<String>,

    /// 구독할 메트릭 이름 (반복 지정 가능)
    #[arg(long = "metric", short = 'm', required = true)]
    metrics: Vec<String>,

    /// 차원 필터 key=value (반복 지정 가능)
    #[arg(long = "filter", short = 'f', value_parser = settings::parse_filter)]
    filters: Vec<(String, String)>,

    /// 집계 방식 (sum, avg, min, max, count)
    #[arg(long, short = 'a')]
    aggregate: Option<Aggregation>,

    /// 서버 샘플링 간격 힌트 (밀리초)
    #[arg(long)]
    sampling_ms: Option<u64>,

    /// 시작 시 조회할 이력 기간 (초)
    #[arg(long)]
    history_secs: Option<u64>,

    /// 연결 상태 출력 간격 (초)
    #[arg(long, default_value = "30")]
    stats_interval: u64,

    /// 재연결 최대 시도 횟수 (기본: 무제한)
    #[arg(long)]
    max_attempts: Option<u32>,

    /// 원격 호출 타임아웃 (밀리초)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// 메트릭별 이력 버퍼 크기
    #[arg(long)]
    history_capacity: Option<usize>,

    /// 설정 파일 경로 (기본: 플랫폼 설정 디렉토리)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            server: self.server.clone(),
            hub_path: self.hub_path.clone(),
            max_attempts: self.max_attempts,
            timeout_ms: self.timeout_ms,
            history_capacity: self.history_capacity,
        }
    }

    fn subscription_spec(&self) -> SubscriptionSpec {
        let mut spec = SubscriptionSpec::new(self.metrics.iter().cloned());
        for (key, value) in &self.filters {
            spec = spec.with_filter(key.clone(), value.clone());
        }
        if let Some(aggregation) = self.aggregate {
            spec = spec.with_aggregation(aggregation);
        }
        if let Some(interval) = self.sampling_ms {
            spec = spec.with_sampling_interval(interval);
        }
        spec
    }
}

/// 토큰 공급자 결정: 고정 토큰 우선, 없으면 로그인
async fn build_token_provider(args: &Args, config: &ClientConfig) -> Result<Arc<dyn TokenProvider>> {
    if let Some(token) = args
        .token
        .clone()
        .or_else(|| std::env::var("METRICFLOW_TOKEN").ok())
    {
        info!("고정 액세스 토큰 사용");
        return Ok(Arc::new(StaticTokenProvider::new(token)));
    }

    let email = args
        .email
        .clone()
        .or_else(|| std::env::var("METRICFLOW_EMAIL").ok())
        .ok_or_else(|| anyhow!("--token 또는 --email/--password가 필요합니다"))?;
    let password = args
        .password
        .clone()
        .or_else(|| std::env::var("METRICFLOW_PASSWORD").ok())
        .unwrap_or_default();

    info!("서버 로그인 시도: {email}");
    let manager = TokenManager::new(&config.server.base_url);
    manager
        .login(&email, &password)
        .await
        .map_err(|e| anyhow!("로그인 실패: {e}"))?;
    Ok(Arc::new(manager))
}

/// 설정 로드: 파일 생성/확인 → 파일 + 환경변수 → CLI 덮어쓰기 → 검증
fn load_config(args: &Args) -> Result<ClientConfig> {
    let manager = match &args.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    }
    .context("설정 관리자 초기화 실패")?;
    info!("설정 파일: {}", manager.config_path().display());

    let mut config = settings::load(manager.config_path())?;
    args.overrides().apply(&mut config);
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_filter = format!(
        "metricflow={0},metricflow_app={0},metricflow_core={0},metricflow_network={0},metricflow_stream={0}",
        args.log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();

    info!("METRICFLOW 클라이언트 시작");

    let config = load_config(&args)?;
    info!(
        "서버: {}{}",
        config.server.base_url, config.server.hub_path
    );

    // ── 어댑터 생성 (DI 와이어링) ──
    let tokens = build_token_provider(&args, &config).await?;
    let transport = Arc::new(WsTransport::from_config(&config.server));
    let client = MetricsClient::new(&config, transport, tokens);

    let shutdown = Shutdown::new();
    tokio::spawn(notifier::run(client.lifecycle(), shutdown.subscribe()));

    if let Err(e) = client.connect().await {
        warn!("초기 연결 실패, 백그라운드에서 재시도: {e}");
    }

    let mut subscription = client.subscribe(args.subscription_spec());
    info!(
        "구독 등록 {}: {}",
        subscription.id(),
        args.metrics.join(", ")
    );

    if let Some(secs) = args.history_secs {
        let invoker = client.invoker();
        for metric in &args.metrics {
            match invoker.get_history(metric, Duration::from_secs(secs)).await {
                Ok(events) => info!("{metric}: 최근 {secs}초 이력 {}건", events.len()),
                Err(e) => warn!("{metric} 이력 조회 실패: {e}"),
            }
        }
    }

    let mut stats_tick = tokio::time::interval(Duration::from_secs(args.stats_interval.max(1)));
    stats_tick.tick().await;

    let signal = shutdown.wait_for_signal();
    tokio::pin!(signal);

    info!("METRICFLOW 클라이언트 실행 중 (Ctrl+C로 종료)");

    loop {
        tokio::select! {
            update = subscription.next() => match update {
                Some(SubscriptionUpdate::Metric(update)) => {
                    let stats = client.metric_stats(&update.event.metric_name);
                    println!("{}", report::render_update(&update, stats.as_ref()));
                }
                Some(SubscriptionUpdate::Rejected(e)) => {
                    error!("구독 거부: {e}");
                    break;
                }
                None => {
                    info!("구독 스트림 종료");
                    break;
                }
            },
            _ = stats_tick.tick() => match client.stats().await {
                Ok(stats) => info!("{}", report::render_connection(&stats)),
                Err(e) => warn!("상태 조회 실패: {e}"),
            },
            result = &mut signal => {
                if let Err(e) = result {
                    error!("시그널 핸들러 등록 실패: {e}");
                }
                break;
            }
        }
    }

    shutdown.trigger();
    if let Err(e) = subscription.unsubscribe().await {
        warn!("구독 해제 실패: {e}");
    }
    client.disconnect().await;

    for metric in &args.metrics {
        if let Some(stats) = client.metric_stats(metric) {
            println!("{}", report::render_summary(metric, &stats));
        }
    }

    info!("METRICFLOW 클라이언트 종료");
    Ok(())
}
