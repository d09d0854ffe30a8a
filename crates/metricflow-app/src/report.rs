//! 터미널 출력 포맷.

use chrono::Local;
use metricflow_core::models::metric::Trend;
use metricflow_stream::tracker::MetricStats;
use metricflow_stream::{ConnectionStats, MetricUpdate};

fn trend_arrow(trend: Trend) -> &'static str {
    match trend {
        Trend::Up => "↑",
        Trend::Down => "↓",
        Trend::Stable => "→",
    }
}

/// 갱신 한 줄: `[시각] 이름{차원} = 값 추세 변화율 | 집계`
pub fn render_update(update: &MetricUpdate, stats: Option<&MetricStats>) -> String {
    let event = &update.event;
    let mut line = format!(
        "[{}] {}",
        event.timestamp.with_timezone(&Local).format("%H:%M:%S"),
        event.metric_name
    );

    if let Some(dimensions) = &event.dimensions {
        let mut pairs: Vec<String> = dimensions.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort();
        line.push_str(&format!("{{{}}}", pairs.join(",")));
    }

    line.push_str(&format!(" = {:.2}", event.value));

    if let Some(stats) = stats {
        line.push_str(&format!(" {}", trend_arrow(stats.trend)));
        if let Some(change) = stats.percent_change {
            line.push_str(&format!(" {change:+.1}%"));
        }
    }

    if let Some(aggregate) = &update.aggregate {
        line.push_str(&format!(
            " | {:?}={:.2}",
            aggregate.aggregation, aggregate.value
        ));
    }

    line
}

/// 메트릭 요약 한 줄
pub fn render_summary(name: &str, stats: &MetricStats) -> String {
    format!(
        "{name}: 최신 {:.2}, 최소 {:.2}, 최대 {:.2}, 평균 {:.2} ({}개, 추세 {})",
        stats.latest, stats.min, stats.max, stats.avg, stats.count, stats.trend
    )
}

/// 연결 상태 한 줄
pub fn render_connection(stats: &ConnectionStats) -> String {
    format!(
        "상태 {} | 구독 {} | 메트릭 {} | 대기 요청 {} | 재연결 시도 {}",
        stats.state,
        stats.subscriptions,
        stats.metrics,
        stats.pending_requests,
        stats.reconnect_attempts
    )
}
