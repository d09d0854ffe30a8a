//! 재연결 백오프 정책.
//!
//! 재연결 경과 시간이 빠른 구간(기본 60초) 안이면 `min(이전 재시도 * step, max_delay)`,
//! 이후에는 고정 `slow_delay`. `max_attempts`를 넘기면 더 이상 지연을 돌려주지 않는다.

use metricflow_core::config::ReconnectConfig;
use std::time::Duration;

/// 재연결 지연 계산기
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    step: Duration,
    max_delay: Duration,
    fast_window: Duration,
    slow_delay: Duration,
    max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    pub fn new(
        step: Duration,
        max_delay: Duration,
        fast_window: Duration,
        slow_delay: Duration,
        max_attempts: Option<u32>,
    ) -> Self {
        Self {
            step,
            max_delay,
            fast_window,
            slow_delay,
            max_attempts,
        }
    }

    /// 설정으로 생성
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(
            Duration::from_millis(config.step_ms),
            Duration::from_millis(config.max_delay_ms),
            Duration::from_millis(config.fast_window_ms),
            Duration::from_millis(config.slow_delay_ms),
            config.max_attempts,
        )
    }

    /// 다음 재연결 시도 전 대기 시간
    ///
    /// `previous_retries`: 이번 재연결 주기에서 이미 실패한 시도 수
    /// `elapsed`: 재연결 주기 시작 이후 경과 시간
    ///
    /// 최대 시도 횟수를 소진했으면 None.
    pub fn next_delay(&self, previous_retries: u32, elapsed: Duration) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if previous_retries >= max {
                return None;
            }
        }

        if elapsed < self.fast_window {
            Some(self.step.saturating_mul(previous_retries).min(self.max_delay))
        } else {
            Some(self.slow_delay)
        }
    }

    /// 연결이 `lived` 동안 유지됐으면 안정된 연결로 본다.
    /// 안정되기 전에 끊긴 연결은 재연결 주기를 이어가며 백오프를 초기화하지 않는다.
    pub fn is_stable(&self, lived: Duration) -> bool {
        lived >= self.step
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_steps_capped_at_ten_seconds() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..8)
            .map(|n| policy.next_delay(n, Duration::ZERO).unwrap().as_secs())
            .collect();
        assert_eq!(delays, vec![0, 2, 4, 6, 8, 10, 10, 10]);
    }

    #[test]
    fn fixed_thirty_seconds_after_window() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            policy.next_delay(1, Duration::from_secs(59)),
            Some(Duration::from_secs(2))
        );
        assert_eq!(
            policy.next_delay(1, Duration::from_secs(60)),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            policy.next_delay(50, Duration::from_secs(600)),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn simulated_schedule() {
        // 각 시도가 즉시 실패한다고 가정하고 경과 시간을 누적
        let policy = ReconnectPolicy::default();
        let mut elapsed = Duration::ZERO;
        let mut schedule = Vec::new();

        for retries in 0..12 {
            let delay = policy.next_delay(retries, elapsed).unwrap();
            schedule.push(delay.as_secs());
            elapsed += delay;
        }

        // 0,2,4,6,8,10,10,10,10 → 누적 60초 도달 후 30초 고정
        assert_eq!(schedule, vec![0, 2, 4, 6, 8, 10, 10, 10, 10, 30, 30, 30]);
    }

    #[test]
    fn link_is_stable_after_one_step() {
        let policy = ReconnectPolicy::default();
        assert!(!policy.is_stable(Duration::ZERO));
        assert!(!policy.is_stable(Duration::from_millis(1_999)));
        assert!(policy.is_stable(Duration::from_secs(2)));
    }

    #[test]
    fn unbounded_by_default() {
        let policy = ReconnectPolicy::default();
        assert!(policy.max_attempts().is_none());
        assert!(policy.next_delay(u32::MAX, Duration::ZERO).is_some());
    }

    #[test]
    fn max_attempts_exhausts() {
        let config = ReconnectConfig {
            max_attempts: Some(3),
            ..ReconnectConfig::default()
        };
        let policy = ReconnectPolicy::from_config(&config);
        assert!(policy.next_delay(2, Duration::ZERO).is_some());
        assert!(policy.next_delay(3, Duration::ZERO).is_none());
    }
}
