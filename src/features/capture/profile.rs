use std::time::Duration;

/// 同步请求（cache miss）用的快速档
const FAST_INIT_DELAY: Duration = Duration::from_millis(2500);
const FAST_FOLLOWUP_DELAY: Duration = Duration::from_millis(1250);
const FAST_TIMEOUT: Duration = Duration::from_secs(10);

/// 背景刷新用的慢速档：更长的 sleep 通常能等到更完整的页面
const SLOW_INIT_DELAY: Duration = Duration::from_secs(10);
const SLOW_FOLLOWUP_DELAY: Duration = Duration::from_secs(5);
const SLOW_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProfileKind {
    Fast,
    Slow,
}

/// 一次 Decap 抓取的时序参数。
#[derive(Debug, Clone)]
pub struct CaptureProfile {
    /// navigate 后的首次 sleep（渲染等待）
    pub init_delay: Duration,
    /// 清理导航元素后的二次 sleep
    pub followup_delay: Duration,
    /// Decap 侧的总超时
    pub timeout: Duration,
    kind: ProfileKind,
}

impl CaptureProfile {
    /// 快速档：2.5s + 主机附加延迟，总超时 10s。
    pub fn fast(host_delay: Duration) -> Self {
        Self {
            init_delay: FAST_INIT_DELAY + host_delay,
            followup_delay: FAST_FOLLOWUP_DELAY,
            timeout: FAST_TIMEOUT,
            kind: ProfileKind::Fast,
        }
    }

    /// 慢速档：10s / 5s，总超时 25s。
    pub fn slow() -> Self {
        Self {
            init_delay: SLOW_INIT_DELAY,
            followup_delay: SLOW_FOLLOWUP_DELAY,
            timeout: SLOW_TIMEOUT,
            kind: ProfileKind::Slow,
        }
    }

    /// 档位对应的共享 HTTP client（传输层超时需覆盖 Decap 侧超时）。
    pub fn http_client(&self) -> Result<&'static reqwest::Client, reqwest::Error> {
        match self.kind {
            ProfileKind::Fast => crate::http::client_timeout_30s(),
            ProfileKind::Slow => crate::http::client_timeout_90s(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_profile_adds_host_delay() {
        let p = CaptureProfile::fast(Duration::from_millis(700));
        assert_eq!(p.init_delay, Duration::from_millis(3200));
        assert_eq!(p.followup_delay, Duration::from_millis(1250));
        assert_eq!(p.timeout, Duration::from_secs(10));
    }

    #[test]
    fn slow_profile_is_fixed() {
        let p = CaptureProfile::slow();
        assert_eq!(p.init_delay, Duration::from_secs(10));
        assert_eq!(p.followup_delay, Duration::from_secs(5));
        assert_eq!(p.timeout, Duration::from_secs(25));
    }
}
