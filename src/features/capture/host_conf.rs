use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::AppError;

/// 单主机渲染参数：首次 sleep 的附加延迟与裁剪起始行。
/// 0 表示"继承默认"，后缀回退时只填充仍为 0 的字段。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct HostConfEntry {
    /// 附加渲染延迟（毫秒）
    #[serde(default)]
    pub delay: i64,
    /// 裁剪起始行（像素）
    #[serde(default)]
    pub voffset: i64,
}

impl HostConfEntry {
    /// 附加延迟时长；负值按 0 处理。
    pub fn delay_duration(&self) -> Duration {
        Duration::from_millis(self.delay.max(0) as u64)
    }
}

/// hostname -> 渲染参数表。启动时加载一次，之后只读。
#[derive(Debug, Clone, Default)]
pub struct HostConfMap {
    entries: HashMap<String, HostConfEntry>,
}

impl HostConfMap {
    pub fn new(entries: HashMap<String, HostConfEntry>) -> Self {
        Self { entries }
    }

    /// 从本地文件或 HTTP URL 加载 JSON 配置表。
    /// 加载失败视为启动期致命错误（而不是请求期）。
    pub async fn load(path: &str) -> Result<Self, AppError> {
        let entries = if is_http_url(path) {
            let client = crate::http::client_timeout_30s()
                .map_err(|e| AppError::Internal(format!("初始化 HTTP Client 失败: {e}")))?;
            let res = client
                .get(path)
                .send()
                .await
                .map_err(|e| AppError::Config(format!("拉取主机配置 {path} 失败: {e}")))?;
            if !res.status().is_success() {
                return Err(AppError::Config(format!(
                    "拉取主机配置 {path} 失败: {}",
                    res.status()
                )));
            }
            res.json::<HashMap<String, HostConfEntry>>()
                .await
                .map_err(|e| AppError::Config(format!("解析主机配置 {path} 失败: {e}")))?
        } else {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| AppError::Config(format!("读取主机配置 {path} 失败: {e}")))?;
            serde_json::from_str(&content)
                .map_err(|e| AppError::Config(format!("解析主机配置 {path} 失败: {e}")))?
        };
        Ok(Self { entries })
    }

    /// 按后缀回退查找：先查完整主机名，每次剥掉最左一个 label 重查，
    /// 直到只剩一个 label。命中时只填充仍为 0 的字段；两个字段都非 0
    /// 时立即返回（更具体的主机名只对缺省字段生效）。
    pub fn lookup(&self, hostname: &str) -> HostConfEntry {
        let mut entry = HostConfEntry::default();
        let mut hostname = hostname;
        let mut sep_count = hostname.matches('.').count();
        while sep_count > 0 {
            if let Some(found) = self.entries.get(hostname) {
                if entry.delay == 0 {
                    entry.delay = found.delay;
                }
                if entry.voffset == 0 {
                    entry.voffset = found.voffset;
                }
                if entry.delay != 0 && entry.voffset != 0 {
                    return entry;
                }
            }
            hostname = match hostname.split_once('.') {
                Some((_, rest)) => rest,
                None => break,
            };
            sep_count -= 1;
        }
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// path 是绝对 http(s) URL 时走网络拉取，否则按本地文件处理。
fn is_http_url(path: &str) -> bool {
    Url::parse(path)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf(pairs: &[(&str, i64, i64)]) -> HostConfMap {
        HostConfMap::new(
            pairs
                .iter()
                .map(|(host, delay, voffset)| {
                    (
                        host.to_string(),
                        HostConfEntry {
                            delay: *delay,
                            voffset: *voffset,
                        },
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn lookup_finds_exact_hostname() {
        let m = conf(&[("www.example.com", 500, 40)]);
        assert_eq!(
            m.lookup("www.example.com"),
            HostConfEntry {
                delay: 500,
                voffset: 40
            }
        );
    }

    #[test]
    fn lookup_walks_suffixes() {
        let m = conf(&[("example.com", 250, 10)]);
        assert_eq!(
            m.lookup("jobs.www.example.com"),
            HostConfEntry {
                delay: 250,
                voffset: 10
            }
        );
    }

    #[test]
    fn more_specific_hostname_only_wins_zero_fields() {
        // www.example.com 只设置 delay，voffset 从 example.com 继承
        let m = conf(&[("www.example.com", 500, 0), ("example.com", 250, 10)]);
        assert_eq!(
            m.lookup("www.example.com"),
            HostConfEntry {
                delay: 500,
                voffset: 10
            }
        );
    }

    #[test]
    fn walk_stops_before_bare_tld() {
        // 只剩一个 label（"com"）时不再查表
        let m = conf(&[("com", 999, 999)]);
        assert_eq!(m.lookup("example.com"), HostConfEntry::default());
        assert_eq!(m.lookup("com"), HostConfEntry::default());
    }

    #[test]
    fn unknown_hostname_returns_zero_entry() {
        let m = conf(&[("example.com", 250, 10)]);
        assert_eq!(m.lookup("other.net"), HostConfEntry::default());
    }

    #[test]
    fn http_url_detection() {
        assert!(is_http_url("http://conf.example.com/image_conf.json"));
        assert!(is_http_url("https://conf.example.com/image_conf.json"));
        assert!(!is_http_url("image_conf.json"));
        assert!(!is_http_url("/etc/spectura/image_conf.json"));
    }
}
