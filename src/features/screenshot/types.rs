use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::cache::CacheEntry;

/// screenshot 端点的查询参数。
///
/// `expire` 保留原文字符串：它以原始形式参与签名摘要，解析成
/// 整数是之后的事。
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScreenshotQuery {
    /// 目标页面 URL（必填）
    pub url: Option<String>,
    /// HMAC 签名（启用签名时必填）
    pub s: Option<String>,
    /// 过期时刻（unix 秒，原文参与签名）
    pub expire: Option<String>,
    /// 非空则请求背景刷新而非同步抓取
    pub bg: Option<String>,
    /// 非空且签名关闭时跳过裁剪（调试路径）
    pub nocrop: Option<String>,
    /// 背景刷新限流的管理员旁路令牌
    pub token: Option<String>,
}

/// info 端点里展示的归因信息。
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ProvenanceView {
    pub remote_addr: String,
    pub referer: String,
    pub user_agent: String,
    pub when: Option<DateTime<Utc>>,
}

/// info 端点的单条目视图。
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct InfoEntry {
    /// 目标页面 URL
    pub url: String,
    /// 指回本服务的截图链接（带签名与过期参数）
    pub spectura_url: String,
    /// 图片字节数（失败条目为 0）
    pub size_bytes: usize,
    /// 人类可读的图片大小
    pub size: String,
    /// 信息密度分值
    pub score: i32,
    /// 是否为失败条目（读取时以兜底图替身返回）
    pub failed: bool,
    pub expire: Option<DateTime<Utc>>,
    pub entry_created: Option<DateTime<Utc>>,
    pub image_created: Option<DateTime<Utc>>,
    pub last_fetched: Option<DateTime<Utc>>,
    pub last_refresh_attempt: Option<DateTime<Utc>>,
    pub provenance: ProvenanceView,
}

/// info 端点的响应体。
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct InfoResponse {
    pub total_entries: usize,
    /// 人类可读的图片总大小
    pub total_size: String,
    pub entries: Vec<InfoEntry>,
}

impl InfoEntry {
    /// 由缓存条目构建视图；`screenshot_path` 与 `signed` 用于重建
    /// 自引用链接。
    pub fn from_entry(entry: &CacheEntry, screenshot_path: &str, signed: bool) -> Option<Self> {
        let url = entry.url.as_ref()?;
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("url", url.as_str());
        query.append_pair(
            "expire",
            &entry
                .expire
                .map(|t| t.timestamp())
                .unwrap_or(crate::features::cache::ZERO_TIME_UNIX)
                .to_string(),
        );
        if signed {
            query.append_pair("s", &entry.signature);
        }
        let spectura_url = format!("{}?{}", screenshot_path, query.finish());

        Some(Self {
            url: url.to_string(),
            spectura_url,
            size_bytes: entry.image_len(),
            size: crate::bytesize::fmt_byte_size(entry.image_len()),
            score: entry.score,
            failed: entry.is_failed_image(),
            expire: entry.expire,
            entry_created: entry.entry_created,
            image_created: entry.image_created,
            last_fetched: entry.last_fetched,
            last_refresh_attempt: entry.last_refresh_attempt,
            provenance: ProvenanceView {
                remote_addr: entry.provenance.remote_addr.clone(),
                referer: entry.provenance.referer.clone(),
                user_agent: entry.provenance.user_agent.clone(),
                when: entry.provenance.when,
            },
        })
    }
}
