use reqwest::header;
use serde::Serialize;

use crate::config::WebhookConfig;

use super::entry::{CacheEntry, ZERO_TIME_UNIX};

/// 缓存图片生命周期事件。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEvent {
    ImageCreated,
    ImageUpdated,
}

impl WebhookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::ImageCreated => "image_created",
            WebhookEvent::ImageUpdated => "image_updated",
        }
    }
}

/// Webhook 请求体。字段名与下游消费方约定保持一致。
#[derive(Debug, Serialize)]
struct WebhookBody {
    #[serde(rename = "EventType")]
    event_type: &'static str,
    #[serde(rename = "URL")]
    url: String,
    /// unix 秒；图片尚未生成时为时间零值哨兵
    #[serde(rename = "ImageCreated")]
    image_created: i64,
    /// unix 秒
    #[serde(rename = "Expire")]
    expire: i64,
}

impl WebhookBody {
    /// 条目无 URL 时没有可通知的主体，返回 None。
    fn from_entry(event: WebhookEvent, entry: &CacheEntry) -> Option<Self> {
        let url = entry.url.as_ref()?;
        Some(Self {
            event_type: event.as_str(),
            url: url.to_string(),
            image_created: entry
                .image_created
                .map(|t| t.timestamp())
                .unwrap_or(ZERO_TIME_UNIX),
            expire: entry.expire.map(|t| t.timestamp()).unwrap_or(ZERO_TIME_UNIX),
        })
    }
}

/// 图片创建/更新事件的通知器：fire-and-forget，失败只记日志，不重试。
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    authorization: String,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig) -> Self {
        Self {
            url: config.url.clone(),
            authorization: config.authorization_header.clone(),
        }
    }

    /// 未配置 webhook URL 时的空通知器。
    pub fn disabled() -> Self {
        Self {
            url: String::new(),
            authorization: String::new(),
        }
    }

    /// 异步投递事件；URL 未配置则直接返回。
    pub fn notify(&self, event: WebhookEvent, entry: &CacheEntry) {
        if self.url.is_empty() {
            return;
        }
        let Some(body) = WebhookBody::from_entry(event, entry) else {
            return;
        };
        let url = self.url.clone();
        let authorization = self.authorization.clone();
        tokio::spawn(async move {
            let client = match crate::http::client_default() {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!("Webhook client 初始化失败: {e}");
                    return;
                }
            };
            let res = client
                .post(&url)
                .header(header::AUTHORIZATION, authorization)
                .json(&body)
                .send()
                .await;
            if let Err(e) = res {
                tracing::warn!("Webhook 投递失败: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use url::Url;

    #[test]
    fn body_serializes_with_agreed_field_names() {
        let entry = CacheEntry {
            url: Some(Url::parse("https://example.com/").expect("url")),
            image_created: Some(chrono::Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
            expire: Some(chrono::Utc.timestamp_opt(1_700_003_600, 0).unwrap()),
            ..CacheEntry::default()
        };
        let body =
            WebhookBody::from_entry(WebhookEvent::ImageCreated, &entry).expect("body");
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["EventType"], "image_created");
        assert_eq!(json["URL"], "https://example.com/");
        assert_eq!(json["ImageCreated"], 1_700_000_000_i64);
        assert_eq!(json["Expire"], 1_700_003_600_i64);
    }

    #[test]
    fn unset_timestamps_use_zero_time_sentinel() {
        // 种子条目（尚无图片）也会触发 image_created，未设置的时间戳
        // 必须按零值哨兵投递
        let entry = CacheEntry {
            url: Some(Url::parse("https://example.com/").expect("url")),
            ..CacheEntry::default()
        };
        let body =
            WebhookBody::from_entry(WebhookEvent::ImageCreated, &entry).expect("body");
        assert_eq!(body.image_created, -62_135_596_800);
        assert_eq!(body.expire, -62_135_596_800);
    }

    #[test]
    fn entry_without_url_produces_no_body() {
        assert!(WebhookBody::from_entry(WebhookEvent::ImageUpdated, &CacheEntry::default()).is_none());
    }

    #[test]
    fn event_names_are_stable() {
        assert_eq!(WebhookEvent::ImageCreated.as_str(), "image_created");
        assert_eq!(WebhookEvent::ImageUpdated.as_str(), "image_updated");
    }
}
