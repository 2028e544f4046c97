use bytes::Bytes;
use chrono::{DateTime, Utc};
use url::Url;

/// 时间零值哨兵：0001-01-01T00:00:00Z 的 Unix 秒。
/// 未设置的时间戳对外序列化时按此值投递，下游以此识别。
pub const ZERO_TIME_UNIX: i64 = -62_135_596_800;

/// 首个请求方的归因信息。`when` 为 None 表示尚未记录。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub remote_addr: String,
    pub referer: String,
    pub user_agent: String,
    pub when: Option<DateTime<Utc>>,
}

impl Provenance {
    pub fn is_zero(&self) -> bool {
        self.when.is_none()
    }
}

/// 缓存条目，以目标 URL 的字符串形式为键。
///
/// `image` 为 None 且 `url` 非空的条目是"失败条目"：读取时以兜底图
/// 替身返回，存储本身不变。
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    pub url: Option<Url>,
    pub image: Option<Bytes>,
    pub signature: String,
    pub expire: Option<DateTime<Utc>>,
    pub entry_created: Option<DateTime<Utc>>,
    pub image_created: Option<DateTime<Utc>>,
    pub last_fetched: Option<DateTime<Utc>>,
    pub last_refresh_attempt: Option<DateTime<Utc>>,
    pub provenance: Provenance,
    /// 图片信息密度分值，0 表示空白/纯色截图
    pub score: i32,
}

impl CacheEntry {
    /// 是否为零值条目（缓存未命中时的回复）。
    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.signature.is_empty() && self.url.is_none()
    }

    /// 是否为失败条目（抓取失败后只留元数据）。
    pub fn is_failed_image(&self) -> bool {
        self.url.is_some() && self.image.is_none()
    }

    /// 图片字节数（失败条目为 0）。
    pub fn image_len(&self) -> usize {
        self.image.as_ref().map(|b| b.len()).unwrap_or(0)
    }
}

/// 合并已有条目与新条目，返回 (合并结果, 是否替换了图片)。
///
/// 规则（按序应用在 old 的副本上）：
/// 1. 新图片非空、与旧图不同、且分值没有明显劣化
///    （new.score ≥ old.score/2 且 new.score ≥ old.score−20）时替换
///    图片/分值并把 image_created 置为合并时刻；
/// 2. provenance 只在旧值为零时采用新值；
/// 3. signature、entry_created 只在旧值为空时采用新值；
/// 4. last_fetched / last_refresh_attempt 取两者较新者；
/// 5. url、expire 永不覆盖。
pub fn merge(mut old: CacheEntry, new: CacheEntry, now: DateTime<Utc>) -> (CacheEntry, bool) {
    let mut image_updated = false;
    if let Some(new_image) = new.image {
        if new.score < old.score / 2 || new.score < old.score - 20 {
            // 信息密度明显下降，保留旧图
            tracing::debug!(
                old_score = old.score,
                new_score = new.score,
                "拒绝低密度刷新图片"
            );
        } else if old.image.as_ref() != Some(&new_image) {
            old.image = Some(new_image);
            old.image_created = Some(now);
            old.score = new.score;
            image_updated = true;
        }
    }
    if old.provenance.is_zero() {
        old.provenance = new.provenance;
    }
    if old.signature.is_empty() {
        old.signature = new.signature;
    }
    if old.entry_created.is_none() {
        old.entry_created = new.entry_created;
    }
    if new.last_fetched > old.last_fetched {
        old.last_fetched = new.last_fetched;
    }
    if new.last_refresh_attempt > old.last_refresh_attempt {
        old.last_refresh_attempt = new.last_refresh_attempt;
    }
    (old, image_updated)
}
