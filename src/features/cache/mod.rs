/// 缓存条目与 merge 规则
pub mod entry;

/// 兜底图加载任务
pub mod fallback;

/// 背景刷新调度器
pub mod refresh;

/// 图片事件通知器
pub mod webhook;

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use chrono::{TimeDelta, Utc};
use tokio::sync::{mpsc, oneshot};

use crate::bytesize::fmt_byte_size;
use crate::config::AppConfig;
use crate::features::capture::cropper::{OG_IMAGE_HEIGHT, OG_IMAGE_WIDTH, encode_empty_png};

pub use entry::{CacheEntry, Provenance, ZERO_TIME_UNIX, merge};
pub use refresh::RefreshScheduler;
pub use webhook::{WebhookEvent, WebhookNotifier};

/// 条目存储的调度参数。
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// 条目存活时间（自 entry_created 起算）
    pub ttl: Duration,
    /// GC / 自动刷新扫描周期
    pub schedule_interval: Duration,
    /// 距上次刷新尝试超过该时长的条目进入自动刷新
    pub auto_refresh_after: Duration,
}

impl StoreConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            ttl: config.cache_ttl(),
            schedule_interval: config.schedule_interval(),
            auto_refresh_after: config.auto_refresh_after(),
        }
    }
}

/// 条目存储的指令集。所有状态变更都发生在 owner task 内，
/// 外部只通过 reply channel 观察到原子快照。
pub enum CacheCommand {
    Read {
        url: String,
        reply: oneshot::Sender<CacheEntry>,
    },
    ReadAll {
        reply: oneshot::Sender<Vec<CacheEntry>>,
    },
    Write(CacheEntry),
    WriteMetadata(CacheEntry),
    ReplaceFallback {
        image: Bytes,
        reply: oneshot::Sender<()>,
    },
}

/// 条目存储句柄：对外只暴露指令通道。
#[derive(Debug, Clone)]
pub struct CacheHandle {
    tx: mpsc::Sender<CacheCommand>,
}

impl CacheHandle {
    /// 创建句柄与配对的指令接收端（接收端交给 spawn_entry_store）。
    pub fn new_pair() -> (Self, mpsc::Receiver<CacheCommand>) {
        let (tx, rx) = mpsc::channel(64);
        (Self { tx }, rx)
    }

    /// 读取 URL 对应的条目；未命中返回零值条目。
    /// 失败条目的回复中 image 已被兜底图替换（存储不变）。
    pub async fn read(&self, url: &str) -> CacheEntry {
        let (reply, rx) = oneshot::channel();
        let cmd = CacheCommand::Read {
            url: url.to_string(),
            reply,
        };
        if self.tx.send(cmd).await.is_err() {
            tracing::error!("条目存储已停止，read 返回零值条目");
            return CacheEntry::default();
        }
        rx.await.unwrap_or_default()
    }

    /// 全量快照（顺序不保证；失败条目不做兜底替换）。
    pub async fn read_all(&self) -> Vec<CacheEntry> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(CacheCommand::ReadAll { reply }).await.is_err() {
            tracing::error!("条目存储已停止，read_all 返回空");
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// 写入条目（键为 entry.url）。已有键走 merge；新键盖 entry_created
    /// 戳并触发 image_created 通知。
    pub async fn write(&self, entry: CacheEntry) {
        if self.tx.send(CacheCommand::Write(entry)).await.is_err() {
            tracing::error!("条目存储已停止，write 被丢弃");
        }
    }

    /// 只写元数据：入参的 image 会被强制清空，避免覆盖已有好图。
    pub async fn write_metadata(&self, entry: CacheEntry) {
        if self
            .tx
            .send(CacheCommand::WriteMetadata(entry))
            .await
            .is_err()
        {
            tracing::error!("条目存储已停止，write_metadata 被丢弃");
        }
    }

    /// 替换兜底图；等待 owner task 确认后返回。
    pub async fn replace_fallback(&self, image: Bytes) {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(CacheCommand::ReplaceFallback { image, reply })
            .await
            .is_err()
        {
            tracing::error!("条目存储已停止，replace_fallback 被丢弃");
            return;
        }
        let _ = rx.await;
    }
}

/// 启动条目存储 owner task。
///
/// 单一 task 拥有 entries 表与兜底图字节；指令串行处理，周期 tick
/// 驱动 TTL 清理与自动刷新扫描。
pub fn spawn_entry_store(
    rx: mpsc::Receiver<CacheCommand>,
    config: StoreConfig,
    webhook: WebhookNotifier,
    refresh: RefreshScheduler,
) {
    let store = EntryStore {
        entries: HashMap::new(),
        fallback_image: Bytes::from(encode_empty_png(OG_IMAGE_WIDTH, OG_IMAGE_HEIGHT)),
        ttl: TimeDelta::from_std(config.ttl).unwrap_or(TimeDelta::MAX),
        auto_refresh_after: TimeDelta::from_std(config.auto_refresh_after)
            .unwrap_or(TimeDelta::MAX),
        webhook,
        refresh,
    };
    tokio::spawn(store.run(rx, config.schedule_interval));
}

struct EntryStore {
    entries: HashMap<String, CacheEntry>,
    fallback_image: Bytes,
    ttl: TimeDelta,
    auto_refresh_after: TimeDelta,
    webhook: WebhookNotifier,
    refresh: RefreshScheduler,
}

impl EntryStore {
    async fn run(mut self, mut rx: mpsc::Receiver<CacheCommand>, schedule_interval: Duration) {
        let start = tokio::time::Instant::now() + schedule_interval;
        let mut tick = tokio::time::interval_at(start, schedule_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                _ = tick.tick() => self.on_tick(),
            }
        }
    }

    fn handle(&mut self, cmd: CacheCommand) {
        match cmd {
            CacheCommand::Read { url, reply } => {
                let mut result = self.entries.get(&url).cloned().unwrap_or_default();
                if result.is_failed_image() {
                    result.image = Some(self.fallback_image.clone());
                }
                let _ = reply.send(result);
            }
            CacheCommand::ReadAll { reply } => {
                let _ = reply.send(self.entries.values().cloned().collect());
            }
            CacheCommand::Write(entry) => self.write_entry(entry),
            CacheCommand::WriteMetadata(mut entry) => {
                entry.image = None;
                self.write_entry(entry);
            }
            CacheCommand::ReplaceFallback { image, reply } => {
                self.fallback_image = image;
                let _ = reply.send(());
            }
        }
    }

    fn write_entry(&mut self, entry: CacheEntry) {
        let Some(url) = entry.url.clone() else {
            tracing::warn!("丢弃无 URL 的缓存写入");
            return;
        };
        let key = url.to_string();
        let now = Utc::now();
        match self.entries.remove(&key) {
            Some(old) => {
                let (merged, image_updated) = merge(old, entry, now);
                if image_updated {
                    self.webhook.notify(WebhookEvent::ImageUpdated, &merged);
                }
                self.entries.insert(key, merged);
            }
            None => {
                let mut entry = entry;
                entry.entry_created = Some(now);
                if entry.image.is_some() {
                    entry.image_created = Some(now);
                }
                self.webhook.notify(WebhookEvent::ImageCreated, &entry);
                self.entries.insert(key, entry);
            }
        }
    }

    /// 周期 tick：TTL 清理 + 自动刷新扫描 + 缓存体量日志。
    fn on_tick(&mut self) {
        let now = Utc::now();
        let mut size = 0usize;
        let mut due = Vec::new();
        self.entries.retain(|url, entry| {
            let expired = entry
                .entry_created
                .map(|t| now - t > self.ttl)
                .unwrap_or(true);
            if expired {
                tracing::info!("清理缓存条目 {url}");
            } else {
                size += entry.image_len();
            }
            let stale = entry
                .last_refresh_attempt
                .map(|t| now - t > self.auto_refresh_after)
                .unwrap_or(true);
            if stale {
                due.push(entry.clone());
            }
            !expired
        });
        for entry in due {
            self.refresh.request_refresh(entry);
        }
        tracing::info!(
            "缓存中有 {} 张图片（{}）",
            self.entries.len(),
            fmt_byte_size(size)
        );
    }
}
