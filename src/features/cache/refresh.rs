use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use crate::features::capture::CaptureService;

use super::CacheHandle;
use super::entry::CacheEntry;

/// 刷新队列容量：吸收周期扫描与请求触发的突发入队，
/// 队列满时入队方（独立 task）阻塞，形成背压。
const REFRESH_QUEUE_CAPACITY: usize = 10;

/// 背景刷新调度器。
///
/// 专职 worker 每次从队列取出一个 rendezvous 令牌并放行，随后睡眠
/// `task_delay`，以此限制对 Decap 的出站压力。刷新任务本身在放行后
/// 用慢速档抓取并写回缓存。
#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    queue: mpsc::Sender<oneshot::Sender<()>>,
    cache: CacheHandle,
    capture: Arc<CaptureService>,
}

impl RefreshScheduler {
    /// 启动调度 worker 并返回句柄。
    pub fn spawn(cache: CacheHandle, capture: Arc<CaptureService>, task_delay: Duration) -> Self {
        let (queue, mut rx) = mpsc::channel::<oneshot::Sender<()>>(REFRESH_QUEUE_CAPACITY);
        tokio::spawn(async move {
            while let Some(release) = rx.recv().await {
                // 放行一个刷新任务，再按最小间隔节流
                let _ = release.send(());
                tokio::time::sleep(task_delay).await;
            }
        });
        Self {
            queue,
            cache,
            capture,
        }
    }

    /// 调度一次背景刷新；立即返回，不阻塞调用方。
    pub fn request_refresh(&self, entry: CacheEntry) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_refresh_task(entry).await;
        });
    }

    /// 刷新任务主体：
    /// 1. 先盖 last_refresh_attempt 戳并发布（后续 bg 请求在排队期间即被限流）；
    /// 2. 入队 rendezvous 令牌并等待放行；
    /// 3. 慢速档抓取 + 裁剪；
    /// 4. 成功则 Write（merge 决定是否采用新图），失败记日志后放弃 ——
    ///    元数据戳已经算作一次尝试。
    async fn run_refresh_task(&self, mut entry: CacheEntry) {
        let Some(url) = entry.url.clone() else {
            return;
        };
        entry.last_refresh_attempt = Some(Utc::now());
        self.cache.write_metadata(entry.clone()).await;

        let (release_tx, release_rx) = oneshot::channel();
        if self.queue.send(release_tx).await.is_err() {
            return;
        }
        if release_rx.await.is_err() {
            return;
        }

        tracing::info!(score = entry.score, url = %url, "Cache refresh");
        match self.capture.capture(&url, true, false).await {
            Ok(captured) => {
                entry.image = Some(captured.png);
                entry.score = captured.score;
                self.cache.write(entry).await;
            }
            Err(e) => {
                tracing::warn!(url = %url, "放弃本次图片刷新: {e}");
            }
        }
    }
}
