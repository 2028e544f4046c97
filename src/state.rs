use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::features::cache::{
    CacheHandle, RefreshScheduler, StoreConfig, WebhookNotifier, fallback, spawn_entry_store,
};
use crate::features::capture::{CaptureService, HostConfMap};
use crate::features::screenshot::signature::UrlSigner;

/// 请求管线的运行参数（启动时定格，只读）。
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 背景刷新限流窗口
    pub bg_rate_limit_time: Duration,
    /// 忽略所有背景刷新请求（运维开关）
    pub ignore_background_requests: bool,
    /// 限流旁路令牌（为空则无人可旁路）
    pub admin_token: String,
    /// 过期/缺失 expire 时重定向到的兜底图地址
    pub fallback_image_url: String,
    /// info 端点路径（Referer 命中时不更新访问元数据）
    pub info_path: String,
    /// screenshot 端点路径（info 页重建自引用链接用）
    pub screenshot_path: String,
}

/// 聚合的应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub cache: CacheHandle,
    pub capture: Arc<CaptureService>,
    pub refresh: RefreshScheduler,
    pub signer: Arc<UrlSigner>,
    pub pipeline: Arc<PipelineConfig>,
}

impl AppState {
    /// 组装全部后台组件：条目存储 owner task、刷新调度 worker、
    /// 兜底图加载任务。必须在 tokio runtime 内调用。
    pub fn build(config: &AppConfig, host_conf: HostConfMap) -> Self {
        let capture = Arc::new(CaptureService::new(config, host_conf));
        let (cache, store_rx) = CacheHandle::new_pair();
        let refresh = RefreshScheduler::spawn(
            cache.clone(),
            capture.clone(),
            config.refresh_task_delay(),
        );
        let webhook = WebhookNotifier::new(&config.webhook);
        spawn_entry_store(
            store_rx,
            StoreConfig::from_app_config(config),
            webhook,
            refresh.clone(),
        );
        fallback::spawn_fallback_loader(cache.clone(), config.image.fallback_url.clone());

        Self {
            cache,
            capture,
            refresh,
            signer: Arc::new(UrlSigner::from_config(&config.signing)),
            pipeline: Arc::new(PipelineConfig {
                bg_rate_limit_time: config.bg_rate_limit_time(),
                ignore_background_requests: config.cache.ignore_background_requests,
                admin_token: config.admin.token.clone(),
                fallback_image_url: config.image.fallback_url.clone(),
                info_path: config.api.info_path(),
                screenshot_path: config.api.screenshot_path(),
            }),
        }
    }
}
