use std::time::Duration;

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// 全局配置单例
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
}

impl ServerConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }
    fn default_port() -> u16 {
        19165
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

/// API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API 路由前缀
    #[serde(default = "ApiConfig::default_prefix")]
    pub prefix: String,
}

impl ApiConfig {
    fn default_prefix() -> String {
        "/api/spectura/v0".to_string()
    }

    /// screenshot 端点完整路径（用于 info 页重建自引用链接）
    pub fn screenshot_path(&self) -> String {
        format!("{}/screenshot", self.prefix)
    }

    /// info 端点完整路径（Referer 命中时不更新访问元数据）
    pub fn info_path(&self) -> String {
        format!("{}/info", self.prefix)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: Self::default_prefix(),
        }
    }
}

/// 缓存与刷新调度配置。
///
/// 时长字段保存 duration 字符串（"48h"、"5m"、"5s"），与部署侧
/// 环境变量的书写格式一致，启动时统一校验。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// 条目存活时间（自 EntryCreated 起算）
    #[serde(default = "CacheConfig::default_ttl")]
    pub ttl: String,
    /// GC 与自动刷新扫描的周期
    #[serde(default = "CacheConfig::default_schedule_interval")]
    pub schedule_interval: String,
    /// 距上次刷新尝试超过该时长的条目进入自动刷新
    #[serde(default = "CacheConfig::default_auto_refresh_after")]
    pub auto_refresh_after: String,
    /// 刷新队列相邻任务的最小间隔
    #[serde(default = "CacheConfig::default_refresh_task_delay")]
    pub refresh_task_delay: String,
    /// 背景刷新请求的最小间隔（限流窗口）
    #[serde(default = "CacheConfig::default_bg_rate_limit_time")]
    pub bg_rate_limit_time: String,
    /// 生成图片的告警阈值（MiB）
    #[serde(default = "CacheConfig::default_max_image_size_mib")]
    pub max_image_size_mib: u64,
    /// 是否忽略背景刷新请求（运维开关）
    #[serde(default = "CacheConfig::default_ignore_background_requests")]
    pub ignore_background_requests: bool,
}

impl CacheConfig {
    fn default_ttl() -> String {
        std::env::var("CACHE_TTL").unwrap_or_else(|_| "48h".into())
    }
    fn default_schedule_interval() -> String {
        std::env::var("SCHEDULE_INTERVAL").unwrap_or_else(|_| "5m".into())
    }
    fn default_auto_refresh_after() -> String {
        std::env::var("AUTO_REFRESH_AFTER").unwrap_or_else(|_| "6h".into())
    }
    fn default_refresh_task_delay() -> String {
        std::env::var("REFRESH_TASK_DELAY").unwrap_or_else(|_| "5s".into())
    }
    fn default_bg_rate_limit_time() -> String {
        std::env::var("BG_RATE_LIMIT_TIME").unwrap_or_else(|_| "3h".into())
    }
    fn default_max_image_size_mib() -> u64 {
        std::env::var("MAX_IMAGE_SIZE_MIB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20)
    }
    fn default_ignore_background_requests() -> bool {
        std::env::var("IGNORE_BACKGROUND_REQUESTS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false)
    }

    /// 图片大小告警阈值（字节）
    pub fn max_image_size(&self) -> usize {
        const BYTES_IN_MIB: u64 = 1 << 20;
        (self.max_image_size_mib * BYTES_IN_MIB) as usize
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Self::default_ttl(),
            schedule_interval: Self::default_schedule_interval(),
            auto_refresh_after: Self::default_auto_refresh_after(),
            refresh_task_delay: Self::default_refresh_task_delay(),
            bg_rate_limit_time: Self::default_bg_rate_limit_time(),
            max_image_size_mib: Self::default_max_image_size_mib(),
            ignore_background_requests: Self::default_ignore_background_requests(),
        }
    }
}

/// Decap（外部无头浏览器渲染服务）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecapConfig {
    /// Decap 基地址
    #[serde(default = "DecapConfig::default_url")]
    pub url: String,
}

impl DecapConfig {
    fn default_url() -> String {
        std::env::var("DECAP_URL").unwrap_or_else(|_| "http://localhost:4531".into())
    }
}

impl Default for DecapConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
        }
    }
}

/// 链接签名配置（JIX::UrlSignature 兼容）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// 是否启用签名校验
    #[serde(default = "SigningConfig::default_enabled")]
    pub enabled: bool,
    /// HMAC key
    #[serde(default = "SigningConfig::default_key")]
    pub key: String,
    /// 参与摘要的共享 secret
    #[serde(default = "SigningConfig::default_secret")]
    pub secret: String,
    /// 服务实例标识（进入签名负载）
    #[serde(default = "SigningConfig::default_unique_name")]
    pub unique_name: String,
}

impl SigningConfig {
    fn default_enabled() -> bool {
        std::env::var("USE_SIGNATURES")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true)
    }
    fn default_key() -> String {
        std::env::var("SIGNING_KEY").unwrap_or_default()
    }
    fn default_secret() -> String {
        std::env::var("SIGNING_SECRET").unwrap_or_default()
    }
    fn default_unique_name() -> String {
        std::env::var("SIGNING_UNIQUE_NAME").unwrap_or_else(|_| "jix_spectura".into())
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            key: Self::default_key(),
            secret: Self::default_secret(),
            unique_name: Self::default_unique_name(),
        }
    }
}

/// Webhook 通知配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// 通知地址（为空则禁用）
    #[serde(default = "WebhookConfig::default_url")]
    pub url: String,
    /// Authorization 头原文
    #[serde(default = "WebhookConfig::default_authorization_header")]
    pub authorization_header: String,
}

impl WebhookConfig {
    fn default_url() -> String {
        std::env::var("WEBHOOK_URL").unwrap_or_default()
    }
    fn default_authorization_header() -> String {
        std::env::var("WEBHOOK_AUTHORIZATION_HEADER").unwrap_or_default()
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            authorization_header: Self::default_authorization_header(),
        }
    }
}

/// 图像相关外部资源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// 每主机渲染参数表（本地路径或 HTTP URL）
    #[serde(default = "ImageConfig::default_conf_path")]
    pub conf_path: String,
    /// 兜底图地址（过期 / 渲染失败时的替身图）
    #[serde(default = "ImageConfig::default_fallback_url")]
    pub fallback_url: String,
}

impl ImageConfig {
    fn default_conf_path() -> String {
        std::env::var("IMAGE_CONF_PATH").unwrap_or_else(|_| "image_conf.json".into())
    }
    fn default_fallback_url() -> String {
        std::env::var("FALLBACK_IMAGE_URL")
            .unwrap_or_else(|_| "https://www.jobindex.dk/img/jobindex20/spectura_adshare.png".into())
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            conf_path: Self::default_conf_path(),
            fallback_url: Self::default_fallback_url(),
        }
    }
}

/// 管理员配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// 背景刷新限流的旁路令牌（为空则无人可旁路）
    #[serde(default = "AdminConfig::default_token")]
    pub token: String,
}

impl AdminConfig {
    fn default_token() -> String {
        std::env::var("ADMIN_TOKEN").unwrap_or_default()
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            token: Self::default_token(),
        }
    }
}

/// 应用配置聚合
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub decap: DecapConfig,
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

/// 解析人类可读的 duration 字符串（"48h" / "5m" / "2500ms"）。
/// 解析失败时回退到 fallback 并告警，避免运行期 panic。
pub fn parse_duration_or(value: &str, fallback: Duration) -> Duration {
    match humantime::parse_duration(value) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!("无法解析时长配置 {value:?}: {e}，回退到 {fallback:?}");
            fallback
        }
    }
}

impl AppConfig {
    /// 加载配置：可选的 config.toml + 环境变量（SPECTURA_ 前缀覆盖嵌套字段），
    /// 平铺环境变量（CACHE_TTL 等）通过各字段默认值兜底。
    pub fn load() -> Result<Self, ConfigError> {
        let builder = ConfigBuilder::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("SPECTURA").separator("__"))
            .build()?;

        let config: AppConfig = builder.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 启动期校验：时长格式与签名材料，缺失直接拒绝启动。
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("CACHE_TTL", &self.cache.ttl),
            ("SCHEDULE_INTERVAL", &self.cache.schedule_interval),
            ("AUTO_REFRESH_AFTER", &self.cache.auto_refresh_after),
            ("REFRESH_TASK_DELAY", &self.cache.refresh_task_delay),
            ("BG_RATE_LIMIT_TIME", &self.cache.bg_rate_limit_time),
        ] {
            humantime::parse_duration(value).map_err(|e| {
                ConfigError::Message(format!(
                    "{name} must be a valid duration such as \"12h\": {e}"
                ))
            })?;
        }

        if self.signing.enabled {
            if self.signing.key.is_empty() {
                return Err(ConfigError::Message(
                    "missing environment variable SIGNING_KEY (alternatively set USE_SIGNATURES=false)"
                        .into(),
                ));
            }
            if self.signing.secret.is_empty() {
                return Err(ConfigError::Message(
                    "missing environment variable SIGNING_SECRET (alternatively set USE_SIGNATURES=false)"
                        .into(),
                ));
            }
        }
        Ok(())
    }

    /// 获取全局配置
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<(), ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(())
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn cache_ttl(&self) -> Duration {
        parse_duration_or(&self.cache.ttl, Duration::from_secs(48 * 3600))
    }

    pub fn schedule_interval(&self) -> Duration {
        parse_duration_or(&self.cache.schedule_interval, Duration::from_secs(300))
    }

    pub fn auto_refresh_after(&self) -> Duration {
        parse_duration_or(&self.cache.auto_refresh_after, Duration::from_secs(6 * 3600))
    }

    pub fn refresh_task_delay(&self) -> Duration {
        parse_duration_or(&self.cache.refresh_task_delay, Duration::from_secs(5))
    }

    pub fn bg_rate_limit_time(&self) -> Duration {
        parse_duration_or(&self.cache.bg_rate_limit_time, Duration::from_secs(3 * 3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_accessors_parse_go_style_strings() {
        let config = AppConfig {
            cache: CacheConfig {
                ttl: "48h".into(),
                schedule_interval: "5m".into(),
                auto_refresh_after: "6h".into(),
                refresh_task_delay: "5s".into(),
                bg_rate_limit_time: "3h".into(),
                ..CacheConfig::default()
            },
            ..AppConfig::default()
        };
        assert_eq!(config.cache_ttl(), Duration::from_secs(48 * 3600));
        assert_eq!(config.schedule_interval(), Duration::from_secs(300));
        assert_eq!(config.auto_refresh_after(), Duration::from_secs(6 * 3600));
        assert_eq!(config.refresh_task_delay(), Duration::from_secs(5));
        assert_eq!(config.bg_rate_limit_time(), Duration::from_secs(3 * 3600));
    }

    #[test]
    fn invalid_duration_falls_back_to_default() {
        assert_eq!(
            parse_duration_or("not-a-duration", Duration::from_secs(7)),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn signing_validation_requires_key_and_secret() {
        let config = AppConfig {
            signing: SigningConfig {
                enabled: true,
                key: String::new(),
                secret: "s".into(),
                unique_name: "jix_spectura".into(),
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            signing: SigningConfig {
                enabled: false,
                key: String::new(),
                secret: String::new(),
                unique_name: "jix_spectura".into(),
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn api_paths_derive_from_prefix() {
        let api = ApiConfig::default();
        assert_eq!(api.screenshot_path(), "/api/spectura/v0/screenshot");
        assert_eq!(api.info_path(), "/api/spectura/v0/info");
    }
}
