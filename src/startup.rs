use crate::config::AppConfig;
use crate::error::AppError;
use crate::features::capture::HostConfMap;

/// 执行启动检查
///
/// 加载每主机渲染参数表（本地文件或 HTTP URL）。配置源缺失或无法
/// 解析视为启动期致命错误，而不是留到请求期再失败。
pub async fn run_startup_checks(config: &AppConfig) -> Result<HostConfMap, AppError> {
    tracing::info!("🔍 开始执行启动检查...");

    let host_conf = HostConfMap::load(&config.image.conf_path).await?;
    tracing::info!(
        "✅ 主机渲染参数表加载完成: {}（{} 条）",
        config.image.conf_path,
        host_conf.len()
    );

    if config.signing.enabled {
        tracing::info!("✅ 链接签名校验已启用（unique_name = {}）", config.signing.unique_name);
    } else {
        tracing::warn!("⚠️ 链接签名校验已禁用（USE_SIGNATURES=false）");
    }
    if config.webhook.url.is_empty() {
        tracing::info!("ℹ️ 未配置 WEBHOOK_URL，图片事件通知关闭");
    }

    tracing::info!("✅ 启动检查完成");
    Ok(host_conf)
}
