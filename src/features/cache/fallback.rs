use std::time::Duration;

use bytes::Bytes;
use url::Url;

use crate::features::capture::cropper::{OG_IMAGE_HEIGHT, OG_IMAGE_WIDTH, encode_png};

use super::CacheHandle;

/// 下载失败后的重试间隔
const RETRY_DELAY: Duration = Duration::from_secs(15);

/// 启动兜底图加载任务：下载、裁剪为 600x314、重编码并安装进缓存。
/// 任何一步失败都会在 15s 后无限重试；在成功之前缓存继续使用启动时
/// 编码的空 PNG。
pub fn spawn_fallback_loader(cache: CacheHandle, fallback_url: String) {
    if Url::parse(&fallback_url).is_err() {
        if !fallback_url.is_empty() {
            tracing::error!("兜底图 URL 不合法: {fallback_url}");
        }
        return;
    }
    tokio::spawn(async move {
        loop {
            match fetch_fallback(&fallback_url).await {
                Ok(image) => {
                    tracing::info!("兜底图已替换为 {fallback_url}");
                    cache.replace_fallback(image).await;
                    return;
                }
                Err(msg) => {
                    tracing::warn!("兜底图不可用（{fallback_url}）: {msg}");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    });
}

async fn fetch_fallback(url: &str) -> Result<Bytes, String> {
    let client = crate::http::client_default().map_err(|e| e.to_string())?;
    let res = client.get(url).send().await.map_err(|e| e.to_string())?;
    if res.status().as_u16() != 200 {
        return Err(res.status().to_string());
    }
    let body = res.bytes().await.map_err(|e| e.to_string())?;
    let m = image::load_from_memory_with_format(&body, image::ImageFormat::Png)
        .map_err(|e| e.to_string())?
        .to_rgba8();
    let cropped = image::imageops::crop_imm(&m, 0, 0, OG_IMAGE_WIDTH, OG_IMAGE_HEIGHT).to_image();
    let png = encode_png(&cropped).map_err(|e| e.to_string())?;
    Ok(Bytes::from(png))
}
