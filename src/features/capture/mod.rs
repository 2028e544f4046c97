/// Decap 客户端（渲染请求编码与错误分类）
pub mod decap;

/// 裁剪启发式与信息密度分值
pub mod cropper;

/// 每主机渲染参数表
pub mod host_conf;

/// 抓取时序档位
pub mod profile;

use bytes::Bytes;
use url::Url;

use crate::bytesize::fmt_byte_size;
use crate::config::AppConfig;
use crate::error::CaptureError;

pub use cropper::{OG_IMAGE_HEIGHT, OG_IMAGE_WIDTH};
pub use host_conf::{HostConfEntry, HostConfMap};
pub use profile::CaptureProfile;

/// 一次成功抓取的产物。
#[derive(Debug, Clone)]
pub struct Captured {
    /// 裁剪并重编码后的 PNG 字节
    pub png: Bytes,
    /// 信息密度分值（见 cropper::image_score）
    pub score: i32,
}

/// 抓取服务：Decap 调用 + 裁剪 + PNG 编码，一步到位。
#[derive(Debug, Clone)]
pub struct CaptureService {
    decap: decap::DecapClient,
    host_conf: HostConfMap,
    max_image_size: usize,
}

impl CaptureService {
    pub fn new(config: &AppConfig, host_conf: HostConfMap) -> Self {
        Self {
            decap: decap::DecapClient::new(config.decap.url.clone()),
            host_conf,
            max_image_size: config.cache.max_image_size(),
        }
    }

    /// 抓取目标页面截图。`background` 选择慢速档（背景刷新）；
    /// `nocrop` 跳过裁剪直接返回整图（调试路径）。
    pub async fn capture(
        &self,
        target: &Url,
        background: bool,
        nocrop: bool,
    ) -> Result<Captured, CaptureError> {
        let host = self.host_conf.lookup(target.host_str().unwrap_or_default());
        let profile = if background {
            CaptureProfile::slow()
        } else {
            CaptureProfile::fast(host.delay_duration())
        };

        let m = self.decap.screenshot(target, &profile).await?;
        let m = if nocrop {
            m
        } else {
            cropper::crop_image(&m, host.voffset)?
        };

        let score = cropper::image_score(&m);
        let png = cropper::encode_png(&m)?;
        if png.len() > self.max_image_size {
            tracing::warn!(
                "生成图片大小（{}）超过 {}",
                fmt_byte_size(png.len()),
                fmt_byte_size(self.max_image_size)
            );
        }
        Ok(Captured {
            png: Bytes::from(png),
            score,
        })
    }
}
