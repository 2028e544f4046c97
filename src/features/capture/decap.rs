use image::RgbaImage;
use reqwest::header;
use serde::Serialize;
use url::Url;

use crate::error::CaptureError;

use super::profile::CaptureProfile;

/// Decap browse 请求体。字段名与 Decap 的接口约定保持一致（PascalCase）。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BrowseRequest {
    pub emulate_viewport: ViewportBlock,
    /// duration 字符串，如 "2500ms"
    pub render_delay: String,
    /// duration 字符串，如 "10s"
    pub timeout: String,
    pub query: Vec<QueryBlock>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ViewportBlock {
    pub width: u32,
    pub height: u32,
    pub mobile: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryBlock {
    pub actions: Vec<Action>,
}

/// Decap 动作：首元素是动作名，其余是参数。
pub type Action = Vec<String>;

fn action(list: &[&str]) -> Action {
    list.iter().map(|s| s.to_string()).collect()
}

/// 外部无头浏览器渲染服务（Decap）的 HTTP 客户端。
#[derive(Debug, Clone)]
pub struct DecapClient {
    base_url: String,
}

impl DecapClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    /// 组装 navigate → sleep → 清理导航元素 → sleep → screenshot 的动作序列。
    fn browse_request(target: &Url, profile: &CaptureProfile) -> BrowseRequest {
        let d0 = format!("{}ms", profile.init_delay.as_millis());
        let d1 = format!("{}ms", profile.followup_delay.as_millis());
        BrowseRequest {
            emulate_viewport: ViewportBlock {
                width: super::cropper::OG_IMAGE_WIDTH,
                height: 1200,
                mobile: true,
            },
            render_delay: d0.clone(),
            timeout: format!("{}s", profile.timeout.as_secs()),
            query: vec![QueryBlock {
                actions: vec![
                    action(&["navigate", target.as_str()]),
                    action(&["sleep", &d0]),
                    action(&["remove_info_boxes"]),
                    action(&["remove_nav_sections"]),
                    action(&["hide_nav_buttons"]),
                    action(&["sleep", &d1]),
                    action(&["screenshot"]),
                ],
            }],
        }
    }

    /// 请求 Decap 截图并解码 PNG。
    ///
    /// 错误分类：连接失败 → `RendererUnreachable`；HTTP 500 →
    /// `RendererInternal`（可落缓存）；其余非 200 / content-type 不符 →
    /// `RendererRequest`；PNG 解码失败 → `RendererDecode`。
    pub async fn screenshot(
        &self,
        target: &Url,
        profile: &CaptureProfile,
    ) -> Result<RgbaImage, CaptureError> {
        let req = Self::browse_request(target, profile);
        tracing::info!(
            url = %target,
            d0 = %req.render_delay,
            timeout = %req.timeout,
            "请求 Decap 截图"
        );

        let client = profile
            .http_client()
            .map_err(|e| CaptureError::RendererUnreachable(e.to_string()))?;
        let res = client
            .post(format!("{}/api/decap/v0/browse", self.base_url))
            .json(&req)
            .send()
            .await?;

        let status = res.status();
        let content_type = res
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if status.as_u16() != 200 || content_type != "image/png" {
            let msg = res.text().await.unwrap_or_default();
            if status.as_u16() == 500 {
                return Err(CaptureError::RendererInternal(format!("{status}; {msg}")));
            }
            return Err(CaptureError::RendererRequest(format!("{status}; {msg}")));
        }

        let body = res.bytes().await?;
        let decoded = image::load_from_memory_with_format(&body, image::ImageFormat::Png)
            .map_err(|e| CaptureError::RendererDecode(e.to_string()))?;
        Ok(decoded.to_rgba8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browse_request_serializes_pascal_case_wire_format() {
        let target = Url::parse("https://www.example.com/jobs/42").expect("url");
        let profile = CaptureProfile::fast(std::time::Duration::from_millis(500));
        let req = DecapClient::browse_request(&target, &profile);
        let json = serde_json::to_value(&req).expect("serialize");

        assert_eq!(json["EmulateViewport"]["Width"], 600);
        assert_eq!(json["EmulateViewport"]["Height"], 1200);
        assert_eq!(json["EmulateViewport"]["Mobile"], true);
        // fast profile：2500ms 基础延迟 + 500ms 主机附加延迟
        assert_eq!(json["RenderDelay"], "3000ms");
        assert_eq!(json["Timeout"], "10s");

        let actions = json["Query"][0]["Actions"].as_array().expect("actions");
        assert_eq!(actions.len(), 7);
        assert_eq!(actions[0][0], "navigate");
        assert_eq!(actions[0][1], "https://www.example.com/jobs/42");
        assert_eq!(actions[1][0], "sleep");
        assert_eq!(actions[1][1], "3000ms");
        assert_eq!(actions[2][0], "remove_info_boxes");
        assert_eq!(actions[3][0], "remove_nav_sections");
        assert_eq!(actions[4][0], "hide_nav_buttons");
        assert_eq!(actions[5][1], "1250ms");
        assert_eq!(actions[6][0], "screenshot");
    }

    #[test]
    fn slow_profile_uses_long_delays() {
        let target = Url::parse("https://example.com/").expect("url");
        let profile = CaptureProfile::slow();
        let req = DecapClient::browse_request(&target, &profile);
        assert_eq!(req.render_delay, "10000ms");
        assert_eq!(req.timeout, "25s");
        assert_eq!(req.query[0].actions[5][1], "5000ms");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = DecapClient::new("http://localhost:4531/");
        assert_eq!(client.base_url, "http://localhost:4531");
    }
}
