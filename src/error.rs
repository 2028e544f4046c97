use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 应用统一错误类型
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum AppError {
    /// 参数校验错误（缺少 url/s、URL 不合法等）
    #[error("参数校验错误: {0}")]
    Validation(String),

    /// 签名校验失败
    #[error("Signature check failed")]
    SignatureFail,

    /// 背景刷新触发频率超限
    #[error("背景刷新频率超限: {0}")]
    RateLimited(String),

    /// 配置错误（启动期）
    #[error("配置错误: {0}")]
    Config(String),

    /// 内部服务器错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// 截图抓取错误
    #[error("截图抓取错误: {0}")]
    Capture(#[from] CaptureError),
}

/// 截图抓取链路（Decap 调用 + 裁剪）的错误类型。
///
/// 管线需要区分"可落缓存"的失败（Decap 500 / 裁剪失败，缓存失败条目并以
/// 兜底图回应）与纯瞬态错误（连接失败等，不产生缓存副作用）。
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum CaptureError {
    /// 无法连接 Decap（连接 / 传输层失败）
    #[error("couldn't connect to Decap: {0}")]
    RendererUnreachable(String),

    /// Decap 内部错误（HTTP 500，可缓存为失败条目）
    #[error("internal Decap error: {0}")]
    RendererInternal(String),

    /// Decap 请求失败（非 200 / content-type 不符）
    #[error("unsuccessful Decap request: {0}")]
    RendererRequest(String),

    /// Decap 返回的 PNG 无法解码
    #[error("couldn't decode PNG from Decap: {0}")]
    RendererDecode(String),

    /// 裁剪失败（裁剪后高度不足 314px，可缓存为失败条目）
    #[error("crop failure")]
    CropFailure,

    /// 生成的 PNG 编码失败
    #[error("failed to encode the generated PNG: {0}")]
    Encode(String),
}

impl CaptureError {
    /// 是否应以"失败条目"形式写入缓存（后续读取以兜底图替身返回）。
    pub fn is_cacheable_failure(&self) -> bool {
        matches!(
            self,
            CaptureError::RendererInternal(_) | CaptureError::CropFailure
        )
    }
}

/// RFC7807 风格的错误响应（Problem Details）。
///
/// 与上游服务保持同一错误外形：结构化 JSON + 稳定错误码，
/// content-type = application/problem+json。
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    /// 问题类型（URI）。若无更细分的类型，可使用 about:blank。
    #[serde(rename = "type")]
    #[schema(example = "about:blank")]
    pub type_url: String,

    /// 简短标题，用于概括错误。
    #[schema(example = "Bad Request")]
    pub title: String,

    /// HTTP 状态码（与响应 status 一致）。
    #[schema(example = 400)]
    pub status: u16,

    /// 人类可读的详细信息（尽量稳定，不建议依赖解析）。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// 稳定的错误码，用于程序化处理。
    #[schema(example = "SIGNATURE_CHECK_FAILED")]
    pub code: String,

    /// 可选：请求追踪 ID。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::SignatureFail => StatusCode::BAD_REQUEST,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // 瞬态抓取错误未被管线消化时一律按 500 返回
            AppError::Capture(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn stable_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::SignatureFail => "SIGNATURE_CHECK_FAILED",
            AppError::RateLimited(_) => "BG_RATE_LIMITED",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Capture(e) => match e {
                CaptureError::RendererUnreachable(_) => "RENDERER_UNREACHABLE",
                CaptureError::RendererInternal(_) => "RENDERER_INTERNAL",
                CaptureError::RendererRequest(_) => "RENDERER_REQUEST_FAILED",
                CaptureError::RendererDecode(_) => "RENDERER_DECODE_FAILED",
                CaptureError::CropFailure => "CROP_FAILED",
                CaptureError::Encode(_) => "PNG_ENCODE_FAILED",
            },
        }
    }

    fn title(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "Bad Request",
            StatusCode::TOO_MANY_REQUESTS => "Too Many Requests",
            StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
            _ => "Error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let problem = ProblemDetails {
            type_url: "about:blank".to_string(),
            title: self.title().to_string(),
            status: status.as_u16(),
            detail: Some(self.to_string()),
            code: self.stable_code().to_string(),
            request_id: crate::request_id::current_request_id(),
        };

        let mut res = Json(problem).into_response();
        *res.status_mut() = status;
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        res
    }
}

// =============== Error conversions for common external errors ===============

impl From<reqwest::Error> for CaptureError {
    fn from(err: reqwest::Error) -> Self {
        // 连接失败 / 超时 / 传输中断都归为"无法连接 Decap"
        CaptureError::RendererUnreachable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, CaptureError};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn cacheable_failures_are_internal_and_crop_only() {
        assert!(CaptureError::RendererInternal("500".into()).is_cacheable_failure());
        assert!(CaptureError::CropFailure.is_cacheable_failure());
        assert!(!CaptureError::RendererUnreachable("refused".into()).is_cacheable_failure());
        assert!(!CaptureError::RendererRequest("404".into()).is_cacheable_failure());
        assert!(!CaptureError::RendererDecode("bad png".into()).is_cacheable_failure());
    }

    #[test]
    fn signature_fail_maps_to_400() {
        let res = AppError::SignatureFail.into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rate_limited_maps_to_429() {
        let res = AppError::RateLimited("wait".into()).into_response();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
