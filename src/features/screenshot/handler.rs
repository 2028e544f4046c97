use axum::{
    Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use url::Url;

use crate::error::AppError;
use crate::features::cache::{CacheEntry, Provenance};
use crate::state::AppState;

use super::types::{InfoEntry, InfoResponse, ScreenshotQuery};

pub fn create_screenshot_router() -> Router<AppState> {
    Router::new()
        .route("/screenshot", get(get_screenshot))
        .route("/info", get(get_info))
}

/// 以 image/png 回应
fn png_response(image: Bytes) -> Response {
    (
        [(header::CONTENT_TYPE, HeaderValue::from_static("image/png"))],
        image,
    )
        .into_response()
}

/// 302 重定向到兜底图（过期 / 缺失 expire 的统一出口）
fn fallback_redirect(location: &str) -> Response {
    let location = HeaderValue::from_str(location)
        .unwrap_or_else(|_| HeaderValue::from_static("about:blank"));
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// 从请求头提取首个请求方的归因信息。
/// 反向代理部署下优先 X-Forwarded-For 的首项，其次 X-Real-Ip。
fn provenance_from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Provenance {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let remote_addr = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| header_str("x-real-ip"));
    Provenance {
        remote_addr,
        referer: header_str("referer"),
        user_agent: header_str("user-agent"),
        when: Some(now),
    }
}

fn is_set(param: &Option<String>) -> bool {
    param.as_deref().is_some_and(|v| !v.is_empty())
}

#[utoipa::path(
    get,
    path = "/screenshot",
    summary = "获取目标页面的 OG 预览截图",
    description = "返回 600x314 PNG：优先命中缓存，未命中则同步调用 Decap 抓取并裁剪。\
        expire 缺失或已过期时 302 到兜底图；bg 非空时只调度背景刷新。",
    params(ScreenshotQuery),
    responses(
        (status = 200, description = "PNG 预览图（bg 请求则为纯文本确认）", content_type = "image/png"),
        (status = 302, description = "已过期/缺失 expire，重定向到兜底图"),
        (status = 400, description = "参数或签名校验失败", body = crate::error::ProblemDetails,
            content_type = "application/problem+json"),
        (status = 429, description = "背景刷新频率超限", body = crate::error::ProblemDetails,
            content_type = "application/problem+json"),
        (status = 500, description = "渲染/编码失败", body = crate::error::ProblemDetails,
            content_type = "application/problem+json")
    ),
    tag = "Screenshot"
)]
pub async fn get_screenshot(
    State(state): State<AppState>,
    Query(q): Query<ScreenshotQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let target_raw = q
        .url
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(r#"Query param "url" must be present"#.into()))?;
    let signature = q.s.clone().unwrap_or_default();
    if state.signer.enabled() && signature.is_empty() {
        return Err(AppError::Validation(
            r#"Query param "s" must be present"#.into(),
        ));
    }

    let target = Url::parse(target_raw).map_err(|e| AppError::Validation(e.to_string()))?;

    // expire 以查询串原文参与签名，格式差异也会导致校验失败
    let expire_raw = q.expire.clone().unwrap_or_default();
    if !state.signer.verify(target_raw, &signature, &expire_raw) {
        return Err(AppError::SignatureFail);
    }
    let expire_unix: i64 = if expire_raw.is_empty() {
        0
    } else {
        expire_raw
            .parse()
            .map_err(|_| AppError::Validation(r#"Query param "expire" must be an integer"#.into()))?
    };

    let now = Utc::now();
    if expire_unix == 0 || now.timestamp() >= expire_unix {
        return Ok(fallback_redirect(&state.pipeline.fallback_image_url));
    }
    let expire = DateTime::from_timestamp(expire_unix, 0);

    // 调试路径：签名关闭时允许跳过裁剪，直接回整图，不碰缓存
    if is_set(&q.nocrop) && !state.signer.enabled() {
        let captured = state.capture.capture(&target, false, true).await?;
        return Ok(png_response(captured.png));
    }

    let entry = state.cache.read(target.as_str()).await;

    if is_set(&q.bg) {
        return background_request(&state, &q, &target, signature, expire, entry, now).await;
    }

    if entry.is_empty() {
        return foreground_capture(&state, &headers, &target, signature, expire, now).await;
    }

    // 缓存命中：info 页发起的预览不计入访问元数据
    let from_info_page = headers
        .get("referer")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|r| r.contains(&state.pipeline.info_path));
    if !from_info_page {
        let meta = CacheEntry {
            url: Some(target.clone()),
            signature,
            expire,
            last_fetched: Some(now),
            provenance: provenance_from_headers(&headers, now),
            ..CacheEntry::default()
        };
        state.cache.write_metadata(meta).await;
    }

    Ok(png_response(entry.image.unwrap_or_default()))
}

/// bg 请求：限流检查后只调度背景刷新，立即以纯文本确认。
async fn background_request(
    state: &AppState,
    q: &ScreenshotQuery,
    target: &Url,
    signature: String,
    expire: Option<DateTime<Utc>>,
    entry: CacheEntry,
    now: DateTime<Utc>,
) -> Result<Response, AppError> {
    if state.pipeline.ignore_background_requests {
        return Ok((StatusCode::OK, "Ignored").into_response());
    }

    let mut entry = entry;
    if entry.is_empty() {
        entry = CacheEntry {
            url: Some(target.clone()),
            signature,
            expire,
            ..CacheEntry::default()
        };
    } else {
        let admin_bypass = !state.pipeline.admin_token.is_empty()
            && q.token.as_deref() == Some(state.pipeline.admin_token.as_str());
        if !admin_bypass
            && let Some(last_attempt) = entry.last_refresh_attempt
            && now - last_attempt
                < chrono::TimeDelta::from_std(state.pipeline.bg_rate_limit_time)
                    .unwrap_or(chrono::TimeDelta::MAX)
        {
            return Err(AppError::RateLimited(format!(
                "距上次刷新尝试不足 {:?}",
                state.pipeline.bg_rate_limit_time
            )));
        }
    }

    // 先盖限流戳再入队，排队期间的并发 bg 请求即被拒绝
    entry.last_refresh_attempt = Some(now);
    state.cache.write_metadata(entry.clone()).await;
    state.refresh.request_refresh(entry);

    Ok((StatusCode::OK, "Background refresh scheduled").into_response())
}

/// 缓存未命中时的同步抓取。
///
/// Decap 500 与裁剪失败会落一个失败条目（后续读取以兜底图替身返回），
/// 其余错误不产生缓存副作用。
async fn foreground_capture(
    state: &AppState,
    headers: &HeaderMap,
    target: &Url,
    signature: String,
    expire: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Response, AppError> {
    let mut entry = CacheEntry {
        url: Some(target.clone()),
        signature,
        expire,
        last_fetched: Some(now),
        provenance: provenance_from_headers(headers, now),
        ..CacheEntry::default()
    };

    match state.capture.capture(target, false, false).await {
        Ok(captured) => {
            entry.image = Some(captured.png.clone());
            entry.score = captured.score;
            state.cache.write(entry.clone()).await;
            // 紧接着排一次慢速档重抓，通常能得到更完整的页面
            state.refresh.request_refresh(entry);
            Ok(png_response(captured.png))
        }
        Err(e) if e.is_cacheable_failure() => {
            tracing::warn!(url = %target, "抓取失败，缓存失败条目: {e}");
            state.cache.write_metadata(entry).await;
            let stored = state.cache.read(target.as_str()).await;
            Ok(png_response(stored.image.unwrap_or_default()))
        }
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    get,
    path = "/info",
    summary = "缓存条目一览",
    description = "返回全部缓存条目的元数据（含自引用截图链接）与总体量，按首次请求时间倒序。",
    responses(
        (status = 200, description = "缓存概览", body = InfoResponse)
    ),
    tag = "Screenshot"
)]
pub async fn get_info(State(state): State<AppState>) -> Json<InfoResponse> {
    let mut entries = state.cache.read_all().await;
    entries.sort_by(|a, b| b.provenance.when.cmp(&a.provenance.when));

    let total_size: usize = entries.iter().map(|e| e.image_len()).sum();
    let signed = state.signer.enabled();
    let views: Vec<InfoEntry> = entries
        .iter()
        .filter_map(|e| InfoEntry::from_entry(e, &state.pipeline.screenshot_path, signed))
        .collect();

    Json(InfoResponse {
        total_entries: views.len(),
        total_size: crate::bytesize::fmt_byte_size(total_size),
        entries: views,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provenance_prefers_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "9.9.9.9".parse().unwrap());
        headers.insert("referer", "https://ref.example.com/".parse().unwrap());
        headers.insert("user-agent", "facebookexternalhit/1.1".parse().unwrap());

        let now = Utc::now();
        let p = provenance_from_headers(&headers, now);
        assert_eq!(p.remote_addr, "1.2.3.4");
        assert_eq!(p.referer, "https://ref.example.com/");
        assert_eq!(p.user_agent, "facebookexternalhit/1.1");
        assert_eq!(p.when, Some(now));
    }

    #[test]
    fn provenance_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "9.9.9.9".parse().unwrap());
        let p = provenance_from_headers(&headers, Utc::now());
        assert_eq!(p.remote_addr, "9.9.9.9");
    }

    #[test]
    fn empty_params_count_as_unset() {
        assert!(!is_set(&None));
        assert!(!is_set(&Some(String::new())));
        assert!(is_set(&Some("1".into())));
    }
}
