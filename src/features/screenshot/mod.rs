/// screenshot / info 端点
pub mod handler;

/// 链接签名校验
pub mod signature;

/// 请求与响应类型
pub mod types;

pub use handler::create_screenshot_router;
