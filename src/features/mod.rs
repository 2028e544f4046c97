/// 条目存储、刷新调度、webhook 与兜底图
pub mod cache;

/// Decap 抓取与裁剪
pub mod capture;

/// screenshot 请求管线
pub mod screenshot;
