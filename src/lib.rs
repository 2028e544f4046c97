/// 统一错误处理模块
pub mod error;

/// 配置模块
pub mod config;

/// 启动检查模块
pub mod startup;

/// 功能聚合模块
pub mod features;

/// 应用状态聚合模块
pub mod state;

/// 优雅退出管理模块
pub mod shutdown;

/// request_id 中间件
pub mod request_id;

/// HTTP Client 复用工具
pub mod http;

/// 字节大小格式化
pub mod bytesize;

// 导出常用类型供外部使用
pub use config::AppConfig;
pub use error::{AppError, CaptureError};
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use state::AppState;
