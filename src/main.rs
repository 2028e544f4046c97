use axum::{Router, http::StatusCode, response::Json, routing::get};
use serde_json::json;
use spectura_backend::features::screenshot::create_screenshot_router;
use spectura_backend::startup::run_startup_checks;
use spectura_backend::state::AppState;
use spectura_backend::{AppConfig, ShutdownManager};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        spectura_backend::features::screenshot::handler::get_screenshot,
        spectura_backend::features::screenshot::handler::get_info,
        health_check,
    ),
    components(
        schemas(
            spectura_backend::error::AppError,
            spectura_backend::error::CaptureError,
            spectura_backend::error::ProblemDetails,
            spectura_backend::features::screenshot::types::InfoResponse,
            spectura_backend::features::screenshot::types::InfoEntry,
            spectura_backend::features::screenshot::types::ProvenanceView,
        )
    ),
    tags(
        (name = "Screenshot", description = "OG 预览截图 APIs"),
        (name = "Health", description = "Health APIs"),
    ),
    info(
        title = "Spectura Backend API",
        version = "0.1.0",
        description = "Open Graph 截图缓存服务（Axum）"
    )
)]
pub struct ApiDoc;

#[utoipa::path(
    get,
    path = "/health",
    summary = "健康检查",
    description = "用于探活的健康检查端点，返回服务状态与版本信息。",
    responses((status = 200, description = "服务健康", body = serde_json::Value)),
    tag = "Health"
)]
async fn health_check() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "spectura-backend",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spectura_backend=info,tower_http=info".into()),
        )
        .init();

    // 创建优雅退出管理器并接管退出信号
    let shutdown_manager = ShutdownManager::new();
    shutdown_manager.start_signal_handler();

    // Load config
    if let Err(e) = AppConfig::init_global() {
        tracing::error!("Config init failed: {}", e);
        std::process::exit(1);
    }
    let config = AppConfig::global();

    // Run startup checks（主机渲染参数表缺失视为致命）
    let host_conf = match run_startup_checks(config).await {
        Ok(h) => h,
        Err(e) => {
            tracing::error!("Startup checks failed: {}", e);
            std::process::exit(1);
        }
    };

    // Shared state：条目存储、刷新调度与兜底图加载都在这里拉起
    let app_state = AppState::build(config, host_conf);

    // Routes
    let mut app = Router::<AppState>::new()
        .route("/health", get(health_check))
        .nest(&config.api.prefix, create_screenshot_router())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(app_state);
    app = app.layer(axum::middleware::from_fn(
        spectura_backend::request_id::request_id_middleware,
    ));
    app = app.layer(TraceLayer::new_for_http());

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Server: http://{}", addr);
    tracing::info!("Docs: http://{}/docs", addr);
    tracing::info!("Health: http://{}/health", addr);
    tracing::info!("Screenshot API: http://{}{}", addr, config.api.screenshot_path());
    tracing::info!("Info API: http://{}{}", addr, config.api.info_path());

    // 运行服务器直到收到退出信号
    let shutdown = shutdown_manager.clone();
    let graceful = axum::serve(listener, app).with_graceful_shutdown(async move {
        let reason = shutdown.wait_for_shutdown().await;
        tracing::info!("接收到退出信号: {:?}，开始优雅关闭HTTP服务器...", reason);
    });

    if let Err(e) = graceful.await {
        tracing::error!("服务器运行错误: {}", e);
        std::process::exit(1);
    }

    tracing::info!("服务器已优雅关闭");
}
