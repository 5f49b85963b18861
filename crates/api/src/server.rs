//! # API 服务启动器
//!
//! 组装 axum 路由、挂载 Swagger UI、配置 CORS / 压缩 / 安全头并绑定 TCP 端口对外提供服务。
//! 本模块不直接启动 `main()`, 而是由 `crates/app` 完成依赖装配后调用。

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method, header};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_swagger_ui::SwaggerUi;

use fintechos_core::common::time::TimeProvider;
use fintechos_core::config::AppConfig;
use fintechos_core::ledger::port::AllocationPort;
use fintechos_core::notify::port::Notifier;
use fintechos_core::store::port::{DealStore, TokenStore, UserStore};

use crate::middleware::auth::auth_middleware;
use crate::middleware::rate_limit::{RateLimiter, rate_limit_middleware};
use crate::routes::{auth, deals, health, investments, stats, users};

/// 请求体上限，需容纳 2 MiB 头像的 data URL
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

// ============================================================
//  共享应用状态
// ============================================================

/// 全局应用状态，通过 axum 的 `State` 提取器注入到每个 Handler 中。
///
/// # Invariants
/// - 所有端口在服务启动前由 `crates/app` 注入，生命周期与进程等同。
/// - 余额与项目额度只能经由 `allocation` 修改。
#[derive(Clone)]
pub struct AppState {
    pub user_store: Arc<dyn UserStore>,
    pub deal_store: Arc<dyn DealStore>,
    /// 一次性令牌 (重置密码/邮箱确认)
    pub token_store: Arc<dyn TokenStore>,
    /// 注资、退款与充值的唯一入口
    pub allocation: Arc<dyn AllocationPort>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn TimeProvider>,
    pub config: Arc<AppConfig>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// 按配置创建状态，限流器随之初始化
    pub fn new(
        config: AppConfig,
        user_store: Arc<dyn UserStore>,
        deal_store: Arc<dyn DealStore>,
        token_store: Arc<dyn TokenStore>,
        allocation: Arc<dyn AllocationPort>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            config: Arc::new(config),
            user_store,
            deal_store,
            token_store,
            allocation,
            notifier,
            clock,
        }
    }
}

// ============================================================
//  OpenAPI 文档定义
// ============================================================

/// 全局 OpenAPI 文档结构
#[derive(OpenApi)]
#[openapi(
    info(
        title = "FintechOS Marketplace API",
        version = "0.1.0",
        description = "连接投资人与中小微企业 (MSME) 的融资撮合平台 RESTful API。提供鉴权、项目、注资与统计功能。",
        license(name = "MIT")
    ),
    tags(
        (name = "鉴权 (Auth)", description = "注册、登录、密码与邮箱确认"),
        (name = "用户 (Users)", description = "个人资料、余额充值与资金流水"),
        (name = "项目 (Deals)", description = "融资项目的发布与查询"),
        (name = "注资 (Investments)", description = "注资、退款与投资记录"),
        (name = "统计 (Stats)", description = "平台与个人仪表盘"),
        (name = "系统 (System)", description = "健康检查")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// 为 OpenAPI 文档注入全局 Bearer JWT 鉴权方案。
///
/// 注册后，Swagger UI 页面顶部将显示 Authorize 按钮，
/// 用户可以填入 JWT Token 后对所有标记了 `security` 的接口进行鉴权测试。
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        components.add_security_scheme(
            "bearer_jwt",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .description(Some(
                        "在此处填入登录接口返回的 JWT Token（无需 'Bearer ' 前缀）",
                    ))
                    .build(),
            ),
        );
    }
}

// ============================================================
//  服务构建与启动
// ============================================================

/// # Summary
/// 构建完整的 axum 应用路由树 (含 Swagger UI 与全局中间件)。
///
/// # Logic
/// 1. `/api/auth/*` 分为公开与需鉴权两组，整体再套一层限流。
/// 2. 仅平台统计与健康检查公开。
/// 3. 其余业务路由统一经过 JWT 中间件。
pub fn build_router(state: AppState) -> Router {
    // 1. 鉴权路由组 (限流)
    let auth_public = OpenApiRouter::new()
        .routes(routes!(auth::signup))
        .routes(routes!(auth::signin))
        .routes(routes!(auth::forgot_password))
        .routes(routes!(auth::reset_password))
        .routes(routes!(auth::confirm_email));
    let auth_protected = OpenApiRouter::new()
        .routes(routes!(auth::me))
        .routes(routes!(auth::change_password))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));
    let auth_router = auth_public.merge(auth_protected).layer(
        axum::middleware::from_fn_with_state(state.clone(), rate_limit_middleware),
    );

    // 2. 无需鉴权的公开路由
    let public_router = OpenApiRouter::new()
        .routes(routes!(stats::overview))
        .routes(routes!(health::health));

    // 3. 需要合法 JWT 的路由
    let protected_router = OpenApiRouter::new()
        .routes(routes!(users::get_user))
        .routes(routes!(users::update_me, users::delete_me))
        .routes(routes!(users::top_up))
        .routes(routes!(users::ledger))
        .routes(routes!(deals::list_deals, deals::create_deal))
        .routes(routes!(deals::get_deal))
        .routes(routes!(deals::deal_investors))
        .routes(routes!(investments::allocate))
        .routes(routes!(investments::list_investments))
        .routes(routes!(investments::refund))
        .routes(routes!(stats::investor_dashboard))
        .routes(routes!(stats::investor_deals))
        .routes(routes!(stats::msme_dashboard))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // 4. 合并所有路由与自动收集的 OpenAPI Doc
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(auth_router)
        .merge(public_router)
        .merge(protected_router)
        .with_state(state.clone())
        .split_for_parts();

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(&state.config.server.cors_origins))
        .layer(CompressionLayer::new())
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(TraceLayer::new_for_http())
}

/// 配置 CORS：未配置来源时允许所有来源
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("忽略非法的 CORS 来源: {}", o);
                None
            }
        })
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("idempotency-key"),
        ]);

    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}

/// 构建路由树并启动 HTTP 监听，直到 `shutdown` 完成。
///
/// # Arguments
/// * `state` - 由 `crates/app` 装配好的共享状态
/// * `bind_addr` - 监听的地址与端口，如 `"0.0.0.0:4000"`
/// * `shutdown` - 优雅停机信号
pub async fn start_server(
    state: AppState,
    bind_addr: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(state);

    tracing::info!("FintechOS API Server listening on {}", bind_addr);
    tracing::info!("Swagger UI: http://{}/swagger-ui/", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}
