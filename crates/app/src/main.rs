mod settings;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use fintechos_api::server::{AppState, start_server};
use fintechos_core::common::time::RealTimeProvider;
use fintechos_core::notify::port::Notifier;
use fintechos_ledger::AllocationService;
use fintechos_notify::{LogMailer, SmtpMailer};
use fintechos_store::Database;
use tracing::{info, warn};

/// 开发用默认密钥，生产环境必须覆盖
const DEV_JWT_SECRET: &str = "YOUR_SUPER_SECRET_KEY";

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责加载配置、实例化所有具体实现并通过 `Arc<dyn Trait>` 注入到 API 层。
///
/// # Logic
/// 1. 加载分层配置并初始化全局日志。
/// 2. 打开 SQLite 数据库 (基础设施层)。
/// 3. 构造注资服务与邮件投递 (领域实现层)。
/// 4. 装配 `AppState` 并启动 HTTP 服务，收到 Ctrl-C 后优雅退出。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 配置与日志
    let config = settings::load()?;
    let _log_guard = telemetry::init(&config.log);
    info!("FintechOS API starting...");
    if config.auth.jwt_secret == DEV_JWT_SECRET {
        warn!("正在使用默认 JWT 密钥，请通过 FINTECHOS_AUTH__JWT_SECRET 覆盖");
    }

    // 2. 基础设施层
    fintechos_store::config::set_root_dir(PathBuf::from(&config.database.data_dir));
    let db = Database::open().await?;

    // 3. 领域实现层
    let clock = Arc::new(RealTimeProvider);
    let allocation = Arc::new(AllocationService::new(
        Arc::new(db.ledger_store()),
        clock.clone(),
        config.ledger.max_allocation,
    ));
    let notifier: Arc<dyn Notifier> = match &config.mail {
        Some(mail) => {
            info!("邮件通过 SMTP 发送: {}", mail.host);
            Arc::new(SmtpMailer::new(mail)?)
        }
        None => {
            warn!("未配置 SMTP，邮件只写入日志");
            Arc::new(LogMailer)
        }
    };

    // 4. 装配并启动
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(
        config,
        Arc::new(db.user_store()),
        Arc::new(db.deal_store()),
        Arc::new(db.token_store()),
        allocation,
        notifier,
        clock,
    );

    start_server(state, &bind_addr, shutdown_signal()).await?;
    info!("Shutdown complete.");
    Ok(())
}

/// 等待 Ctrl-C
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received. Draining connections..."),
        Err(e) => warn!("无法监听退出信号: {}", e),
    }
}
