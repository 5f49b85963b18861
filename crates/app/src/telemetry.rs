use fintechos_core::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// 滚动日志文件名前缀
const LOG_FILE_PREFIX: &str = "fintechos.log";

/// # Summary
/// 初始化全局日志订阅器。
///
/// # Logic
/// 1. 过滤级别优先取 `RUST_LOG`，否则使用配置中的 `filter`。
/// 2. 始终输出到控制台。
/// 3. 配置了 `directory` 时额外按天滚动写入文件 (无 ANSI 颜色)。
///
/// # Returns
/// 文件写入线程的守卫，必须存活到进程退出，否则尾部日志会丢失。
pub fn init(config: &LogConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
            None
        }
    }
}
