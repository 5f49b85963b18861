use async_trait::async_trait;
use fintechos_core::notify::error::NotifyError;
use fintechos_core::notify::port::Notifier;
use tracing::info;

/// # Summary
/// 把邮件内容写入 `tracing` 日志的 `Notifier`，用于本地开发。
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Notifier for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        info!(target: "mail", to, subject, "{}", body);
        Ok(())
    }
}
