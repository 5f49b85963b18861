use crate::notify::error::NotifyError;
use async_trait::async_trait;

/// # Summary
/// 向用户投递事务性邮件 (验证链接、重置密码) 的接口。
///
/// # Invariants
/// - 实现必须是 `Send` 和 `Sync`，可在请求处理器之间共享。
/// - 投递失败不应回滚已经完成的业务写入，由调用方决定是否记录后忽略。
#[async_trait]
pub trait Notifier: Send + Sync {
    /// # Summary
    /// 发送一封纯文本邮件。
    ///
    /// # Arguments
    /// * `to` - 收件人地址。
    /// * `subject` - 邮件主题。
    /// * `body` - 正文。
    ///
    /// # Returns
    /// 失败返回 `NotifyError`。
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}
