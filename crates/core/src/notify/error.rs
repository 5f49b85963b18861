use thiserror::Error;

/// # Summary
/// 邮件投递错误。
#[derive(Error, Debug)]
pub enum NotifyError {
    /// SMTP 连接或传输失败
    #[error("Network error: {0}")]
    Network(String),

    /// 发件配置缺失或非法
    #[error("Configuration error: {0}")]
    Config(String),

    /// 收件地址或邮件内容无法构造
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}
