//! # `fintechos-notify` - 事务邮件投递
//!
//! - [`email::SmtpMailer`]：通过 SMTP 中继真实发信。
//! - [`log::LogMailer`]：未配置 SMTP 时的兜底实现，只把邮件写入日志。

pub mod email;
pub mod log;

pub use email::SmtpMailer;
pub use log::LogMailer;
