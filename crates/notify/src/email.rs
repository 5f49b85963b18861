use async_trait::async_trait;
use fintechos_core::config::MailConfig;
use fintechos_core::notify::error::NotifyError;
use fintechos_core::notify::port::Notifier;
use lettre::message::{Mailbox, Message, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::info;

/// # Summary
/// 构造一封纯文本邮件。
///
/// # Returns
/// 发件人或收件人地址非法时返回 `NotifyError::InvalidMessage`。
pub fn build_message(from: &str, to: &str, subject: &str, body: &str) -> Result<Message, NotifyError> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| NotifyError::InvalidMessage(format!("Invalid from address: {}", e)))?;
    let to: Mailbox = to
        .parse()
        .map_err(|e| NotifyError::InvalidMessage(format!("Invalid to address: {}", e)))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|e| NotifyError::InvalidMessage(format!("Failed to build email: {}", e)))
}

/// # Summary
/// 通过 SMTP 中继 (587 端口 STARTTLS) 发信的 `Notifier`。
///
/// # Invariants
/// - `AsyncSmtpTransport` 在多次发送之间复用。
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    /// # Summary
    /// 根据配置创建发信器。
    ///
    /// # Logic
    /// 1. 校验发件人地址。
    /// 2. 以用户名/密码建立中继传输。
    pub fn new(config: &MailConfig) -> Result<Self, NotifyError> {
        config
            .from
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::Config(format!("Invalid from address: {}", e)))?;
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| NotifyError::Config(format!("Invalid SMTP host: {}", e)))?
            .credentials(creds)
            .build();

        Ok(Self {
            mailer,
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Notifier for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let email = build_message(&self.from, to, subject, body)?;
        self.mailer
            .send(email)
            .await
            .map_err(|e| NotifyError::Network(format!("SMTP error: {}", e)))?;
        info!("邮件已发送: to={} subject={}", to, subject);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_message_validates_addresses() {
        assert!(build_message("FintechOS <no-reply@fintechos.dev>", "a@example.com", "Hi", "Body").is_ok());
        assert!(matches!(
            build_message("not-an-address", "a@example.com", "Hi", "Body"),
            Err(NotifyError::InvalidMessage(_))
        ));
        assert!(matches!(
            build_message("no-reply@fintechos.dev", "", "Hi", "Body"),
            Err(NotifyError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_new_rejects_bad_sender() {
        let cfg = MailConfig {
            host: "smtp.example.com".into(),
            user: "u".into(),
            password: "p".into(),
            from: "broken".into(),
        };
        assert!(matches!(SmtpMailer::new(&cfg), Err(NotifyError::Config(_))));
    }
}
