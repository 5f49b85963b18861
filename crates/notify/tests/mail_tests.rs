use fintechos_core::config::MailConfig;
use fintechos_core::notify::port::Notifier;
use fintechos_notify::{LogMailer, SmtpMailer};
use std::env;

#[tokio::test]
async fn test_log_mailer_always_succeeds() {
    let mailer = LogMailer;
    let result = mailer
        .send("alice@example.com", "Reset your password", "token=abc")
        .await;
    assert!(result.is_ok());
}

/// # Summary
/// 集成测试：验证 SMTP 发信。
///
/// # Logic
/// 1. 加载 .env 环境变量。
/// 2. 读取 SMTP 配置并初始化 `SmtpMailer`。
/// 3. 发送测试邮件并断言结果。
#[tokio::test]
#[ignore] // 默认忽略，仅在手动测试时通过环境变量开启
async fn test_smtp_delivery() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = MailConfig {
        host: env::var("FINTECHOS_SMTP_HOST")?,
        user: env::var("FINTECHOS_SMTP_USER")?,
        password: env::var("FINTECHOS_SMTP_PASS")?,
        from: env::var("FINTECHOS_SMTP_FROM")?,
    };
    let to = env::var("FINTECHOS_SMTP_TO")?;

    let mailer = SmtpMailer::new(&config)?;
    mailer
        .send(&to, "FintechOS 测试", "这是一封来自 SMTP 集成测试的邮件")
        .await?;
    Ok(())
}
