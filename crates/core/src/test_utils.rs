//! 测试辅助：记录所有发出的邮件，便于集成测试取出验证/重置令牌。

use crate::notify::error::NotifyError;
use crate::notify::port::Notifier;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// 一封被记录的邮件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// # Summary
/// 不做任何投递、只把邮件保存在内存中的 `Notifier`。
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已记录的全部邮件 (按发送顺序)
    pub async fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().await.clone()
    }

    /// # Summary
    /// 取出发往 `to` 的最后一封邮件中的令牌。
    ///
    /// # Logic
    /// 令牌以 `token=<value>` 的形式出现在正文链接里，取到下一个空白或 `&` 为止。
    pub async fn last_token_for(&self, to: &str) -> Option<String> {
        let sent = self.sent.lock().await;
        let mail = sent.iter().rev().find(|m| m.to == to)?;
        let start = mail.body.find("token=")? + "token=".len();
        let token: String = mail.body[start..]
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != '&')
            .collect();
        (!token.is_empty()).then_some(token)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.sent.lock().await.push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
