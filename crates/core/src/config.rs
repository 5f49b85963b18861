use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 全局应用配置
///
/// 所有字段都带默认值，`config` 文件与环境变量只需覆盖需要改动的部分。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    pub rate_limit: RateLimitConfig,
    pub ledger: LedgerConfig,
    pub mail: Option<MailConfig>,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 前端站点根地址，用于拼接邮件中的重置/确认链接
    pub frontend_url: String,
    /// 允许的跨域来源，为空表示允许全部
    pub cors_origins: Vec<String>,
    /// 是否部署在可信反向代理之后，开启后限流按 `X-Forwarded-For` 识别客户端
    pub trust_proxy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// JWT 有效期 (秒)
    pub jwt_expires_in_secs: u64,
    /// bcrypt 计算成本，测试环境可调低到 4
    pub bcrypt_cost: u32,
    /// 一次性令牌 (重置密码/邮箱确认) 的有效期 (秒)
    pub token_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// 单笔注资/充值上限
    pub max_allocation: Decimal,
}

/// SMTP 发信配置，缺省时邮件只写入日志
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// 滚动日志目录，为空则只输出到控制台
    pub directory: Option<String>,
    /// 默认过滤级别，`RUST_LOG` 优先
    pub filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            frontend_url: "http://localhost:5173".to_string(),
            cors_origins: Vec::new(),
            trust_proxy: false,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "YOUR_SUPER_SECRET_KEY".to_string(), // Default for dev, should be overwritten by config
            jwt_expires_in_secs: 86400 * 7,
            bcrypt_cost: 12,
            token_ttl_secs: 3600,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 15 * 60,
            max_requests: 100,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_allocation: crate::ledger::entity::MAX_ALLOCATION_AMOUNT,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: None,
            filter: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.auth.jwt_secret, "YOUR_SUPER_SECRET_KEY");
        assert_eq!(config.auth.bcrypt_cost, 12);
        assert_eq!(config.database.data_dir, "data");
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window_secs, 900);
        assert_eq!(config.ledger.max_allocation, Decimal::new(1_000_000_000, 0));
        assert!(config.mail.is_none());
        assert!(!config.server.trust_proxy);
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let json = r#"{ "server": { "port": 9000 }, "auth": { "jwt_secret": "s3cret" } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert_eq!(config.auth.token_ttl_secs, 3600);
    }
}
