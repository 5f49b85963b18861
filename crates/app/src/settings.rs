//! # 配置加载
//!
//! 按优先级从低到高叠加：内置默认值 → `config/default.toml` →
//! `FINTECHOS_CONFIG` 指向的文件 → `FINTECHOS_` 前缀的环境变量。
//! 环境变量用 `__` 分隔层级，例如 `FINTECHOS_SERVER__PORT=8080`。

use config::{Config, ConfigError, Environment, File, Map};
use fintechos_core::config::AppConfig;

/// 默认配置文件 (不存在时跳过)
const DEFAULT_CONFIG_FILE: &str = "config/default";
/// 指定额外配置文件的环境变量
const CONFIG_PATH_ENV: &str = "FINTECHOS_CONFIG";
const ENV_PREFIX: &str = "FINTECHOS";

/// 从磁盘与进程环境加载配置
pub fn load() -> Result<AppConfig, ConfigError> {
    let extra = std::env::var(CONFIG_PATH_ENV).ok();
    load_with(extra.as_deref(), None)
}

/// # Summary
/// 叠加各层配置源并反序列化为 `AppConfig`。
///
/// # Arguments
/// * `extra_file` - 可选的额外配置文件，必须存在。
/// * `env` - 注入的环境变量表，为 `None` 时读取进程环境。
fn load_with(
    extra_file: Option<&str>,
    env: Option<Map<String, String>>,
) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder()
        .add_source(Config::try_from(&AppConfig::default())?)
        .add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));

    if let Some(path) = extra_file {
        builder = builder.add_source(File::with_name(path).required(true));
    }

    let environment = Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("server.cors_origins")
        .try_parsing(true)
        .source(env);

    builder.add_source(environment).build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Option<Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults_survive_round_trip() {
        let config = load_with(None, env(&[])).unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.frontend_url, "http://localhost:5173");
        assert_eq!(config.auth.token_ttl_secs, 3600);
        assert_eq!(config.rate_limit.window_secs, 900);
        assert_eq!(config.ledger.max_allocation, Decimal::new(1_000_000_000, 0));
        assert!(config.mail.is_none());
        assert!(config.log.directory.is_none());
    }

    #[test]
    fn test_environment_overrides_nested_keys() {
        let config = load_with(
            None,
            env(&[
                ("FINTECHOS_SERVER__PORT", "8080"),
                ("FINTECHOS_AUTH__JWT_SECRET", "from-env"),
                ("FINTECHOS_RATE_LIMIT__MAX_REQUESTS", "5"),
                (
                    "FINTECHOS_SERVER__CORS_ORIGINS",
                    "https://a.example,https://b.example",
                ),
            ]),
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.jwt_secret, "from-env");
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(
            config.server.cors_origins,
            vec!["https://a.example", "https://b.example"]
        );
        // 未覆盖的字段保持默认
        assert_eq!(config.auth.bcrypt_cost, 12);
    }

    #[test]
    fn test_extra_file_then_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[server]
port = 5000

[database]
data_dir = "/var/lib/fintechos"

[mail]
host = "smtp.example.com"
user = "mailer"
password = "secret"
from = "FintechOS <no-reply@example.com>"
"#
        )
        .unwrap();

        let config = load_with(
            path.to_str(),
            env(&[("FINTECHOS_SERVER__PORT", "6000")]),
        )
        .unwrap();

        assert_eq!(config.server.port, 6000);
        assert_eq!(config.database.data_dir, "/var/lib/fintechos");
        let mail = config.mail.unwrap();
        assert_eq!(mail.host, "smtp.example.com");
        assert_eq!(mail.from, "FintechOS <no-reply@example.com>");
    }

    #[test]
    fn test_missing_extra_file_is_an_error() {
        let result = load_with(Some("/nonexistent/fintechos"), env(&[]));
        assert!(result.is_err());
    }
}
